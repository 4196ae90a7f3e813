// [apps/coordinator/src/handlers/mod.rs]
/*!
 * =================================================================
 * APARATO: HTTP/WS HANDLER TREE
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: DEFINICIÓN DEL ÁRBOL DE MÓDULOS DE FRONTERA
 * =================================================================
 */

pub mod admin;
pub mod agent;
pub mod auth;
pub mod ws;
