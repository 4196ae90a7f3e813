// [crates/cms-db/src/lib.rs]
/*!
 * =================================================================
 * APARATO: PERSISTENCE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: CLIENTE TURSO/LIBSQL, ESQUEMA Y REPOSITORIOS NOMINALES
 *
 * Ningún aparato fuera de este crate construye SQL directamente; todo
 * consumidor (servicios, handlers) habla contra los métodos estrechos
 * de `repositories::*`.
 * =================================================================
 */

pub mod client;
pub mod errors;
pub mod repositories;
pub mod schema;
mod util;

pub use client::TursoClient;
pub use errors::DbError;
pub use repositories::{
    AgentVersionRepository, ComputerRepository, RefreshTokenRepository, RoomRepository, UserRepository,
};
