// [apps/coordinator/src/services/mod.rs]
/*!
 * Fachadas de servicio (C2-C4, C7) y daemons de fondo. Cada aparato
 * envuelve uno o dos repositorios y expone operaciones nombradas tal
 * como las describe el diseño de componentes, sin filtrar detalle SQL.
 */

pub mod agent_registry;
pub mod auth_service;
pub mod mfa_broker;
pub mod refresh_sweep;
pub mod version_catalog;

pub use agent_registry::AgentRegistry;
pub use auth_service::AuthService;
pub use mfa_broker::MfaBroker;
pub use refresh_sweep::RefreshSweepDaemon;
pub use version_catalog::VersionCatalog;
