// [apps/coordinator/src/state/mod.rs]
/*!
 * =================================================================
 * APARATO: SHARED APPLICATION STATE
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L1-APP)
 * RESPONSABILIDAD: COMPOSICIÓN DE REPOSITORIOS, SESIÓN Y CORRELACIÓN
 *
 * Placa base del coordinador: una única instancia `Arc`-compartida entre
 * todos los handlers de Axum. Ningún handler construye un repositorio
 * o abre una conexión por su cuenta.
 * =================================================================
 */

pub mod command_coordinator;
pub mod session_hub;

use crate::config::CoordinatorConfig;
use cms_crypto::CredentialStore;
use cms_db::{AgentVersionRepository, ComputerRepository, RefreshTokenRepository, RoomRepository, TursoClient, UserRepository};
use jsonwebtoken::{DecodingKey, EncodingKey};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::services::{AgentRegistry, AuthService, MfaBroker, RefreshSweepDaemon, VersionCatalog};
use command_coordinator::CommandCoordinator;
use session_hub::SessionHub;

#[derive(Clone)]
pub struct AppState {
    pub db: TursoClient,

    pub users: Arc<UserRepository>,
    pub refresh_tokens: Arc<RefreshTokenRepository>,
    pub computers: Arc<ComputerRepository>,
    pub rooms: Arc<RoomRepository>,
    pub agent_versions: Arc<AgentVersionRepository>,

    pub session_hub: Arc<SessionHub>,
    pub command_coordinator: Arc<CommandCoordinator>,
    pub mfa_broker: Arc<MfaBroker>,

    pub auth_service: Arc<AuthService>,
    pub agent_registry: Arc<AgentRegistry>,
    pub version_catalog: Arc<VersionCatalog>,

    pub credentials: Arc<CredentialStore>,
    pub jwt_encoding_key: Arc<EncodingKey>,
    pub jwt_decoding_key: Arc<DecodingKey>,

    pub config: Arc<CoordinatorConfig>,
}

impl AppState {
    pub fn new(db: TursoClient, config: CoordinatorConfig) -> Self {
        debug!("assembling coordinator application state");

        let jwt_secret = config.access_token_secret.as_bytes();
        let jwt_encoding_key = Arc::new(EncodingKey::from_secret(jwt_secret));
        let jwt_decoding_key = Arc::new(DecodingKey::from_secret(jwt_secret));
        let credentials = Arc::new(CredentialStore::new(config.argon2_params));

        let users = Arc::new(UserRepository::new(db.clone()));
        let refresh_tokens = Arc::new(RefreshTokenRepository::new(db.clone()));
        let computers = Arc::new(ComputerRepository::new(db.clone()));
        let rooms = Arc::new(RoomRepository::new(db.clone()));
        let agent_versions = Arc::new(AgentVersionRepository::new(db.clone()));

        let auth_service = Arc::new(AuthService::new(
            users.clone(),
            refresh_tokens.clone(),
            credentials.clone(),
            jwt_encoding_key.clone(),
            jwt_decoding_key.clone(),
            config.access_token_ttl_seconds,
            config.refresh_token_ttl_seconds,
        ));
        let agent_registry = Arc::new(AgentRegistry::new(computers.clone(), rooms.clone(), credentials.clone()));
        let version_catalog = Arc::new(VersionCatalog::new(
            agent_versions.clone(),
            config.package_data_dir.clone(),
            config.max_package_upload_bytes,
        ));

        AppState {
            users,
            refresh_tokens,
            computers,
            rooms,
            agent_versions,

            session_hub: Arc::new(SessionHub::new(Duration::from_millis(config.offline_debounce_ms))),
            command_coordinator: Arc::new(CommandCoordinator::new(Duration::from_secs(config.pending_command_timeout_secs))),
            mfa_broker: Arc::new(MfaBroker::new()),

            auth_service,
            agent_registry,
            version_catalog,

            credentials,
            jwt_encoding_key,
            jwt_decoding_key,

            db,
            config: Arc::new(config),
        }
    }

    /// Lanza el daemon de barrido de refresh tokens como una tarea de
    /// Tokio de fondo, independiente del ciclo de vida de los handlers.
    pub fn spawn_background_daemons(&self) {
        let daemon = RefreshSweepDaemon::new(self.refresh_tokens.clone());
        tokio::spawn(daemon.spawn());
    }
}
