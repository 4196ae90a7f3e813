// [apps/coordinator/src/kernel.rs]
/*!
 * =================================================================
 * APARATO: COORDINATOR KERNEL
 * CLASIFICACIÓN: COMPOSITION ROOT (ESTRATO L1-APP)
 * RESPONSABILIDAD: BOOTSTRAP DE INFRAESTRUCTURA Y LANZAMIENTO DEL SERVIDOR
 *
 * Punto único donde el estado compartido, los daemons de fondo y el
 * router HTTP/WS se ensamblan. Ningún otro módulo abre una conexión a
 * la base de datos por su cuenta.
 * =================================================================
 */

use crate::routes::build_router;
use crate::state::AppState;
use cms_db::TursoClient;
use std::net::{IpAddr, SocketAddr};
use tracing::{error, info, instrument};

pub struct CoordinatorKernel {
    port: u16,
    application_state: AppState,
}

impl CoordinatorKernel {
    #[instrument(skip(database_access_token))]
    pub async fn ignite(
        database_connection_url: &str,
        database_access_token: Option<String>,
        listening_port: u16,
        config: crate::config::CoordinatorConfig,
    ) -> Self {
        let database_client = TursoClient::connect(database_connection_url, database_access_token)
            .await
            .expect("CRITICAL_FAULT: database connection could not be established.");

        CoordinatorKernel {
            port: listening_port,
            application_state: AppState::new(database_client, config),
        }
    }

    pub async fn launch(self) {
        self.application_state.spawn_background_daemons();

        let router = build_router(self.application_state);
        let bind_address = SocketAddr::new("0.0.0.0".parse::<IpAddr>().unwrap(), self.port);

        info!("coordinator listening at {}", bind_address);

        let listener = tokio::net::TcpListener::bind(bind_address)
            .await
            .expect("CRITICAL_FAULT: failed to bind network port.");

        if let Err(err) = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await {
            error!("server runtime failure: {}", err);
            std::process::exit(1);
        }

        info!("in-flight requests and WebSocket sessions drained, exiting");
    }
}

/// Resuelve en `SIGINT`, dejando que `axum::serve` drene las conexiones
/// en curso (incluidas las sesiones WebSocket) antes de cerrar el listener.
async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("CRITICAL_FAULT: failed to install SIGINT handler.");
    info!("SIGINT received, starting graceful shutdown");
}
