// [apps/coordinator/src/main.rs]
/*!
 * =================================================================
 * APARATO: COORDINATOR ENTRY POINT
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: CARGA DE ENTORNO, OBSERVABILIDAD Y ARRANQUE DEL RUNTIME
 * =================================================================
 */

use cms_coordinator::config::CoordinatorConfig;
use cms_coordinator::kernel::CoordinatorKernel;
use cms_telemetry::init_tracing;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing("cms_coordinator");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_stack_size(4 * 1024 * 1024)
        .build()?;

    runtime.block_on(async {
        let config = CoordinatorConfig::from_env();
        let port = config.port;
        let database_url = config.database_url.clone();
        let turso_auth_token = config.turso_auth_token.clone();

        let kernel = CoordinatorKernel::ignite(&database_url, turso_auth_token, port, config).await;

        info!("coordinator fully assembled, entering service loop on port {}", port);
        kernel.launch().await;

        Ok(())
    })
}
