// [crates/cms-db/src/client.rs]
/*!
 * =================================================================
 * APARATO: DATABASE CONNECTION CLIENT
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GESTIÓN DE ENLACES Y PERSISTENCIA ACID
 *
 * En modo memoria, SQLite purga el esquema en cuanto la última conexión
 * se cierra; se ancla una conexión adicional al lado del driver para
 * que las tablas sobrevivan entre hilos durante la vida del proceso
 * (usado por la suite de pruebas de integración).
 * =================================================================
 */

use crate::errors::DbError;
use crate::schema::apply_schema;
use libsql::{Builder, Connection, Database};
use std::sync::Arc;
use tracing::{error, info, instrument};

#[derive(Clone)]
pub struct TursoClient {
    driver: Arc<Database>,
    _memory_persistence_anchor: Option<Arc<Connection>>,
}

impl TursoClient {
    #[instrument(skip(access_token))]
    pub async fn connect(connection_url: &str, access_token: Option<String>) -> Result<Self, DbError> {
        if connection_url.is_empty() {
            return Err(DbError::ConfigurationError("DATABASE_URL is empty".into()));
        }

        info!("connecting to persistence layer at [{}]", connection_url);

        let is_remote = connection_url.starts_with("libsql://") || connection_url.starts_with("https://");
        let is_memory = connection_url.contains(":memory:") || connection_url.contains("mode=memory");

        let driver = if is_remote {
            let token = access_token
                .ok_or_else(|| DbError::ConfigurationError("remote database requires an auth token".into()))?;
            Builder::new_remote(connection_url.to_string(), token).build().await
        } else {
            Builder::new_local(connection_url).build().await
        }
        .map_err(|e| DbError::ConnectionError(e.to_string()))?;

        let driver = Arc::new(driver);
        let mut anchor = None;

        if is_memory {
            let anchor_conn = driver
                .connect()
                .map_err(|e| DbError::ConnectionError(format!("anchor connection failed: {e}")))?;
            apply_schema(&anchor_conn).await.map_err(|e| DbError::ConnectionError(e.to_string()))?;
            anchor = Some(Arc::new(anchor_conn));
            info!("in-memory schema anchored for process lifetime");
        } else {
            let bootstrap_conn = driver
                .connect()
                .map_err(|e| DbError::ConnectionError(format!("bootstrap connection failed: {e}")))?;
            apply_schema(&bootstrap_conn).await.map_err(|e| DbError::ConnectionError(e.to_string()))?;
        }

        Ok(Self {
            driver,
            _memory_persistence_anchor: anchor,
        })
    }

    pub fn get_connection(&self) -> Result<Connection, DbError> {
        self.driver.connect().map_err(|e| {
            error!("connection allocation failed: {}", e);
            DbError::ConnectionError(e.to_string())
        })
    }
}
