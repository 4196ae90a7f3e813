// [crates/cms-db/src/repositories/refresh_token_repository.rs]
/*!
 * =================================================================
 * APARATO: REFRESH TOKEN REPOSITORY
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: PERSISTENCIA DEL PAR SELECTOR/VERIFICADOR
 *
 * Invariante de fila única por selector garantizada por el índice único
 * de `schema.rs`; la destrucción es siempre por selector o por usuario,
 * nunca por `token_id` directamente (el servicio de autenticación no
 * conoce ese identificador interno).
 * =================================================================
 */

use crate::client::TursoClient;
use crate::errors::DbError;
use crate::util::parse_timestamp;
use chrono::{DateTime, Utc};
use cms_domain::RefreshToken;
use libsql::{params, Row};
use tracing::instrument;

pub struct RefreshTokenRepository {
    client: TursoClient,
}

impl RefreshTokenRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { client }
    }

    #[instrument(skip(self, verifier_hash))]
    pub async fn create_refresh_token(
        &self,
        user_id: i64,
        selector: &str,
        verifier_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let conn = self.client.get_connection()?;
        conn.execute(
            "INSERT INTO refresh_tokens (user_id, selector, verifier_hash, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, selector, verifier_hash, expires_at.to_rfc3339()],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find_by_selector(&self, selector: &str) -> Result<Option<RefreshToken>, DbError> {
        let conn = self.client.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT token_id, user_id, selector, verifier_hash, issued_at, expires_at
                 FROM refresh_tokens WHERE selector = ?1",
                params![selector],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_row_to_refresh_token(row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn destroy_refresh_token_by_selector(&self, selector: &str) -> Result<(), DbError> {
        let conn = self.client.get_connection()?;
        conn.execute("DELETE FROM refresh_tokens WHERE selector = ?1", params![selector])
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn destroy_refresh_tokens_by_user(&self, user_id: i64) -> Result<(), DbError> {
        let conn = self.client.get_connection()?;
        conn.execute("DELETE FROM refresh_tokens WHERE user_id = ?1", params![user_id])
            .await?;
        Ok(())
    }

    /// Barrido diario: elimina filas cuyo `expires_at` ya quedó en el
    /// pasado. Devuelve el número de filas purgadas para telemetría.
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, DbError> {
        let conn = self.client.get_connection()?;
        let affected = conn
            .execute(
                "DELETE FROM refresh_tokens WHERE expires_at < ?1",
                params![now.to_rfc3339()],
            )
            .await?;
        Ok(affected)
    }
}

fn map_row_to_refresh_token(row: Row) -> Result<RefreshToken, DbError> {
    Ok(RefreshToken {
        token_id: row.get(0)?,
        user_id: row.get(1)?,
        selector: row.get(2)?,
        verifier_hash: row.get(3)?,
        issued_at: parse_timestamp(&row.get::<String>(4)?),
        expires_at: parse_timestamp(&row.get::<String>(5)?),
    })
}
