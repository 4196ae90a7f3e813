// [crates/cms-db/src/repositories/agent_version_repository.rs]
/*!
 * =================================================================
 * APARATO: AGENT VERSION REPOSITORY
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: CATÁLOGO DE PAQUETES DISTRIBUIBLES
 *
 * `upsert_agent_version_stability` ejecuta la transición de "a lo sumo
 * una fila estable" en dos sentencias dentro de una transacción
 * explícita en lugar de depender de un disparador; libSQL expone
 * `Connection::transaction()` directamente sobre la conexión prestada.
 * =================================================================
 */

use crate::client::TursoClient;
use crate::errors::DbError;
use crate::util::parse_timestamp;
use cms_domain::AgentVersion;
use libsql::{params, Row};
use tracing::instrument;

pub struct AgentVersionRepository {
    client: TursoClient,
}

impl AgentVersionRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { client }
    }

    #[instrument(skip(self, checksum_sha256, notes))]
    pub async fn insert_version(
        &self,
        version: &str,
        checksum_sha256: &str,
        download_url: &str,
        file_path: &str,
        file_size: i64,
        notes: Option<&str>,
    ) -> Result<i64, DbError> {
        let conn = self.client.get_connection()?;
        conn.execute(
            "INSERT INTO agent_versions
                (version, checksum_sha256, download_url, file_path, file_size, notes, is_stable)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![version, checksum_sha256, download_url, file_path, file_size, notes],
        )
        .await?;
        Ok(conn.last_insert_rowid())
    }

    #[instrument(skip(self))]
    pub async fn list_agent_versions(&self) -> Result<Vec<AgentVersion>, DbError> {
        let conn = self.client.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT version_id, version, checksum_sha256, download_url, file_path, file_size,
                        notes, is_stable, created_at
                 FROM agent_versions ORDER BY created_at DESC",
                (),
            )
            .await?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(map_row_to_agent_version(row)?);
        }
        Ok(out)
    }

    #[instrument(skip(self))]
    pub async fn find_stable(&self) -> Result<Option<AgentVersion>, DbError> {
        let conn = self.client.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT version_id, version, checksum_sha256, download_url, file_path, file_size,
                        notes, is_stable, created_at
                 FROM agent_versions WHERE is_stable = 1
                 ORDER BY created_at DESC LIMIT 1",
                (),
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_row_to_agent_version(row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn find_by_filename(&self, file_path: &str) -> Result<Option<AgentVersion>, DbError> {
        let conn = self.client.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT version_id, version, checksum_sha256, download_url, file_path, file_size,
                        notes, is_stable, created_at
                 FROM agent_versions WHERE file_path = ?1",
                params![file_path],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_row_to_agent_version(row)?)),
            None => Ok(None),
        }
    }

    /// Única transición de estabilidad permitida: si `flag` es `true`,
    /// despromueve atómicamente todas las demás filas primero.
    #[instrument(skip(self))]
    pub async fn upsert_agent_version_stability(&self, version_id: i64, flag: bool) -> Result<(), DbError> {
        let conn = self.client.get_connection()?;
        let tx = conn.transaction().await?;

        if flag {
            tx.execute("UPDATE agent_versions SET is_stable = 0 WHERE version_id != ?1", params![version_id])
                .await?;
        }
        let changed = tx
            .execute(
                "UPDATE agent_versions SET is_stable = ?2 WHERE version_id = ?1",
                params![version_id, flag as i64],
            )
            .await?;

        if changed == 0 {
            tx.rollback().await?;
            return Err(DbError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }
}

fn map_row_to_agent_version(row: Row) -> Result<AgentVersion, DbError> {
    Ok(AgentVersion {
        version_id: row.get(0)?,
        version: row.get(1)?,
        checksum_sha256: row.get(2)?,
        download_url: row.get(3)?,
        file_path: row.get(4)?,
        file_size: row.get(5)?,
        notes: row.get(6)?,
        is_stable: row.get::<i64>(7)? != 0,
        created_at: parse_timestamp(&row.get::<String>(8)?),
    })
}
