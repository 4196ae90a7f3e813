// [crates/cms-db/src/repositories/computer_repository.rs]
/*!
 * =================================================================
 * APARATO: COMPUTER REPOSITORY
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: PERSISTENCIA DE ESTACIONES GESTIONADAS Y SU BITÁCORA
 *
 * `have_active_errors` se recalcula en el propio repositorio tras cada
 * inserción o resolución de un `ErrorRecord`, nunca se deja a cargo del
 * llamador: la invariante vive donde se muta el dato que la sostiene.
 * =================================================================
 */

use crate::client::TursoClient;
use crate::errors::DbError;
use crate::util::parse_timestamp;
use cms_domain::{Computer, ErrorRecord};
use libsql::{params, Row};
use serde_json::Value;
use tracing::instrument;

pub struct ComputerRepository {
    client: TursoClient,
}

impl ComputerRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { client }
    }

    #[instrument(skip(self))]
    pub async fn find_computer_by_agent_id(&self, agent_id: &str) -> Result<Option<Computer>, DbError> {
        let conn = self.client.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT computer_id, agent_id, agent_token_hash, room_id, pos_x, pos_y, name,
                        hardware_info, have_active_errors
                 FROM computers WHERE agent_id = ?1",
                params![agent_id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let mut computer = map_row_to_computer(row)?;
        computer.errors = self.load_errors(computer.computer_id).await?;
        Ok(Some(computer))
    }

    #[instrument(skip(self))]
    pub async fn find_computer_by_id(&self, computer_id: i64) -> Result<Option<Computer>, DbError> {
        let conn = self.client.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT computer_id, agent_id, agent_token_hash, room_id, pos_x, pos_y, name,
                        hardware_info, have_active_errors
                 FROM computers WHERE computer_id = ?1",
                params![computer_id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let mut computer = map_row_to_computer(row)?;
        computer.errors = self.load_errors(computer.computer_id).await?;
        Ok(Some(computer))
    }

    /// `true` si `(room_id, pos_x, pos_y)` ya pertenece a una computadora
    /// con un `agent_id` distinto del dado.
    #[instrument(skip(self))]
    pub async fn position_occupied_by_other(
        &self,
        room_id: i64,
        pos_x: i32,
        pos_y: i32,
        excluding_agent_id: &str,
    ) -> Result<bool, DbError> {
        let conn = self.client.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT 1 FROM computers
                 WHERE room_id = ?1 AND pos_x = ?2 AND pos_y = ?3 AND agent_id != ?4
                 LIMIT 1",
                params![room_id, pos_x, pos_y, excluding_agent_id],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    /// Inserción de primera identificación del agente; usada sólo cuando
    /// `find_computer_by_agent_id` no devolvió fila.
    #[instrument(skip(self, token_hash))]
    pub async fn create_computer(
        &self,
        agent_id: &str,
        token_hash: &str,
        room_id: Option<i64>,
        pos_x: i32,
        pos_y: i32,
    ) -> Result<i64, DbError> {
        let conn = self.client.get_connection()?;
        conn.execute(
            "INSERT INTO computers (agent_id, agent_token_hash, room_id, pos_x, pos_y, name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?1)",
            params![agent_id, token_hash, room_id, pos_x, pos_y],
        )
        .await
        .map_err(map_position_conflict)?;
        Ok(conn.last_insert_rowid())
    }

    #[instrument(skip(self, token_hash))]
    pub async fn update_token_and_position(
        &self,
        computer_id: i64,
        token_hash: &str,
        room_id: Option<i64>,
        pos_x: i32,
        pos_y: i32,
    ) -> Result<(), DbError> {
        let conn = self.client.get_connection()?;
        conn.execute(
            "UPDATE computers SET agent_token_hash = ?2, room_id = ?3, pos_x = ?4, pos_y = ?5
             WHERE computer_id = ?1",
            params![computer_id, token_hash, room_id, pos_x, pos_y],
        )
        .await
        .map_err(map_position_conflict)?;
        Ok(())
    }

    /// Persiste campos editables administrativamente (nombre, hardware).
    /// Las mutaciones de posición/token van por sus operaciones dedicadas.
    #[instrument(skip(self, computer))]
    pub async fn save_computer(&self, computer: &Computer) -> Result<(), DbError> {
        let conn = self.client.get_connection()?;
        let hardware_json = match &computer.hardware_info {
            Some(value) => Some(serde_json::to_string(value).map_err(|e| DbError::MappingError(e.to_string()))?),
            None => None,
        };
        conn.execute(
            "UPDATE computers SET name = ?2, hardware_info = ?3 WHERE computer_id = ?1",
            params![computer.computer_id, computer.name.clone(), hardware_json],
        )
        .await?;
        Ok(())
    }

    /// Añade un `ErrorRecord` y recalcula `have_active_errors`.
    #[instrument(skip(self, error_message, error_details))]
    pub async fn append_error(
        &self,
        computer_id: i64,
        error_type: &str,
        error_message: &str,
        error_details: Option<&str>,
    ) -> Result<i64, DbError> {
        let conn = self.client.get_connection()?;
        conn.execute(
            "INSERT INTO computer_errors (computer_id, error_type, error_message, error_details)
             VALUES (?1, ?2, ?3, ?4)",
            params![computer_id, error_type, error_message, error_details],
        )
        .await?;
        let error_id = conn.last_insert_rowid();

        conn.execute(
            "UPDATE computers SET have_active_errors = 1 WHERE computer_id = ?1",
            params![computer_id],
        )
        .await?;

        Ok(error_id)
    }

    /// Marca un `ErrorRecord` como resuelto y recalcula `have_active_errors`.
    #[instrument(skip(self, resolution_notes))]
    pub async fn resolve_error(
        &self,
        computer_id: i64,
        error_id: i64,
        resolution_notes: Option<&str>,
    ) -> Result<(), DbError> {
        let conn = self.client.get_connection()?;
        let changed = conn
            .execute(
                "UPDATE computer_errors
                 SET resolved = 1, resolved_at = CURRENT_TIMESTAMP, resolution_notes = ?3
                 WHERE error_id = ?1 AND computer_id = ?2",
                params![error_id, computer_id, resolution_notes],
            )
            .await?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }

        let mut remaining = conn
            .query(
                "SELECT 1 FROM computer_errors WHERE computer_id = ?1 AND resolved = 0 LIMIT 1",
                params![computer_id],
            )
            .await?;
        let still_active = remaining.next().await?.is_some();

        conn.execute(
            "UPDATE computers SET have_active_errors = ?2 WHERE computer_id = ?1",
            params![computer_id, still_active as i64],
        )
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn count_computers(&self) -> Result<i64, DbError> {
        let conn = self.client.get_connection()?;
        let mut rows = conn.query("SELECT COUNT(*) FROM computers", params![]).await?;
        let row = rows.next().await?.ok_or(DbError::NotFound)?;
        Ok(row.get(0)?)
    }

    /// Todos los `ErrorRecord` no resueltos de la flota, junto al
    /// `computer_id` al que pertenecen, para el panel administrativo.
    #[instrument(skip(self))]
    pub async fn list_unresolved_errors(&self) -> Result<Vec<(i64, ErrorRecord)>, DbError> {
        let conn = self.client.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT computer_id, error_id, error_type, error_message, error_details, reported_at,
                        resolved, resolved_at, resolution_notes
                 FROM computer_errors WHERE resolved = 0 ORDER BY reported_at ASC",
                params![],
            )
            .await?;

        let mut unresolved = Vec::new();
        while let Some(row) = rows.next().await? {
            let computer_id: i64 = row.get(0)?;
            unresolved.push((
                computer_id,
                ErrorRecord {
                    error_id: row.get(1)?,
                    error_type: row.get(2)?,
                    error_message: row.get(3)?,
                    error_details: row.get(4)?,
                    reported_at: parse_timestamp(&row.get::<String>(5)?),
                    resolved: row.get::<i64>(6)? != 0,
                    resolved_at: row.get::<Option<String>>(7)?.map(|ts| parse_timestamp(&ts)),
                    resolution_notes: row.get(8)?,
                },
            ));
        }
        Ok(unresolved)
    }

    async fn load_errors(&self, computer_id: i64) -> Result<Vec<ErrorRecord>, DbError> {
        let conn = self.client.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT error_id, error_type, error_message, error_details, reported_at,
                        resolved, resolved_at, resolution_notes
                 FROM computer_errors WHERE computer_id = ?1 ORDER BY reported_at ASC",
                params![computer_id],
            )
            .await?;

        let mut errors = Vec::new();
        while let Some(row) = rows.next().await? {
            errors.push(map_row_to_error(row)?);
        }
        Ok(errors)
    }
}

/// `position_occupied_by_other` is a check-then-act race under concurrent
/// writers; `idx_computers_position_unique` is the actual source of truth.
/// Translates the resulting storage-engine rejection into `DbError::Conflict`
/// instead of leaking it as an opaque `QueryError`.
fn map_position_conflict(err: libsql::Error) -> DbError {
    if err.to_string().contains("UNIQUE constraint failed") {
        DbError::Conflict("position already occupied by another agent".to_string())
    } else {
        DbError::QueryError(err)
    }
}

fn map_row_to_error(row: Row) -> Result<ErrorRecord, DbError> {
    Ok(ErrorRecord {
        error_id: row.get(0)?,
        error_type: row.get(1)?,
        error_message: row.get(2)?,
        error_details: row.get(3)?,
        reported_at: parse_timestamp(&row.get::<String>(4)?),
        resolved: row.get::<i64>(5)? != 0,
        resolved_at: row.get::<Option<String>>(6)?.map(|ts| parse_timestamp(&ts)),
        resolution_notes: row.get(7)?,
    })
}

fn map_row_to_computer(row: Row) -> Result<Computer, DbError> {
    let hardware_raw: Option<String> = row.get(7)?;
    let hardware_info: Option<Value> = match hardware_raw {
        Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| DbError::MappingError(e.to_string()))?),
        None => None,
    };

    Ok(Computer {
        computer_id: row.get(0)?,
        agent_id: row.get(1)?,
        agent_token_hash: row.get(2)?,
        room_id: row.get(3)?,
        pos_x: row.get(4)?,
        pos_y: row.get(5)?,
        name: row.get(6)?,
        hardware_info,
        errors: Vec::new(),
        have_active_errors: row.get::<i64>(8)? != 0,
    })
}
