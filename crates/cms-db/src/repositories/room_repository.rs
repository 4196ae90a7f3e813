// [crates/cms-db/src/repositories/room_repository.rs]
/*!
 * =================================================================
 * APARATO: ROOM REPOSITORY
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: AGRUPACIONES LÓGICAS Y ARISTAS DE AUTORIZACIÓN
 * =================================================================
 */

use crate::client::TursoClient;
use crate::errors::DbError;
use cms_domain::{Room, RoomLayout};
use libsql::{params, Row};
use tracing::instrument;

pub struct RoomRepository {
    client: TursoClient,
}

impl RoomRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { client }
    }

    #[instrument(skip(self))]
    pub async fn find_room_by_id(&self, room_id: i64) -> Result<Option<Room>, DbError> {
        let conn = self.client.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT room_id, name, columns, rows, description FROM rooms WHERE room_id = ?1",
                params![room_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_row_to_room(row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn find_room_by_name(&self, name: &str) -> Result<Option<Room>, DbError> {
        let conn = self.client.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT room_id, name, columns, rows, description FROM rooms WHERE name = ?1",
                params![name],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_row_to_room(row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn list_rooms(&self) -> Result<Vec<Room>, DbError> {
        let conn = self.client.get_connection()?;
        let mut rows = conn
            .query("SELECT room_id, name, columns, rows, description FROM rooms ORDER BY room_id", ())
            .await?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(map_row_to_room(row)?);
        }
        Ok(out)
    }

    #[instrument(skip(self))]
    pub async fn create_room(&self, name: &str, layout: RoomLayout, description: Option<&str>) -> Result<i64, DbError> {
        let conn = self.client.get_connection()?;
        conn.execute(
            "INSERT INTO rooms (name, columns, rows, description) VALUES (?1, ?2, ?3, ?4)",
            params![name, layout.columns, layout.rows, description],
        )
        .await?;
        Ok(conn.last_insert_rowid())
    }

    /// `true` iff el usuario tiene una asignación activa para la sala;
    /// los administradores la eluden en la capa de servicio, no aquí.
    #[instrument(skip(self))]
    pub async fn user_has_room_assignment(&self, user_id: i64, room_id: i64) -> Result<bool, DbError> {
        let conn = self.client.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT 1 FROM user_room_assignments WHERE user_id = ?1 AND room_id = ?2",
                params![user_id, room_id],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    #[instrument(skip(self))]
    pub async fn assign_user_to_room(&self, user_id: i64, room_id: i64) -> Result<(), DbError> {
        let conn = self.client.get_connection()?;
        conn.execute(
            "INSERT OR IGNORE INTO user_room_assignments (user_id, room_id) VALUES (?1, ?2)",
            params![user_id, room_id],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn unassign_user_from_room(&self, user_id: i64, room_id: i64) -> Result<(), DbError> {
        let conn = self.client.get_connection()?;
        conn.execute(
            "DELETE FROM user_room_assignments WHERE user_id = ?1 AND room_id = ?2",
            params![user_id, room_id],
        )
        .await?;
        Ok(())
    }
}

fn map_row_to_room(row: Row) -> Result<Room, DbError> {
    Ok(Room {
        room_id: row.get(0)?,
        name: row.get(1)?,
        layout: RoomLayout {
            columns: row.get(2)?,
            rows: row.get(3)?,
        },
        description: row.get(4)?,
    })
}
