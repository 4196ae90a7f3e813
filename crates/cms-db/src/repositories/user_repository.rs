// [crates/cms-db/src/repositories/user_repository.rs]
/*!
 * =================================================================
 * APARATO: USER REPOSITORY
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: ACCESO NOMINAL A LA TABLA DE PRINCIPALES DE USUARIO
 * =================================================================
 */

use crate::errors::DbError;
use crate::client::TursoClient;
use crate::util::parse_timestamp;
use cms_domain::{Role, User};
use libsql::{params, Row};
use tracing::instrument;

pub struct UserRepository {
    client: TursoClient,
}

impl UserRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { client }
    }

    #[instrument(skip(self), fields(username = %username))]
    pub async fn find_user_by_name(&self, username: &str) -> Result<Option<User>, DbError> {
        let conn = self.client.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT user_id, username, password_hash, role, active, created_at, updated_at
                 FROM users WHERE username = ?1",
                params![username],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_row_to_user(row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, DbError> {
        let conn = self.client.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT user_id, username, password_hash, role, active, created_at, updated_at
                 FROM users WHERE user_id = ?1",
                params![user_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_row_to_user(row)?)),
            None => Ok(None),
        }
    }

    /// Creación administrativa; fuera del flujo caliente de autenticación
    /// pero necesaria para alimentar cualquier prueba o bootstrap.
    #[instrument(skip(self, password_hash))]
    pub async fn create_user(&self, username: &str, password_hash: &str, role: Role) -> Result<i64, DbError> {
        let conn = self.client.get_connection()?;
        let role_label = role_to_label(role);
        conn.execute(
            "INSERT INTO users (username, password_hash, role, active) VALUES (?1, ?2, ?3, 1)",
            params![username, password_hash, role_label],
        )
        .await?;
        Ok(conn.last_insert_rowid())
    }

    /// Desactiva al usuario; invalidación en cascada de sus refresh
    /// tokens es responsabilidad del servicio de autenticación.
    #[instrument(skip(self))]
    pub async fn deactivate_user(&self, user_id: i64) -> Result<(), DbError> {
        let conn = self.client.get_connection()?;
        let changed = conn
            .execute(
                "UPDATE users SET active = 0, updated_at = CURRENT_TIMESTAMP WHERE user_id = ?1",
                params![user_id],
            )
            .await?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

fn role_to_label(role: Role) -> &'static str {
    match role {
        Role::Admin => "admin",
        Role::User => "user",
    }
}

fn map_row_to_user(row: Row) -> Result<User, DbError> {
    let role_raw: String = row.get(3)?;
    let role = match role_raw.as_str() {
        "admin" => Role::Admin,
        _ => Role::User,
    };

    Ok(User {
        user_id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        role,
        active: row.get::<i64>(4)? != 0,
        created_at: parse_timestamp(&row.get::<String>(5)?),
        updated_at: parse_timestamp(&row.get::<String>(6)?),
    })
}
