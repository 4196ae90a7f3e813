// [crates/cms-domain/src/user.rs]
/*!
 * =================================================================
 * APARATO: IDENTITY DOMAIN MODELS
 * CLASIFICACIÓN: DOMAIN ENTITIES (ESTRATO L2)
 * RESPONSABILIDAD: PRINCIPAL DE USUARIO Y SESIONES DE REFRESH TOKEN
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identidad autenticable. `password_hash` nunca sale del proceso del
/// servidor: la frontera HTTP sólo ve `UserProfile`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Proyección pública de `User`, segura para enviar por la frontera.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub active: bool,
}

impl From<&User> for UserProfile {
    fn from(u: &User) -> Self {
        UserProfile {
            user_id: u.user_id,
            username: u.username.clone(),
            role: u.role,
            active: u.active,
        }
    }
}

/// Fila de sesión renovable. `verifier_hash` es el KDF del secreto de 32
/// bytes; `selector` es el índice público de 16 bytes aleatorios. Para
/// cualquier selector existe a lo sumo una fila viva.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub token_id: i64,
    pub user_id: i64,
    pub selector: String,
    #[serde(skip_serializing)]
    pub verifier_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
