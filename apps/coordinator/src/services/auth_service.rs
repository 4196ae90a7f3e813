// [apps/coordinator/src/services/auth_service.rs]
/*!
 * =================================================================
 * APARATO: AUTH SERVICE (C2)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: EMISIÓN, ROTACIÓN Y REVOCACIÓN DE PARES DE TOKEN
 *
 * El refresh token presentado al cliente tiene la forma
 * `"{selector}.{secret}"`, ambos hex de 16 y 32 bytes respectivamente.
 * Sólo `KDF(secret)` se persiste (`verifier_hash`); un `secret` que no
 * verifica contra el verificador de su propio `selector` es tratado
 * como robo, no como error de usuario: cascada de revocación total.
 * =================================================================
 */

use chrono::{Duration as ChronoDuration, Utc};
use cms_crypto::{generate_secret, CredentialStore};
use cms_db::{DbError, RefreshTokenRepository, UserRepository};
use cms_domain::{CoreError, Role, User, UserProfile};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: i64,
    pub username: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

pub struct IssuedTokenPair {
    pub access_token: String,
    pub access_token_expires_at: chrono::DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_at: chrono::DateTime<Utc>,
    pub profile: UserProfile,
}

pub struct AuthService {
    users: Arc<UserRepository>,
    refresh_tokens: Arc<RefreshTokenRepository>,
    credentials: Arc<CredentialStore>,
    jwt_encoding_key: Arc<EncodingKey>,
    jwt_decoding_key: Arc<DecodingKey>,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
}

impl AuthService {
    pub fn new(
        users: Arc<UserRepository>,
        refresh_tokens: Arc<RefreshTokenRepository>,
        credentials: Arc<CredentialStore>,
        jwt_encoding_key: Arc<EncodingKey>,
        jwt_decoding_key: Arc<DecodingKey>,
        access_token_ttl_seconds: i64,
        refresh_token_ttl_seconds: i64,
    ) -> Self {
        AuthService {
            users,
            refresh_tokens,
            credentials,
            jwt_encoding_key,
            jwt_decoding_key,
            access_token_ttl_seconds,
            refresh_token_ttl_seconds,
        }
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedTokenPair, CoreError> {
        let user = self
            .users
            .find_user_by_name(username)
            .await
            .map_err(map_db_err)?
            .ok_or(CoreError::InvalidCredential)?;

        if !user.active || !self.credentials.verify_token(password, &user.password_hash) {
            return Err(CoreError::InvalidCredential);
        }

        self.issue_pair(&user).await
    }

    /// Divide `presented` en `selector.secret`, busca por selector, y
    /// verifica el secreto en tiempo constante. Un secreto que no
    /// coincide con el verificador almacenado cascada a
    /// `revoke_all(user_id)` antes de fallar: el intento se interpreta
    /// como robo, no como descuido del usuario.
    #[instrument(skip(self, presented))]
    pub async fn refresh(&self, presented: &str) -> Result<IssuedTokenPair, CoreError> {
        let (selector, secret) = split_refresh_token(presented)?;

        let stored = self
            .refresh_tokens
            .find_by_selector(selector)
            .await
            .map_err(map_db_err)?
            .ok_or(CoreError::Unknown)?;

        if !self.credentials.verify_token(secret, &stored.verifier_hash) {
            warn!("refresh token reuse detected for user {}", stored.user_id);
            self.revoke_all(stored.user_id).await?;
            return Err(CoreError::ReuseDetected);
        }

        if stored.is_expired(Utc::now()) {
            self.refresh_tokens
                .destroy_refresh_token_by_selector(selector)
                .await
                .map_err(map_db_err)?;
            return Err(CoreError::Expired);
        }

        self.refresh_tokens
            .destroy_refresh_token_by_selector(selector)
            .await
            .map_err(map_db_err)?;

        let user = self
            .users
            .find_user_by_id(stored.user_id)
            .await
            .map_err(map_db_err)?
            .ok_or(CoreError::Unknown)?;

        self.issue_pair(&user).await
    }

    /// Revoca el token presentado si su secreto coincide; un secreto
    /// incorrecto devuelve `false` sin cascada (nunca autenticó, por lo
    /// que no hay nada que revocar).
    #[instrument(skip(self, presented))]
    pub async fn revoke(&self, presented: &str) -> Result<bool, CoreError> {
        let Ok((selector, secret)) = split_refresh_token(presented) else {
            return Ok(false);
        };

        let Some(stored) = self.refresh_tokens.find_by_selector(selector).await.map_err(map_db_err)? else {
            return Ok(false);
        };

        if !self.credentials.verify_token(secret, &stored.verifier_hash) {
            return Ok(false);
        }

        self.refresh_tokens
            .destroy_refresh_token_by_selector(selector)
            .await
            .map_err(map_db_err)?;
        Ok(true)
    }

    #[instrument(skip(self))]
    pub async fn revoke_all(&self, user_id: i64) -> Result<(), CoreError> {
        self.refresh_tokens.destroy_refresh_tokens_by_user(user_id).await.map_err(map_db_err)
    }

    /// Distingue expiración de cualquier otro defecto de verificación
    /// (firma inválida, claims malformados) porque el cierre de sesión por
    /// WebSocket expone ambos como motivos de `connect_error` distintos.
    pub fn decode_access_token(&self, token: &str) -> Result<AccessTokenClaims, CoreError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        decode::<AccessTokenClaims>(token, &self.jwt_decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => CoreError::Expired,
                _ => CoreError::MalformedToken,
            })
    }

    async fn issue_pair(&self, user: &User) -> Result<IssuedTokenPair, CoreError> {
        let now = Utc::now();

        let claims = AccessTokenClaims {
            sub: user.user_id,
            username: user.username.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + ChronoDuration::seconds(self.access_token_ttl_seconds)).timestamp(),
        };
        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.jwt_encoding_key)
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        let selector = hex::encode(generate_secret(16));
        let secret = hex::encode(generate_secret(32));
        let verifier_hash = self
            .credentials
            .hash_token(&secret)
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        let refresh_token_expires_at = now + ChronoDuration::seconds(self.refresh_token_ttl_seconds);

        self.refresh_tokens
            .create_refresh_token(user.user_id, &selector, &verifier_hash, refresh_token_expires_at)
            .await
            .map_err(map_db_err)?;

        info!("issued token pair for user {}", user.user_id);

        Ok(IssuedTokenPair {
            access_token,
            access_token_expires_at: now + ChronoDuration::seconds(self.access_token_ttl_seconds),
            refresh_token: format!("{selector}.{secret}"),
            refresh_token_expires_at,
            profile: UserProfile::from(user),
        })
    }
}

fn split_refresh_token(presented: &str) -> Result<(&str, &str), CoreError> {
    let mut parts = presented.splitn(2, '.');
    let selector = parts.next().filter(|s| !s.is_empty());
    let secret = parts.next().filter(|s| !s.is_empty());
    match (selector, secret) {
        (Some(s), Some(v)) => Ok((s, v)),
        _ => Err(CoreError::MalformedToken),
    }
}

fn map_db_err(err: DbError) -> CoreError {
    match err {
        DbError::NotFound => CoreError::Unknown,
        other => CoreError::Internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cms_crypto::Argon2Params;
    use cms_db::TursoClient;

    async fn build_service() -> (AuthService, Arc<UserRepository>) {
        let client = TursoClient::connect(":memory:", None).await.unwrap();
        let users = Arc::new(UserRepository::new(client.clone()));
        let refresh_tokens = Arc::new(RefreshTokenRepository::new(client));
        let credentials = Arc::new(CredentialStore::new(Argon2Params::default()));
        let jwt_encoding_key = Arc::new(EncodingKey::from_secret(b"test-secret"));
        let jwt_decoding_key = Arc::new(DecodingKey::from_secret(b"test-secret"));

        let service = AuthService::new(
            users.clone(),
            refresh_tokens,
            credentials,
            jwt_encoding_key,
            jwt_decoding_key,
            900,
            2_592_000,
        );
        (service, users)
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_rejected() {
        let (service, users) = build_service().await;
        let credentials = CredentialStore::new(Argon2Params::default());
        let hash = credentials.hash_token("correct-password").unwrap();
        users.create_user("alice", &hash, Role::User).await.unwrap();

        let err = service.login("alice", "wrong-password").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidCredential));
    }

    #[tokio::test]
    async fn login_then_refresh_rotates_token() {
        let (service, users) = build_service().await;
        let credentials = CredentialStore::new(Argon2Params::default());
        let hash = credentials.hash_token("correct-password").unwrap();
        users.create_user("bob", &hash, Role::User).await.unwrap();

        let pair = service.login("bob", "correct-password").await.unwrap();
        let rotated = service.refresh(&pair.refresh_token).await.unwrap();

        assert_ne!(pair.refresh_token, rotated.refresh_token);
        assert!(service.refresh(&pair.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn refresh_with_tampered_secret_revokes_all_sessions() {
        let (service, users) = build_service().await;
        let credentials = CredentialStore::new(Argon2Params::default());
        let hash = credentials.hash_token("correct-password").unwrap();
        users.create_user("carol", &hash, Role::User).await.unwrap();

        let pair = service.login("carol", "correct-password").await.unwrap();
        let selector = pair.refresh_token.split('.').next().unwrap();
        let tampered = format!("{selector}.0000000000000000000000000000000000000000000000000000000000000000");

        let err = service.refresh(&tampered).await.unwrap_err();
        assert!(matches!(err, CoreError::ReuseDetected));

        assert!(service.refresh(&pair.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn malformed_refresh_token_is_rejected() {
        let (service, _users) = build_service().await;
        let err = service.refresh("not-a-valid-token").await.unwrap_err();
        assert!(matches!(err, CoreError::MalformedToken));
    }
}
