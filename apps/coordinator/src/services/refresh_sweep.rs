// [apps/coordinator/src/services/refresh_sweep.rs]
/*!
 * =================================================================
 * APARATO: REFRESH TOKEN SWEEP DAEMON
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: PURGA PERIÓDICA DE REFRESH TOKENS EXPIRADOS
 *
 * Los tokens expirados ya son inútiles para autenticación (`refresh`
 * los rechaza por fecha), así que este daemon es puramente higiénico:
 * mantiene la tabla acotada sin afectar la corrección de ningún flujo.
 * =================================================================
 */

use chrono::Utc;
use cms_db::RefreshTokenRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument};

const SWEEP_INTERVAL_SECONDS: u64 = 24 * 60 * 60;

pub struct RefreshSweepDaemon {
    refresh_tokens: Arc<RefreshTokenRepository>,
}

impl RefreshSweepDaemon {
    pub fn new(refresh_tokens: Arc<RefreshTokenRepository>) -> Self {
        RefreshSweepDaemon { refresh_tokens }
    }

    /// Bucle perpetuo: duerme un día, purga, repite. Un fallo de barrido
    /// se registra y se descarta; el próximo ciclo lo reintenta.
    pub async fn spawn(self) {
        info!("refresh token sweep daemon online, interval {}s", SWEEP_INTERVAL_SECONDS);
        loop {
            sleep(Duration::from_secs(SWEEP_INTERVAL_SECONDS)).await;
            if let Err(err) = self.sweep_once().await {
                error!("refresh token sweep failed: {}", err);
            }
        }
    }

    #[instrument(skip(self))]
    async fn sweep_once(&self) -> Result<(), cms_db::DbError> {
        let purged = self.refresh_tokens.sweep_expired(Utc::now()).await?;
        if purged > 0 {
            info!("swept {} expired refresh tokens", purged);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cms_crypto::{generate_secret, Argon2Params, CredentialStore};
    use cms_db::{TursoClient, UserRepository};
    use cms_domain::Role;

    #[tokio::test]
    async fn sweep_once_purges_only_expired_rows() {
        let client = TursoClient::connect(":memory:", None).await.unwrap();
        let users = UserRepository::new(client.clone());
        let refresh_tokens = Arc::new(RefreshTokenRepository::new(client));
        let credentials = CredentialStore::new(Argon2Params::default());

        let hash = credentials.hash_token("pw").unwrap();
        let user_id = users.create_user("dana", &hash, Role::User).await.unwrap();

        let verifier = credentials.hash_token(&hex::encode(generate_secret(32))).unwrap();
        refresh_tokens
            .create_refresh_token(user_id, "expired-selector", &verifier, Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap();
        refresh_tokens
            .create_refresh_token(user_id, "live-selector", &verifier, Utc::now() + chrono::Duration::days(1))
            .await
            .unwrap();

        let daemon = RefreshSweepDaemon::new(refresh_tokens.clone());
        daemon.sweep_once().await.unwrap();

        assert!(refresh_tokens.find_by_selector("expired-selector").await.unwrap().is_none());
        assert!(refresh_tokens.find_by_selector("live-selector").await.unwrap().is_some());
    }
}
