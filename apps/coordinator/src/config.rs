// [apps/coordinator/src/config.rs]
/*!
 * =================================================================
 * APARATO: COORDINATOR CONFIGURATION
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: LECTURA Y VALIDACIÓN DEL ENTORNO DE EJECUCIÓN
 * =================================================================
 */

use cms_crypto::Argon2Params;
use cms_domain::duration::parse_ttl;
use std::env;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub api_root: String,
    pub access_token_secret: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub argon2_params: Argon2Params,
    pub package_data_dir: String,
    pub max_package_upload_bytes: u64,
    pub offline_debounce_ms: u64,
    pub pending_command_timeout_secs: u64,
    pub database_url: String,
    pub turso_auth_token: Option<String>,
    pub port: u16,
}

impl CoordinatorConfig {
    /// Hidrata la configuración desde el entorno del proceso. Falla rápido
    /// (`expect`) sobre variables sin las que el sistema no puede operar
    /// con seguridad (`ACCESS_TOKEN_SECRET`, `DATABASE_URL`); todo lo
    /// demás cae a un default razonable para despliegue local.
    pub fn from_env() -> Self {
        CoordinatorConfig {
            api_root: env::var("API_ROOT").unwrap_or_else(|_| "/api/v1".to_string()),
            access_token_secret: env::var("ACCESS_TOKEN_SECRET")
                .expect("CRITICAL_FAULT: ACCESS_TOKEN_SECRET not defined in runtime environment."),
            access_token_ttl_seconds: parse_ttl(&env::var("ACCESS_TOKEN_TTL").unwrap_or_else(|_| "15m".to_string()))
                .num_seconds(),
            refresh_token_ttl_seconds: parse_ttl(&env::var("REFRESH_TOKEN_TTL").unwrap_or_else(|_| "30d".to_string()))
                .num_seconds(),
            argon2_params: Argon2Params {
                memory_kib: env_parse_or("ARGON2_MEMORY_KIB", 19_456),
                iterations: env_parse_or("ARGON2_ITERATIONS", 2),
                parallelism: env_parse_or("ARGON2_PARALLELISM", 1),
            },
            package_data_dir: env::var("PACKAGE_DATA_DIR").unwrap_or_else(|_| "./data/agent-packages".to_string()),
            max_package_upload_bytes: env_parse_or("MAX_PACKAGE_UPLOAD_BYTES", 50 * 1024 * 1024),
            offline_debounce_ms: env_parse_or("OFFLINE_DEBOUNCE_MS", 1500),
            pending_command_timeout_secs: env_parse_or("PENDING_COMMAND_TIMEOUT_SECS", 300),
            database_url: env::var("DATABASE_URL")
                .expect("CRITICAL_FAULT: DATABASE_URL not defined in runtime environment."),
            turso_auth_token: env::var("TURSO_AUTH_TOKEN").ok(),
            port: env_parse_or("PORT", 3000),
        }
    }
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|raw| raw.parse().ok()).unwrap_or(default)
}
