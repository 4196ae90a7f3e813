// [crates/cms-crypto/src/lib.rs]
/*!
 * =================================================================
 * APARATO: CREDENTIAL STORE ENGINE
 * CLASIFICACIÓN: CORE SECURITY (ESTRATO L1)
 * RESPONSABILIDAD: HASHING DE CREDENCIALES CON KDF RESISTENTE A MEMORIA
 *
 * VISION HIPER-HOLÍSTICA:
 * Sustituye el antiguo motor PBKDF2+AES-GCM del vault por Argon2id:
 * el fleet de computadoras gestionadas exige que un volcado de la
 * tabla de tokens no sea invertible por un ASIC/GPU farm barato.
 * =================================================================
 */

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("CRYPTO_RNG_EXHAUSTED: {0}")]
    RandomnessExhausted(String),
    #[error("CRYPTO_MALFORMED_HASH: {0}")]
    MalformedHash(String),
}

/// Parámetros de Argon2id tunables por configuración. Los defaults siguen
/// la recomendación OWASP para hashing interactivo de credenciales.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Argon2Params {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Façade de hashing de credenciales. Sin estado mutable propio: cada
/// llamada construye su propio motor Argon2 a partir de los parámetros.
#[derive(Debug, Clone, Copy)]
pub struct CredentialStore {
    params: Argon2Params,
}

const MFA_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MFA_CODE_LEN: usize = 6;

impl CredentialStore {
    pub fn new(params: Argon2Params) -> Self {
        CredentialStore { params }
    }

    fn engine(&self) -> Result<Argon2<'static>, CryptoError> {
        let params = Params::new(
            self.params.memory_kib,
            self.params.iterations,
            self.params.parallelism,
            None,
        )
        .map_err(|e| CryptoError::MalformedHash(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// `hash_token(plain) -> opaque_hash`. Determinista bajo una sal
    /// aleatoria embebida en la cadena PHC devuelta.
    pub fn hash_token(&self, plain: &str) -> Result<String, CryptoError> {
        let salt = SaltString::generate(&mut OsRng);
        let engine = self.engine()?;
        engine
            .hash_password(plain.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| CryptoError::MalformedHash(e.to_string()))
    }

    /// `verify_token(plain, opaque_hash) -> bool`. Comparación de
    /// tiempo constante delegada en el verificador de `argon2`; una
    /// cadena de hash corrupta se reporta como no-coincidencia, nunca
    /// como pánico.
    pub fn verify_token(&self, plain: &str, opaque_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(opaque_hash) else {
            return false;
        };
        let Ok(engine) = self.engine() else {
            return false;
        };
        engine
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok()
    }
}

/// `generate_secret(n_bytes) -> bytes`. Uniforme a partir de la fuente
/// criptográfica del sistema operativo.
pub fn generate_secret(n_bytes: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n_bytes];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// `generate_mfa_code() -> str`. Seis caracteres alfanuméricos
/// mayúsculos, selección uniforme por rechazo sobre el alfabeto fijo.
pub fn generate_mfa_code() -> String {
    let mut rng = OsRng;
    let mut out = String::with_capacity(MFA_CODE_LEN);
    for _ in 0..MFA_CODE_LEN {
        loop {
            let candidate = (rng.next_u32() % 256) as u8;
            if (candidate as usize) < (256 - 256 % MFA_ALPHABET.len()) {
                let idx = candidate as usize % MFA_ALPHABET.len();
                out.push(MFA_ALPHABET[idx] as char);
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let store = CredentialStore::new(Argon2Params::default());
        let hash = store.hash_token("correct-horse-battery-staple").unwrap();
        assert!(store.verify_token("correct-horse-battery-staple", &hash));
        assert!(!store.verify_token("wrong-password", &hash));
    }

    #[test]
    fn malformed_hash_is_reported_as_mismatch_not_panic() {
        let store = CredentialStore::new(Argon2Params::default());
        assert!(!store.verify_token("anything", "not-a-phc-string"));
    }

    #[test]
    fn generated_secrets_have_requested_length() {
        let secret = generate_secret(32);
        assert_eq!(secret.len(), 32);
    }

    #[test]
    fn mfa_codes_are_six_uppercase_alphanumeric_chars() {
        let code = generate_mfa_code();
        assert_eq!(code.len(), MFA_CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}
