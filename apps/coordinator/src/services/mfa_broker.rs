// [apps/coordinator/src/services/mfa_broker.rs]
/*!
 * =================================================================
 * APARATO: MFA BROKER (C3)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: BOOTSTRAP DE AGENTES MEDIANTE CÓDIGOS DE UN SOLO USO
 *
 * Caché volátil y local al proceso: no se asume compartición entre
 * procesos. A lo sumo una entrada viva por `agent_id`; regenerar
 * reemplaza, verificar con éxito consume.
 * =================================================================
 */

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cms_crypto::generate_mfa_code;
use cms_domain::computer::PositionInfo;
use dashmap::DashMap;
use tracing::{instrument, warn};

const MFA_ENTRY_TTL_MINUTES: i64 = 5;

struct MfaEntry {
    code: String,
    position_info: PositionInfo,
    expires_at: DateTime<Utc>,
}

pub struct MfaBroker {
    entries: DashMap<String, MfaEntry>,
}

impl MfaBroker {
    pub fn new() -> Self {
        MfaBroker { entries: DashMap::new() }
    }

    /// Genera un código fresco para `agent_id`, reemplazando cualquier
    /// entrada previa. Devuelve el código en claro para que el llamador
    /// lo anuncie fuera de banda (vía `admin:new_agent_mfa`).
    #[instrument(skip(self))]
    pub fn issue(&self, agent_id: &str, position_info: PositionInfo) -> String {
        let code = generate_mfa_code();
        self.entries.insert(
            agent_id.to_string(),
            MfaEntry {
                code: code.clone(),
                position_info,
                expires_at: Utc::now() + ChronoDuration::minutes(MFA_ENTRY_TTL_MINUTES),
            },
        );
        code
    }

    /// Verifica `presented_code` contra la entrada cacheada de `agent_id`.
    /// Éxito consume la entrada y devuelve su `position_info`; fallo (o
    /// expiración) la deja intacta para reintento dentro de la ventana,
    /// salvo que ya haya expirado, en cuyo caso se purga.
    #[instrument(skip(self, presented_code))]
    pub fn verify(&self, agent_id: &str, presented_code: &str) -> Option<PositionInfo> {
        let Some(entry) = self.entries.get(agent_id) else {
            return None;
        };

        if entry.expires_at < Utc::now() {
            drop(entry);
            self.entries.remove(agent_id);
            warn!("MFA entry for {} expired before verification", agent_id);
            return None;
        }

        let presented_upper = presented_code.to_ascii_uppercase();
        if !constant_time_eq(entry.code.as_bytes(), presented_upper.as_bytes()) {
            return None;
        }

        let position_info = entry.position_info.clone();
        drop(entry);
        self.entries.remove(agent_id);
        Some(position_info)
    }
}

impl Default for MfaBroker {
    fn default() -> Self {
        Self::new()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position() -> PositionInfo {
        PositionInfo { room_name: "lab-1".to_string(), pos_x: 0, pos_y: 0 }
    }

    #[test]
    fn issue_then_verify_with_correct_code_consumes_entry() {
        let broker = MfaBroker::new();
        let code = broker.issue("agent-a", position());

        let result = broker.verify("agent-a", &code);
        assert!(result.is_some());
        assert!(broker.verify("agent-a", &code).is_none());
    }

    #[test]
    fn verify_with_wrong_code_leaves_entry_intact() {
        let broker = MfaBroker::new();
        let code = broker.issue("agent-b", position());

        assert!(broker.verify("agent-b", "WRONGCODE").is_none());
        assert!(broker.verify("agent-b", &code).is_some());
    }

    #[test]
    fn verify_is_case_insensitive() {
        let broker = MfaBroker::new();
        let code = broker.issue("agent-d", position());

        assert!(broker.verify("agent-d", &code.to_ascii_lowercase()).is_some());
    }

    #[test]
    fn reissuing_replaces_previous_code() {
        let broker = MfaBroker::new();
        let first = broker.issue("agent-c", position());
        let second = broker.issue("agent-c", position());

        assert_ne!(first, second);
        assert!(broker.verify("agent-c", &first).is_none());
        assert!(broker.verify("agent-c", &second).is_some());
    }
}
