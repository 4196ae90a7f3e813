// [crates/cms-domain/src/computer.rs]
/*!
 * =================================================================
 * APARATO: COMPUTER DOMAIN MODELS
 * CLASIFICACIÓN: DOMAIN ENTITIES (ESTRATO L2)
 * RESPONSABILIDAD: ESTACIÓN DE TRABAJO GESTIONADA Y SU BITÁCORA DE FALLOS
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Registro persistente de una estación de trabajo gestionada por un Agent.
/// `have_active_errors` se mantiene en sincronía con `errors` en cada
/// mutación: nunca se deriva perezosamente en el límite HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Computer {
    pub computer_id: i64,
    pub agent_id: String,
    #[serde(skip_serializing)]
    pub agent_token_hash: Option<String>,
    pub room_id: Option<i64>,
    pub pos_x: i32,
    pub pos_y: i32,
    pub name: String,
    pub hardware_info: Option<Value>,
    pub errors: Vec<ErrorRecord>,
    pub have_active_errors: bool,
}

impl Computer {
    /// Recalcula `have_active_errors` a partir de `errors`. Se invoca tras
    /// cualquier inserción o resolución de un `ErrorRecord`.
    pub fn recompute_active_errors(&mut self) {
        self.have_active_errors = self.errors.iter().any(|e| !e.resolved);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error_id: i64,
    pub error_type: String,
    pub error_message: String,
    pub error_details: Option<String>,
    pub reported_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
}

/// Posición dentro de una sala, tal como la reporta el agente en
/// `/agent/identify` y como la retiene un `MFAEntry` en tránsito.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PositionInfo {
    pub room_name: String,
    pub pos_x: i32,
    pub pos_y: i32,
}
