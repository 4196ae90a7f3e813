// [crates/cms-domain/src/command.rs]
/*!
 * =================================================================
 * APARATO: COMMAND DISPATCH DTOS
 * CLASIFICACIÓN: DOMAIN ENTITIES (ESTRATO L2)
 * RESPONSABILIDAD: FORMAS DE DATOS DEL DESPACHO Y CORRELACIÓN DE COMANDOS
 *
 * `command_type` es una cadena libre acotada a 32 bytes con default
 * "console"; no se modela como enum cerrado porque nuevas familias de
 * comando (powershell, bash, script) se añaden sin tocar este aparato.
 * =================================================================
 */

use serde::{Deserialize, Serialize};

/// Envoltura del tipo de comando. `CommandType::Other` retiene cualquier
/// etiqueta no reconocida en vez de rechazarla.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CommandType(pub String);

impl Default for CommandType {
    fn default() -> Self {
        CommandType("console".to_string())
    }
}

impl CommandType {
    pub const MAX_LEN: usize = 32;

    pub fn from_input(raw: Option<String>) -> Self {
        match raw {
            Some(s) if !s.is_empty() => CommandType(s),
            _ => CommandType::default(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.len() <= Self::MAX_LEN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Resultado normalizado reportado por un agente vía `agent:command_result`.
/// Construido con defaults en lugar de fallar ante campos ausentes: los
/// campos faltantes se coercionan a su default, nunca rechazan el frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default, rename = "type")]
    pub result_type: Option<String>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exit_code: i64,
}

impl CommandResult {
    pub fn normalized_type(&self) -> String {
        self.result_type
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "console".to_string())
    }
}
