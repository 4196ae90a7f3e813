// [crates/cms-domain/src/agent_version.rs]
/*!
 * =================================================================
 * APARATO: AGENT VERSION DOMAIN MODEL
 * CLASIFICACIÓN: DOMAIN ENTITIES (ESTRATO L2)
 * RESPONSABILIDAD: CATÁLOGO DE PAQUETES DISTRIBUIBLES DEL AGENT
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A lo sumo una fila de este catálogo tiene `is_stable = true` en un
/// instante dado; esa invariante se hace cumplir en el repositorio, no
/// aquí (la entidad es sólo la proyección de una fila).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentVersion {
    pub version_id: i64,
    pub version: String,
    pub checksum_sha256: String,
    pub download_url: String,
    pub file_path: String,
    pub file_size: i64,
    pub notes: Option<String>,
    pub is_stable: bool,
    pub created_at: DateTime<Utc>,
}

impl AgentVersion {
    /// Compara versiones semver; `None` si cualquiera de las dos cadenas
    /// no parsea (tratado como "no comparable", nunca como pánico).
    pub fn is_newer_than(&self, other_version: &str) -> Option<bool> {
        let mine = semver::Version::parse(self.version.trim_start_matches('v')).ok()?;
        let theirs = semver::Version::parse(other_version.trim_start_matches('v')).ok()?;
        Some(mine > theirs)
    }
}
