// [apps/coordinator/src/services/version_catalog.rs]
/*!
 * =================================================================
 * APARATO: VERSION CATALOG (C7)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: DISTRIBUCIÓN DE PAQUETES DE AGENTE VERIFICADOS
 *
 * Los paquetes se materializan bajo `<data_dir>/agent-packages/` con un
 * nombre derivado de su propio checksum SHA-256, de modo que dos subidas
 * con bytes idénticos comparten archivo. `serve` nunca confía en el
 * nombre de archivo solicitado por el agente más allá de validarlo
 * contra separadores de ruta.
 * =================================================================
 */

use cms_db::{AgentVersionRepository, DbError};
use cms_domain::{AgentVersion, CoreError};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, instrument};

const ALLOWED_EXTENSIONS: &[&str] = &["zip", "gz", "tar"];
const MAX_PACKAGE_BYTES: u64 = 50 * 1024 * 1024;

pub struct VersionCatalog {
    agent_versions: Arc<AgentVersionRepository>,
    package_dir: PathBuf,
    max_upload_bytes: u64,
}

impl VersionCatalog {
    pub fn new(agent_versions: Arc<AgentVersionRepository>, package_dir: impl Into<PathBuf>, max_upload_bytes: u64) -> Self {
        VersionCatalog {
            agent_versions,
            package_dir: package_dir.into(),
            max_upload_bytes: max_upload_bytes.min(MAX_PACKAGE_BYTES).max(1),
        }
    }

    /// Persiste `file_bytes` bajo un nombre derivado de su checksum y
    /// registra una nueva fila con `is_stable = false`. Rechaza
    /// extensiones fuera de `{.zip, .gz, .tar}`, tamaños por encima del
    /// máximo configurado, y versiones vacías.
    #[instrument(skip(self, file_bytes, notes))]
    pub async fn ingest(
        &self,
        original_filename: &str,
        file_bytes: &[u8],
        version: &str,
        notes: Option<&str>,
    ) -> Result<AgentVersion, CoreError> {
        if version.trim().is_empty() {
            return Err(CoreError::ValidationFailed("version must not be empty".to_string()));
        }

        let extension = Path::new(original_filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let Some(extension) = extension.filter(|e| ALLOWED_EXTENSIONS.contains(&e.as_str())) else {
            return Err(CoreError::ValidationFailed(
                "package extension must be one of .zip, .gz, .tar".to_string(),
            ));
        };

        if file_bytes.len() as u64 > self.max_upload_bytes {
            return Err(CoreError::ValidationFailed("package exceeds the maximum upload size".to_string()));
        }

        let checksum = hex::encode(Sha256::digest(file_bytes));
        let stored_filename = format!("{checksum}.{extension}");

        fs::create_dir_all(&self.package_dir)
            .await
            .map_err(|e| CoreError::Internal(format!("failed to create package directory: {e}")))?;

        let stored_path = self.package_dir.join(&stored_filename);
        fs::write(&stored_path, file_bytes)
            .await
            .map_err(|e| CoreError::Internal(format!("failed to persist package: {e}")))?;

        let version_id = self
            .agent_versions
            .insert_version(
                version,
                &checksum,
                &format!("/agent/agent-packages/{stored_filename}"),
                &stored_filename,
                file_bytes.len() as i64,
                notes,
            )
            .await
            .map_err(map_db_err)?;

        info!("ingested agent package version {} ({} bytes)", version, file_bytes.len());

        self.agent_versions
            .find_by_filename(&stored_filename)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| CoreError::Internal(format!("version {version_id} vanished immediately after insert")))
    }

    /// Promueve (o despromueve) `version_id`. El llamador es responsable de
    /// notificar a la flota a través del hub tras una promoción; este
    /// aparato sólo garantiza la invariante de unicidad en el repositorio.
    #[instrument(skip(self))]
    pub async fn set_stable(&self, version_id: i64, flag: bool) -> Result<(), CoreError> {
        self.agent_versions.upsert_agent_version_stability(version_id, flag).await.map_err(map_db_err)
    }

    #[instrument(skip(self))]
    pub async fn list_versions(&self) -> Result<Vec<AgentVersion>, CoreError> {
        self.agent_versions.list_agent_versions().await.map_err(map_db_err)
    }

    /// La fila actualmente estable, si existe. Usado por el llamador tras
    /// una promoción para componer la notificación de flota.
    #[instrument(skip(self))]
    pub async fn current_stable(&self) -> Result<Option<AgentVersion>, CoreError> {
        self.agent_versions.find_stable().await.map_err(map_db_err)
    }

    /// Devuelve la versión estable más reciente si es estrictamente más
    /// nueva que `current_version` bajo comparación semver; si
    /// `current_version` es `None`, la devuelve incondicionalmente.
    #[instrument(skip(self))]
    pub async fn latest_stable_newer_than(&self, current_version: Option<&str>) -> Result<Option<AgentVersion>, CoreError> {
        let Some(stable) = self.agent_versions.find_stable().await.map_err(map_db_err)? else {
            return Ok(None);
        };

        match current_version {
            None => Ok(Some(stable)),
            Some(current) => match stable.is_newer_than(current) {
                Some(true) => Ok(Some(stable)),
                _ => Ok(None),
            },
        }
    }

    /// Resuelve `filename` bajo el directorio de paquetes, rechazando
    /// cualquier separador de ruta en la entrada.
    #[instrument(skip(self))]
    pub async fn serve(&self, filename: &str) -> Result<Vec<u8>, CoreError> {
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return Err(CoreError::ValidationFailed("invalid package filename".to_string()));
        }

        let path = self.package_dir.join(filename);
        fs::read(&path)
            .await
            .map_err(|_| CoreError::NotFound(format!("package '{filename}'")))
    }
}

fn map_db_err(err: DbError) -> CoreError {
    match err {
        DbError::NotFound => CoreError::NotFound("agent version".to_string()),
        other => CoreError::Internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cms_db::TursoClient;
    use tempfile::tempdir;

    async fn build_catalog() -> (VersionCatalog, tempfile::TempDir) {
        let client = TursoClient::connect(":memory:", None).await.unwrap();
        let repo = Arc::new(AgentVersionRepository::new(client));
        let dir = tempdir().unwrap();
        let catalog = VersionCatalog::new(repo, dir.path().to_path_buf(), 50 * 1024 * 1024);
        (catalog, dir)
    }

    #[tokio::test]
    async fn ingest_rejects_disallowed_extension() {
        let (catalog, _dir) = build_catalog().await;
        let err = catalog.ingest("payload.exe", b"binary", "1.0.0", None).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn ingest_then_serve_round_trips_bytes() {
        let (catalog, _dir) = build_catalog().await;
        let version = catalog.ingest("payload.zip", b"package-bytes", "1.2.3", Some("notes")).await.unwrap();

        let served = catalog.serve(&version.file_path.rsplit('/').next().unwrap()).await.unwrap();
        assert_eq!(served, b"package-bytes");
    }

    #[tokio::test]
    async fn serve_rejects_path_traversal() {
        let (catalog, _dir) = build_catalog().await;
        let err = catalog.serve("../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn latest_stable_newer_than_respects_semver() {
        let (catalog, _dir) = build_catalog().await;
        let version = catalog.ingest("payload.zip", b"bytes", "2.0.0", None).await.unwrap();
        catalog.set_stable(version.version_id, true).await.unwrap();

        let newer = catalog.latest_stable_newer_than(Some("1.0.0")).await.unwrap();
        assert!(newer.is_some());

        let not_newer = catalog.latest_stable_newer_than(Some("3.0.0")).await.unwrap();
        assert!(not_newer.is_none());
    }
}
