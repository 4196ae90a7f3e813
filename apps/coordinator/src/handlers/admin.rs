// [apps/coordinator/src/handlers/admin.rs]
/*!
 * =================================================================
 * APARATO: ADMINISTRATIVE HANDLERS
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: CATÁLOGO DE VERSIONES Y PANEL DE ESTADÍSTICAS
 *
 * Montado detrás de `auth_guard` + `admin_guard`: todo handler de este
 * módulo asume que el rol `admin` ya fue verificado por la pila de
 * middleware.
 * =================================================================
 */

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use cms_db::DbError;
use cms_domain::{AgentVersion, CoreError};
use serde::Deserialize;
use serde_json::{json, Value};

pub async fn upload_version(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<(StatusCode, Json<AgentVersion>)> {
    let mut package_bytes: Option<Vec<u8>> = None;
    let mut original_filename = String::from("package.bin");
    let mut version: Option<String> = None;
    let mut notes: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_err)? {
        match field.name().unwrap_or_default() {
            "package" => {
                original_filename = field.file_name().unwrap_or("package.bin").to_string();
                package_bytes = Some(field.bytes().await.map_err(multipart_err)?.to_vec());
            }
            "version" => version = Some(field.text().await.map_err(multipart_err)?),
            "notes" => notes = Some(field.text().await.map_err(multipart_err)?),
            _ => {}
        }
    }

    let package_bytes = package_bytes.ok_or_else(|| CoreError::ValidationFailed("missing 'package' field".to_string()))?;
    let version = version.ok_or_else(|| CoreError::ValidationFailed("missing 'version' field".to_string()))?;

    let agent_version = state
        .version_catalog
        .ingest(&original_filename, &package_bytes, &version, notes.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(agent_version)))
}

#[derive(Debug, Deserialize)]
pub struct SetStabilityRequest {
    pub is_stable: bool,
}

pub async fn set_stability(
    State(state): State<AppState>,
    Path(version_id): Path<i64>,
    Json(body): Json<SetStabilityRequest>,
) -> ApiResult<StatusCode> {
    state.version_catalog.set_stable(version_id, body.is_stable).await?;

    if body.is_stable {
        if let Some(version) = state.version_catalog.current_stable().await? {
            state.session_hub.emit_to_all_agents(
                "agent:new_version_available",
                json!({
                    "version": version.version,
                    "download_url": version.download_url,
                    "checksum_sha256": version.checksum_sha256,
                    "notes": version.notes,
                }),
            );
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_versions(State(state): State<AppState>) -> ApiResult<Json<Vec<AgentVersion>>> {
    let mut versions = state.version_catalog.list_versions().await?;
    versions.sort_by(|a, b| b.is_stable.cmp(&a.is_stable).then(b.created_at.cmp(&a.created_at)));
    Ok(Json(versions))
}

pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let computer_count = state.computers.count_computers().await.map_err(map_db_err)?;
    let unresolved_errors = state.computers.list_unresolved_errors().await.map_err(map_db_err)?;

    Ok(Json(json!({
        "computer_count": computer_count,
        "connected_agent_count": state.session_hub.connected_agent_count(),
        "online_user_count": state.session_hub.online_user_count(),
        "pending_command_count": state.command_coordinator.pending_count(),
        "unresolved_error_count": unresolved_errors.len(),
        "unresolved_errors": unresolved_errors
            .into_iter()
            .map(|(computer_id, error)| json!({ "computer_id": computer_id, "error": error }))
            .collect::<Vec<_>>(),
    })))
}

fn multipart_err(err: axum::extract::multipart::MultipartError) -> crate::error::ApiError {
    CoreError::ValidationFailed(err.to_string()).into()
}

fn map_db_err(err: DbError) -> CoreError {
    match err {
        DbError::NotFound => CoreError::NotFound("resource".to_string()),
        other => CoreError::Internal(other.to_string()),
    }
}
