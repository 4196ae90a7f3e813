// [apps/coordinator/src/handlers/agent.rs]
/*!
 * =================================================================
 * APARATO: AGENT-FACING HANDLERS
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: BOOTSTRAP MFA, TELEMETRÍA DE HARDWARE Y ACTUALIZACIÓN
 *
 * `identify` se ramifica en tres desenlaces: un agente ya provisto de
 * `agent_token_hash` simplemente refresca posición y token; uno nuevo
 * pasa primero por el pre-chequeo de posición y, si es válido, emite un
 * código MFA al room `admin` en vez de registrar directamente.
 * =================================================================
 */

use crate::error::ApiResult;
use crate::middleware::AgentIdentity;
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use cms_db::DbError;
use cms_domain::computer::PositionInfo;
use cms_domain::CoreError;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct IdentifyRequest {
    pub agent_id: String,
    pub position_info: PositionInfo,
}

pub async fn identify(State(state): State<AppState>, Json(body): Json<IdentifyRequest>) -> ApiResult<Json<Value>> {
    let existing = state.agent_registry.find_by_agent_id(&body.agent_id).await?;
    let already_bootstrapped = existing.map(|computer| computer.agent_token_hash.is_some()).unwrap_or(false);

    if already_bootstrapped {
        return match state.agent_registry.register_or_refresh(&body.agent_id, &body.position_info).await {
            Ok((_, agent_token)) => Ok(Json(json!({ "status": "success", "agent_token": agent_token }))),
            Err(CoreError::ValidationFailed(message)) | Err(CoreError::Conflict(message)) => {
                Ok(Json(json!({ "status": "position_error", "message": message })))
            }
            Err(other) => Err(other.into()),
        };
    }

    if let Err(err) = state.agent_registry.check_position(&body.position_info, &body.agent_id).await {
        return match err {
            CoreError::ValidationFailed(message) | CoreError::Conflict(message) => {
                Ok(Json(json!({ "status": "position_error", "message": message })))
            }
            other => Err(other.into()),
        };
    }

    let mfa_code = state.mfa_broker.issue(&body.agent_id, body.position_info.clone());
    state.session_hub.emit_to_admins(
        "admin:new_agent_mfa",
        json!({ "mfa_code": mfa_code, "position_info": body.position_info }),
    );

    Ok(Json(json!({ "status": "mfa_required" })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyMfaRequest {
    pub agent_id: String,
    pub mfa_code: String,
}

pub async fn verify_mfa(State(state): State<AppState>, Json(body): Json<VerifyMfaRequest>) -> ApiResult<Json<Value>> {
    let Some(position_info) = state.mfa_broker.verify(&body.agent_id, &body.mfa_code) else {
        return Err(CoreError::InvalidCredential.into());
    };

    let (_, agent_token) = state.agent_registry.register_or_refresh(&body.agent_id, &position_info).await?;
    state.session_hub.emit_to_admins("admin:agent_registered", json!({ "agent_id": body.agent_id }));

    Ok(Json(json!({ "status": "success", "agent_token": agent_token })))
}

pub async fn hardware_info(
    State(state): State<AppState>,
    Extension(identity): Extension<AgentIdentity>,
    Json(hardware_info): Json<Value>,
) -> ApiResult<StatusCode> {
    let mut computer = state
        .computers
        .find_computer_by_id(identity.computer_id)
        .await
        .map_err(map_db_err)?
        .ok_or(CoreError::Unknown)?;

    computer.hardware_info = Some(hardware_info);
    state.computers.save_computer(&computer).await.map_err(map_db_err)?;

    Ok(StatusCode::NO_CONTENT)
}

const MAX_ERROR_TYPE_BYTES: usize = 50;

#[derive(Debug, Deserialize)]
pub struct ReportErrorRequest {
    pub error_type: String,
    pub error_message: String,
    pub error_details: Option<String>,
}

pub async fn report_error(
    State(state): State<AppState>,
    Extension(identity): Extension<AgentIdentity>,
    Json(body): Json<ReportErrorRequest>,
) -> ApiResult<StatusCode> {
    if body.error_type.is_empty() || body.error_type.len() > MAX_ERROR_TYPE_BYTES {
        return Err(CoreError::ValidationFailed(format!("error_type must be 1-{MAX_ERROR_TYPE_BYTES} bytes")).into());
    }

    state
        .computers
        .append_error(identity.computer_id, &body.error_type, &body.error_message, body.error_details.as_deref())
        .await
        .map_err(map_db_err)?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CheckUpdateQuery {
    pub current_version: Option<String>,
}

pub async fn check_update(State(state): State<AppState>, Query(query): Query<CheckUpdateQuery>) -> ApiResult<Response> {
    let newer = state.version_catalog.latest_stable_newer_than(query.current_version.as_deref()).await?;

    Ok(match newer {
        Some(version) => Json(json!({
            "version": version.version,
            "download_url": version.download_url,
            "checksum_sha256": version.checksum_sha256,
            "notes": version.notes,
        }))
        .into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

pub async fn download_package(State(state): State<AppState>, Path(filename): Path<String>) -> ApiResult<Response> {
    let bytes = state.version_catalog.serve(&filename).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes).into_response())
}

fn map_db_err(err: DbError) -> CoreError {
    match err {
        DbError::NotFound => CoreError::Unknown,
        other => CoreError::Internal(other.to_string()),
    }
}
