// [apps/coordinator/src/middleware.rs]
/*!
 * =================================================================
 * APARATO: AUTHENTICATION GUARDS
 * CLASIFICACIÓN: SECURITY STRATUM (ESTRATO L4)
 * RESPONSABILIDAD: VALIDACIÓN DE PORTADOR E INYECCIÓN DE IDENTIDAD
 *
 * Dos guardias distintas porque la frontera tiene dos ciudadanías: un
 * operador humano porta un JWT de acceso firmado por este mismo
 * proceso; un agente porta un token opaco verificado contra su hash
 * Argon2id más la cabecera `X-Agent-ID`.
 * =================================================================
 */

use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Decodifica el JWT de acceso e inyecta `AccessTokenClaims` como
/// extensión de la petición. Rechaza con 401 ante ausencia, firma
/// inválida, o expiración.
pub async fn auth_guard(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(token) = bearer_token(&req) else {
        return unauthorized("missing bearer token");
    };

    match state.auth_service.decode_access_token(token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(_) => {
            warn!("access token rejected at auth_guard");
            unauthorized("invalid or expired access token")
        }
    }
}

/// Como `auth_guard`, pero además exige rol `admin` en los claims ya
/// inyectados. Debe montarse después de `auth_guard` en la pila.
pub async fn admin_guard(req: Request, next: Next) -> Response {
    let Some(claims) = req.extensions().get::<crate::services::auth_service::AccessTokenClaims>() else {
        return unauthorized("missing authentication context");
    };
    if !claims.role.is_admin() {
        return (StatusCode::FORBIDDEN, Json(json!({ "status": "error", "message": "Access denied" }))).into_response();
    }
    next.run(req).await
}

/// Verifica el portador del agente contra `X-Agent-ID` + el hash
/// almacenado, e inyecta `computer_id` como extensión de la petición.
pub async fn agent_guard(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(token) = bearer_token(&req) else {
        return unauthorized("missing bearer token");
    };
    let Some(agent_id) = req.headers().get("X-Agent-ID").and_then(|v| v.to_str().ok()).map(str::to_string) else {
        return unauthorized("missing X-Agent-ID header");
    };

    match state.agent_registry.verify_agent_token(&agent_id, token).await {
        Ok(Some(computer_id)) => {
            req.extensions_mut().insert(AgentIdentity { computer_id, agent_id });
            next.run(req).await
        }
        _ => unauthorized("invalid agent credentials"),
    }
}

#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub computer_id: i64,
    pub agent_id: String,
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "status": "error", "message": message }))).into_response()
}
