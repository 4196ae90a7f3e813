// [apps/coordinator/src/error.rs]
/*!
 * =================================================================
 * APARATO: HTTP ERROR BOUNDARY
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: TRADUCCIÓN DE CoreError A RESPUESTAS HTTP
 *
 * Los componentes del núcleo (C1-C7) no conocen HTTP; esta es la única
 * frontera que decide el código de estado a partir de la taxonomía de
 * `cms_domain::CoreError`.
 * =================================================================
 */

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cms_domain::CoreError;
use serde_json::json;

#[derive(Debug)]
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::InvalidCredential => StatusCode::UNAUTHORIZED,
            CoreError::MalformedToken => StatusCode::UNAUTHORIZED,
            CoreError::Unknown => StatusCode::UNAUTHORIZED,
            CoreError::Expired => StatusCode::UNAUTHORIZED,
            CoreError::ReuseDetected => StatusCode::FORBIDDEN,
            CoreError::AccessDenied => StatusCode::FORBIDDEN,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            CoreError::AgentOffline => StatusCode::CONFLICT,
            CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "status": "error", "message": self.0.public_message() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
