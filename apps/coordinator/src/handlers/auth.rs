// [apps/coordinator/src/handlers/auth.rs]
/*!
 * =================================================================
 * APARATO: AUTHENTICATION HANDLERS
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: LOGIN, ROTACIÓN DE REFRESH TOKEN, LOGOUT, PERFIL
 *
 * El refresh token nunca viaja en el cuerpo JSON: vive exclusivamente
 * en una cookie `HttpOnly, Secure, SameSite=Strict`. El cuerpo de
 * respuesta sólo transporta el access token de vida corta.
 * =================================================================
 */

use crate::error::ApiResult;
use crate::services::auth_service::AccessTokenClaims;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Utc};
use cms_db::DbError;
use cms_domain::{CoreError, UserProfile};
use serde::{Deserialize, Serialize};

const REFRESH_COOKIE_NAME: &str = "refresh_token";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub user: Option<UserProfile>,
}

pub async fn login(State(state): State<AppState>, jar: CookieJar, Json(body): Json<LoginRequest>) -> ApiResult<(CookieJar, Json<TokenResponse>)> {
    let pair = state.auth_service.login(&body.username, &body.password).await?;
    let jar = jar.add(refresh_cookie(&pair.refresh_token, state.config.refresh_token_ttl_seconds));

    Ok((
        jar,
        Json(TokenResponse {
            access_token: pair.access_token,
            access_token_expires_at: pair.access_token_expires_at,
            user: Some(pair.profile),
        }),
    ))
}

pub async fn refresh_token(State(state): State<AppState>, jar: CookieJar) -> ApiResult<(CookieJar, Json<TokenResponse>)> {
    let presented = jar
        .get(REFRESH_COOKIE_NAME)
        .map(|cookie| cookie.value().to_string())
        .ok_or(CoreError::Unknown)?;

    let pair = state.auth_service.refresh(&presented).await?;
    let jar = jar.add(refresh_cookie(&pair.refresh_token, state.config.refresh_token_ttl_seconds));

    Ok((
        jar,
        Json(TokenResponse {
            access_token: pair.access_token,
            access_token_expires_at: pair.access_token_expires_at,
            user: None,
        }),
    ))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> ApiResult<(CookieJar, StatusCode)> {
    if let Some(cookie) = jar.get(REFRESH_COOKIE_NAME) {
        state.auth_service.revoke(cookie.value()).await?;
    }
    let jar = jar.remove(Cookie::from(REFRESH_COOKIE_NAME));
    Ok((jar, StatusCode::NO_CONTENT))
}

pub async fn me(State(state): State<AppState>, Extension(claims): Extension<AccessTokenClaims>) -> ApiResult<Json<UserProfile>> {
    let user = state
        .users
        .find_user_by_id(claims.sub)
        .await
        .map_err(map_db_err)?
        .ok_or(CoreError::Unknown)?;
    Ok(Json(UserProfile::from(&user)))
}

fn refresh_cookie(token: &str, ttl_seconds: i64) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE_NAME, token.to_string()))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::seconds(ttl_seconds))
        .build()
}

fn map_db_err(err: DbError) -> CoreError {
    match err {
        DbError::NotFound => CoreError::Unknown,
        other => CoreError::Internal(other.to_string()),
    }
}
