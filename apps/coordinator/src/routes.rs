// [apps/coordinator/src/routes.rs]
/*!
 * =================================================================
 * APARATO: ROUTING MATRIX
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: COMPOSICIÓN DEL ÁRBOL DE RUTAS Y PILA DE MIDDLEWARE
 *
 * Cuatro estratos de autenticación, cada uno su propio sub-router:
 * público (sin credencial), refresh-cookie (login/logout/rotación),
 * bearer de acceso (`auth_guard`), bearer de agente (`agent_guard`), y
 * admin (`auth_guard` + `admin_guard` apilados, admin_guard como capa
 * más externa). `axum::middleware::from_fn_with_state` envuelve el
 * sub-router ya ensamblado, así que el orden de `.layer()` importa:
 * la última capa añadida es la primera en ejecutarse.
 * =================================================================
 */

use crate::handlers::{admin, agent, auth, ws};
use crate::middleware::{admin_guard, agent_guard, auth_guard};
use crate::state::AppState;
use axum::http::{header, Method};
use axum::routing::{get, post, put};
use axum::{middleware, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, "X-Agent-ID".parse().unwrap()]);

    let public_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/agent/identify", post(agent::identify))
        .route("/agent/verify-mfa", post(agent::verify_mfa));

    let refresh_routes = Router::new()
        .route("/auth/refresh-token", post(auth::refresh_token))
        .route("/auth/logout", post(auth::logout));

    let authenticated_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    let agent_routes = Router::new()
        .route("/agent/hardware-info", post(agent::hardware_info))
        .route("/agent/report-error", post(agent::report_error))
        .route("/agent/check-update", get(agent::check_update))
        .route("/agent/agent-packages/:filename", get(agent::download_package))
        .layer(middleware::from_fn_with_state(state.clone(), agent_guard));

    let admin_routes = Router::new()
        .route("/admin/agents/versions", post(admin::upload_version).get(admin::list_versions))
        .route("/admin/agents/versions/:id", put(admin::set_stability))
        .route("/admin/stats", get(admin::stats))
        .layer(middleware::from_fn(admin_guard))
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    let api = Router::new()
        .merge(public_routes)
        .merge(refresh_routes)
        .merge(authenticated_routes)
        .merge(agent_routes)
        .merge(admin_routes);

    Router::new()
        .nest(&state.config.api_root.clone(), api)
        .route("/ws", get(ws::upgrade))
        .route("/health", get(|| async { "ok" }))
        .layer(cors)
        .with_state(state)
}
