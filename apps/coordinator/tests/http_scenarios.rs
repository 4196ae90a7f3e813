// [apps/coordinator/tests/http_scenarios.rs]
/*!
 * =================================================================
 * APARATO: HTTP HANDLER SCENARIO SUITE
 * CLASIFICACIÓN: INTEGRATION EVIDENCE (ESTRATO L4-MIRROR)
 * RESPONSABILIDAD: CERTIFICACIÓN DE COREOGRAFÍAS MULTI-APARATO
 *
 * Ejercita los handlers HTTP directamente contra un `AppState` real
 * (Turso en memoria), sin pasar por el servidor Axum: cada prueba cubre
 * una coreografía observable completa (handler -> servicio ->
 * repositorio -> Session Hub), no una sola función aislada.
 * =================================================================
 */

use axum::extract::{Json, Path, State};
use cms_coordinator::config::CoordinatorConfig;
use cms_coordinator::handlers::admin::{set_stability, SetStabilityRequest};
use cms_coordinator::handlers::agent::{identify, verify_mfa, IdentifyRequest, VerifyMfaRequest};
use cms_coordinator::state::session_hub::ClientKind;
use cms_coordinator::state::AppState;
use cms_crypto::Argon2Params;
use cms_db::TursoClient;
use cms_domain::computer::PositionInfo;
use cms_domain::room::RoomLayout;
use cms_domain::Role;

fn test_config(package_data_dir: &std::path::Path) -> CoordinatorConfig {
    CoordinatorConfig {
        api_root: "/api/v1".to_string(),
        access_token_secret: "test-secret".to_string(),
        access_token_ttl_seconds: 900,
        refresh_token_ttl_seconds: 2_592_000,
        argon2_params: Argon2Params::default(),
        package_data_dir: package_data_dir.to_string_lossy().into_owned(),
        max_package_upload_bytes: 50 * 1024 * 1024,
        offline_debounce_ms: 50,
        pending_command_timeout_secs: 300,
        database_url: ":memory:".to_string(),
        turso_auth_token: None,
        port: 0,
    }
}

/// The returned `TempDir` must be kept alive for the package directory
/// to survive; it is removed on drop.
async fn build_state() -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = TursoClient::connect(":memory:", None).await.unwrap();
    (AppState::new(db, test_config(dir.path())), dir)
}

/// New agent bootstrap (identify -> mfa_required -> admin:new_agent_mfa
/// -> verify-mfa -> success + admin:agent_registered).
#[tokio::test]
async fn new_agent_bootstrap_round_trips_through_mfa() {
    let (state, _dir) = build_state().await;
    state.rooms.create_room("lab-1", RoomLayout { columns: 4, rows: 4 }, None).await.unwrap();

    let (admin_tx, mut admin_rx) = tokio::sync::mpsc::unbounded_channel();
    state.session_hub.register_session(ClientKind::Frontend { user_id: 1, role: Role::Admin }, admin_tx);

    let identify_body = IdentifyRequest {
        agent_id: "agent-new".to_string(),
        position_info: PositionInfo { room_name: "lab-1".to_string(), pos_x: 1, pos_y: 1 },
    };
    let response = identify(State(state.clone()), Json(identify_body)).await.unwrap();
    assert_eq!(response.0["status"], "mfa_required");

    let mfa_broadcast = admin_rx.recv().await.unwrap();
    assert!(mfa_broadcast.contains("admin:new_agent_mfa"));
    let parsed: serde_json::Value = serde_json::from_str(&mfa_broadcast).unwrap();
    let mfa_code = parsed["mfa_code"].as_str().unwrap().to_string();

    let verify_body = VerifyMfaRequest { agent_id: "agent-new".to_string(), mfa_code };
    let response = verify_mfa(State(state.clone()), Json(verify_body)).await.unwrap();
    assert_eq!(response.0["status"], "success");
    assert!(response.0["agent_token"].as_str().unwrap().len() > 0);

    let registered_broadcast = admin_rx.recv().await.unwrap();
    assert!(registered_broadcast.contains("admin:agent_registered"));

    let computer = state.computers.find_computer_by_agent_id("agent-new").await.unwrap().unwrap();
    assert!(computer.agent_token_hash.is_some());
}

#[tokio::test]
async fn verify_mfa_with_wrong_code_is_rejected() {
    let (state, _dir) = build_state().await;
    state.rooms.create_room("lab-2", RoomLayout { columns: 4, rows: 4 }, None).await.unwrap();

    let identify_body = IdentifyRequest {
        agent_id: "agent-wrong-code".to_string(),
        position_info: PositionInfo { room_name: "lab-2".to_string(), pos_x: 0, pos_y: 0 },
    };
    identify(State(state.clone()), Json(identify_body)).await.unwrap();

    let verify_body = VerifyMfaRequest { agent_id: "agent-wrong-code".to_string(), mfa_code: "WRONG1".to_string() };
    let err = verify_mfa(State(state.clone()), Json(verify_body)).await.unwrap_err();
    assert_eq!(err.0.public_message(), cms_domain::CoreError::InvalidCredential.public_message());
}

/// Stable-version promotion: single-stable invariant, fleet-wide
/// `agent:new_version_available` broadcast to every connected agent.
#[tokio::test]
async fn promoting_a_version_enforces_single_stable_and_notifies_fleet() {
    let (state, _dir) = build_state().await;

    let (agent_a_tx, mut agent_a_rx) = tokio::sync::mpsc::unbounded_channel();
    state.session_hub.register_session(ClientKind::Agent { computer_id: 1 }, agent_a_tx);
    state.session_hub.on_agent_connected(1);

    let (agent_b_tx, mut agent_b_rx) = tokio::sync::mpsc::unbounded_channel();
    state.session_hub.register_session(ClientKind::Agent { computer_id: 2 }, agent_b_tx);
    state.session_hub.on_agent_connected(2);

    let first = state.version_catalog.ingest("payload.zip", b"v1-bytes", "1.0.0", None).await.unwrap();
    let second = state.version_catalog.ingest("payload.zip", b"v2-bytes", "2.0.0", None).await.unwrap();

    set_stability(State(state.clone()), Path(first.version_id), Json(SetStabilityRequest { is_stable: true })).await.unwrap();

    let notice_a = agent_a_rx.recv().await.unwrap();
    let notice_b = agent_b_rx.recv().await.unwrap();
    assert!(notice_a.contains("agent:new_version_available"));
    assert!(notice_a.contains("1.0.0"));
    assert!(notice_b.contains("agent:new_version_available"));

    set_stability(State(state.clone()), Path(second.version_id), Json(SetStabilityRequest { is_stable: true })).await.unwrap();

    let versions = state.version_catalog.list_versions().await.unwrap();
    let stable: Vec<_> = versions.iter().filter(|v| v.is_stable).collect();
    assert_eq!(stable.len(), 1);
    assert_eq!(stable[0].version, "2.0.0");
}

#[tokio::test]
async fn ingest_then_list_versions_round_trips() {
    let (state, _dir) = build_state().await;

    let version = state.version_catalog.ingest("payload.zip", b"package-bytes", "0.9.0", Some("initial cut")).await.unwrap();
    assert!(!version.is_stable);

    let versions = state.version_catalog.list_versions().await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version, "0.9.0");
}
