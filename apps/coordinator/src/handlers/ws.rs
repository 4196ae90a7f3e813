// [apps/coordinator/src/handlers/ws.rs]
/*!
 * =================================================================
 * APARATO: REALTIME TRANSPORT HANDLER
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: ADMISIÓN DE WEBSOCKET Y BUCLE DE TRES TAREAS
 *
 * Arquitectura de tres tareas: un worker interno procesa frames ya
 * decodificados desde un canal `mpsc` propio (desacopla la lectura de
 * red de la ejecución de lógica de dominio), una tarea de bajada combina
 * latido de vida y salida del Session Hub hacia el socket, y una tarea
 * de subida traduce frames entrantes al canal del worker. La primera de
 * las tres en terminar dispara el apagado de las otras dos.
 *
 * La admisión ocurre *después* de la actualización de protocolo: un
 * fallo de autenticación se comunica como un frame `connect_error`
 * seguido de cierre, nunca como un rechazo HTTP.
 * =================================================================
 */

use crate::state::session_hub::ClientKind;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use cms_db::DbError;
use cms_domain::command::{CommandResult, CommandType};
use cms_domain::{CoreError, Role};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const KEEPALIVE_INTERVAL_SECONDS: u64 = 25;
const INBOUND_BUFFER_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy)]
enum Identity {
    Agent { computer_id: i64 },
    Frontend { user_id: i64, role: Role },
}

pub async fn upgrade(State(state): State<AppState>, headers: HeaderMap, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, headers))
}

async fn handle_connection(socket: WebSocket, state: AppState, headers: HeaderMap) {
    let identity = match authenticate(&state, &headers).await {
        Ok(identity) => identity,
        Err(reason) => {
            deny(socket, reason).await;
            return;
        }
    };

    let client_kind = match identity {
        Identity::Agent { computer_id } => ClientKind::Agent { computer_id },
        Identity::Frontend { user_id, role } => ClientKind::Frontend { user_id, role },
    };

    let (socket_sender, mut socket_receiver) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();

    let hub = state.session_hub.clone();
    let session_id = hub.register_session(client_kind, outbound_tx.clone());

    if let Identity::Agent { computer_id } = identity {
        hub.on_agent_connected(computer_id);
    }
    let _ = outbound_tx.send(json!({ "event": "connect" }).to_string());

    info!("websocket session {} admitted as {:?}", session_id, identity);

    let (inbound_tx, mut inbound_rx) = mpsc::channel::<String>(INBOUND_BUFFER_CAPACITY);

    let worker_state = state.clone();
    let mut worker_task = tokio::spawn(async move {
        while let Some(raw_frame) = inbound_rx.recv().await {
            if let Err(err) = route_inbound_frame(&worker_state, session_id, identity, &raw_frame).await {
                warn!("session {} rejected inbound frame: {}", session_id, err);
            }
        }
    });

    let mut downstream_task = tokio::spawn(downstream_loop(socket_sender, outbound_rx));

    let mut upstream_task = tokio::spawn(async move {
        while let Some(message) = socket_receiver.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if inbound_tx.send(text).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Err(err) => {
                    warn!("websocket read error: {}", err);
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut downstream_task => {
            upstream_task.abort();
            worker_task.abort();
        }
        _ = &mut upstream_task => {
            downstream_task.abort();
            worker_task.abort();
        }
        _ = &mut worker_task => {
            downstream_task.abort();
            upstream_task.abort();
        }
    }

    crate::state::session_hub::SessionHub::on_session_closed(&hub, session_id);
    debug!("websocket session {} torn down", session_id);
}

async fn downstream_loop(
    mut socket_sender: futures::stream::SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) {
    let mut keepalive = interval(Duration::from_secs(KEEPALIVE_INTERVAL_SECONDS));
    loop {
        tokio::select! {
            _ = keepalive.tick() => {
                if socket_sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            frame = outbound_rx.recv() => {
                match frame {
                    Some(text) => {
                        if socket_sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
}

async fn deny(socket: WebSocket, reason: &'static str) {
    let (mut sender, _receiver) = socket.split();
    let frame = json!({ "event": "connect_error", "message": reason }).to_string();
    let _ = sender.send(Message::Text(frame)).await;
    let _ = sender.send(Message::Close(None)).await;
}

#[instrument(skip(state, headers))]
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Identity, &'static str> {
    let client_type = header_str(headers, "X-Client-Type").unwrap_or_default();

    match client_type {
        "agent" => {
            let agent_id = header_str(headers, "X-Agent-ID");
            let token = bearer_token(headers);
            let (Some(agent_id), Some(token)) = (agent_id, token) else {
                return Err("Authentication failed: Missing required headers");
            };

            match state.agent_registry.verify_agent_token(agent_id, token).await {
                Ok(Some(computer_id)) => Ok(Identity::Agent { computer_id }),
                Ok(None) => Err("Authentication failed: Invalid agent credentials"),
                Err(_) => Err("Internal error: Unable to establish WebSocket connection"),
            }
        }
        "frontend" => {
            let Some(token) = bearer_token(headers) else {
                return Err("Authentication failed: Missing required headers");
            };

            let claims = match state.auth_service.decode_access_token(token) {
                Ok(claims) => claims,
                Err(CoreError::Expired) => return Err("Authentication failed: Token expired"),
                Err(_) => return Err("Authentication failed: Invalid token"),
            };

            match state.users.find_user_by_id(claims.sub).await {
                Ok(Some(user)) if user.active => Ok(Identity::Frontend { user_id: user.user_id, role: user.role }),
                Ok(Some(_)) => Err("Authentication failed: User account is deactivated"),
                Ok(None) => Err("Authentication failed: Invalid token"),
                Err(_) => Err("Internal error: Unable to establish WebSocket connection"),
            }
        }
        _ => Err("Authentication failed: Missing required headers"),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn bearer_token<'a>(headers: &'a HeaderMap) -> Option<&'a str> {
    header_str(headers, "Authorization").and_then(|value| value.strip_prefix("Bearer "))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event")]
enum InboundFrame {
    #[serde(rename = "agent:status_update")]
    AgentStatusUpdate { cpu_pct: f64, ram_pct: f64, disk_pct: f64 },
    #[serde(rename = "agent:command_result")]
    AgentCommandResult {
        command_id: Uuid,
        #[serde(flatten)]
        result: CommandResult,
    },
    #[serde(rename = "frontend:subscribe")]
    FrontendSubscribe { computer_id: i64 },
    #[serde(rename = "frontend:unsubscribe")]
    FrontendUnsubscribe { computer_id: i64 },
    #[serde(rename = "frontend:send_command")]
    FrontendSendCommand {
        computer_id: i64,
        command: String,
        #[serde(default)]
        command_type: Option<String>,
        #[serde(default)]
        cb_id: Option<String>,
    },
}

async fn route_inbound_frame(state: &AppState, session_id: Uuid, identity: Identity, raw_frame: &str) -> Result<(), CoreError> {
    let frame: InboundFrame =
        serde_json::from_str(raw_frame).map_err(|e| CoreError::ValidationFailed(format!("malformed frame: {e}")))?;

    match (identity, frame) {
        (Identity::Agent { computer_id }, InboundFrame::AgentStatusUpdate { cpu_pct, ram_pct, disk_pct }) => {
            state.session_hub.apply_status_update(computer_id, cpu_pct, ram_pct, disk_pct);
            Ok(())
        }
        (Identity::Agent { .. }, InboundFrame::AgentCommandResult { command_id, result }) => {
            state.command_coordinator.complete(&state.session_hub, command_id, result);
            Ok(())
        }
        (Identity::Frontend { user_id, role }, InboundFrame::FrontendSubscribe { computer_id }) => {
            if authorize_room_access(state, role, user_id, computer_id).await? {
                state.session_hub.subscribe(session_id, computer_id);
            } else {
                state.session_hub.emit_to_session(
                    session_id,
                    "subscribe_response",
                    json!({ "status": "error", "message": "Access denied", "computer_id": computer_id }),
                );
            }
            Ok(())
        }
        (Identity::Frontend { .. }, InboundFrame::FrontendUnsubscribe { computer_id }) => {
            state.session_hub.unsubscribe(session_id, computer_id);
            Ok(())
        }
        (Identity::Frontend { user_id, role }, InboundFrame::FrontendSendCommand { computer_id, command, command_type, cb_id }) => {
            handle_send_command(state, session_id, user_id, role, computer_id, command, command_type, cb_id).await
        }
        (Identity::Agent { .. }, _) | (Identity::Frontend { .. }, _) => {
            Err(CoreError::ValidationFailed("event not permitted for this client kind".to_string()))
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_send_command(
    state: &AppState,
    session_id: Uuid,
    user_id: i64,
    role: Role,
    computer_id: i64,
    command: String,
    command_type: Option<String>,
    cb_id: Option<String>,
) -> Result<(), CoreError> {
    let command_type = CommandType::from_input(command_type);
    if !command_type.is_valid() {
        return Err(CoreError::ValidationFailed(format!("command_type must be 1-{} bytes", CommandType::MAX_LEN)));
    }
    let command_id = Uuid::new_v4();

    let ack = if !authorize_room_access(state, role, user_id, computer_id).await? {
        json!({
            "status": "error",
            "message": "Access denied",
            "computer_id": computer_id,
            "command_id": command_id,
            "command_type": command_type.as_str(),
            "cb_id": cb_id,
        })
    } else {
        match state
            .command_coordinator
            .dispatch(&state.session_hub, command_id, computer_id, user_id, &command, command_type.clone())
        {
            Ok(()) => json!({
                "status": "success",
                "computer_id": computer_id,
                "command_id": command_id,
                "command_type": command_type.as_str(),
                "cb_id": cb_id,
            }),
            Err(CoreError::AgentOffline) => json!({
                "status": "error",
                "message": "Agent is not connected",
                "computer_id": computer_id,
                "command_id": command_id,
                "command_type": command_type.as_str(),
                "cb_id": cb_id,
            }),
            Err(other) => json!({
                "status": "error",
                "message": other.public_message(),
                "computer_id": computer_id,
                "command_id": command_id,
                "command_type": command_type.as_str(),
                "cb_id": cb_id,
            }),
        }
    };

    state.session_hub.emit_to_session(session_id, "frontend:send_command_ack", ack);
    Ok(())
}

async fn authorize_room_access(state: &AppState, role: Role, user_id: i64, computer_id: i64) -> Result<bool, CoreError> {
    if role.is_admin() {
        return Ok(true);
    }

    let Some(computer) = state.computers.find_computer_by_id(computer_id).await.map_err(map_db_err)? else {
        return Ok(false);
    };
    let Some(room_id) = computer.room_id else {
        return Ok(false);
    };
    state.rooms.user_has_room_assignment(user_id, room_id).await.map_err(map_db_err)
}

fn map_db_err(err: DbError) -> CoreError {
    match err {
        DbError::NotFound => CoreError::Unknown,
        other => CoreError::Internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use crate::state::session_hub::ClientKind;
    use cms_crypto::Argon2Params;
    use cms_db::TursoClient;
    use cms_domain::room::RoomLayout;

    fn test_config() -> CoordinatorConfig {
        CoordinatorConfig {
            api_root: "/api/v1".to_string(),
            access_token_secret: "test-secret".to_string(),
            access_token_ttl_seconds: 900,
            refresh_token_ttl_seconds: 2_592_000,
            argon2_params: Argon2Params::default(),
            package_data_dir: "./data/agent-packages".to_string(),
            max_package_upload_bytes: 50 * 1024 * 1024,
            offline_debounce_ms: 50,
            pending_command_timeout_secs: 300,
            database_url: ":memory:".to_string(),
            turso_auth_token: None,
            port: 0,
        }
    }

    async fn build_state() -> AppState {
        let db = TursoClient::connect(":memory:", None).await.unwrap();
        AppState::new(db, test_config())
    }

    #[tokio::test]
    async fn send_command_happy_path_acks_success_and_executes() {
        let state = build_state().await;

        let room_id = state.rooms.create_room("lab-1", RoomLayout { columns: 4, rows: 4 }, None).await.unwrap();
        let computer_id = state.computers.create_computer("agent-1", "hash", Some(room_id), 0, 0).await.unwrap();

        let (agent_tx, mut agent_rx) = mpsc::unbounded_channel();
        state.session_hub.register_session(ClientKind::Agent { computer_id }, agent_tx);
        state.session_hub.on_agent_connected(computer_id);

        let (user_tx, mut user_rx) = mpsc::unbounded_channel();
        let session_id = state.session_hub.register_session(ClientKind::Frontend { user_id: 1, role: Role::Admin }, user_tx);

        handle_send_command(&state, session_id, 1, Role::Admin, computer_id, "whoami".to_string(), None, Some("cb-1".to_string()))
            .await
            .unwrap();

        let ack = user_rx.recv().await.unwrap();
        assert!(ack.contains("frontend:send_command_ack"));
        assert!(ack.contains("\"status\":\"success\""));
        assert!(ack.contains("cb-1"));

        let execute = agent_rx.recv().await.unwrap();
        assert!(execute.contains("command:execute"));
        assert!(execute.contains("whoami"));
    }

    #[tokio::test]
    async fn send_command_to_offline_agent_acks_error_with_command_id() {
        let state = build_state().await;
        let (user_tx, mut user_rx) = mpsc::unbounded_channel();
        let session_id = state.session_hub.register_session(ClientKind::Frontend { user_id: 1, role: Role::Admin }, user_tx);

        handle_send_command(&state, session_id, 1, Role::Admin, 999, "whoami".to_string(), None, None).await.unwrap();

        let ack = user_rx.recv().await.unwrap();
        assert!(ack.contains("\"status\":\"error\""));
        assert!(ack.contains("Agent is not connected"));
        assert!(ack.contains("command_id"));
        assert_eq!(state.command_coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn send_command_rejects_oversized_command_type() {
        let state = build_state().await;
        let (user_tx, _user_rx) = mpsc::unbounded_channel();
        let session_id = state.session_hub.register_session(ClientKind::Frontend { user_id: 1, role: Role::Admin }, user_tx);
        let oversized = "x".repeat(CommandType::MAX_LEN + 1);

        let err = handle_send_command(&state, session_id, 1, Role::Admin, 999, "whoami".to_string(), Some(oversized), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));
        assert_eq!(state.command_coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn send_command_denies_non_admin_without_room_assignment() {
        let state = build_state().await;
        let room_id = state.rooms.create_room("lab-2", RoomLayout { columns: 4, rows: 4 }, None).await.unwrap();
        let computer_id = state.computers.create_computer("agent-2", "hash", Some(room_id), 0, 0).await.unwrap();

        let (agent_tx, _agent_rx) = mpsc::unbounded_channel();
        state.session_hub.register_session(ClientKind::Agent { computer_id }, agent_tx);
        state.session_hub.on_agent_connected(computer_id);

        let (user_tx, mut user_rx) = mpsc::unbounded_channel();
        let session_id = state.session_hub.register_session(ClientKind::Frontend { user_id: 5, role: Role::User }, user_tx);

        handle_send_command(&state, session_id, 5, Role::User, computer_id, "whoami".to_string(), None, None).await.unwrap();

        let ack = user_rx.recv().await.unwrap();
        assert!(ack.contains("\"status\":\"error\""));
        assert!(ack.contains("Access denied"));
        assert_eq!(state.command_coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn send_command_allows_non_admin_with_room_assignment() {
        let state = build_state().await;
        let room_id = state.rooms.create_room("lab-3", RoomLayout { columns: 4, rows: 4 }, None).await.unwrap();
        let computer_id = state.computers.create_computer("agent-3", "hash", Some(room_id), 0, 0).await.unwrap();
        state.rooms.assign_user_to_room(5, room_id).await.unwrap();

        let (agent_tx, _agent_rx) = mpsc::unbounded_channel();
        state.session_hub.register_session(ClientKind::Agent { computer_id }, agent_tx);
        state.session_hub.on_agent_connected(computer_id);

        let (user_tx, mut user_rx) = mpsc::unbounded_channel();
        let session_id = state.session_hub.register_session(ClientKind::Frontend { user_id: 5, role: Role::User }, user_tx);

        handle_send_command(&state, session_id, 5, Role::User, computer_id, "whoami".to_string(), None, None).await.unwrap();

        let ack = user_rx.recv().await.unwrap();
        assert!(ack.contains("\"status\":\"success\""));
    }

    #[tokio::test]
    async fn subscribe_denies_non_admin_without_room_assignment_with_ack() {
        let state = build_state().await;
        let room_id = state.rooms.create_room("lab-4", RoomLayout { columns: 4, rows: 4 }, None).await.unwrap();
        let computer_id = state.computers.create_computer("agent-4", "hash", Some(room_id), 0, 0).await.unwrap();

        let (user_tx, mut user_rx) = mpsc::unbounded_channel();
        let session_id = state.session_hub.register_session(ClientKind::Frontend { user_id: 7, role: Role::User }, user_tx);

        let frame = serde_json::json!({ "event": "frontend:subscribe", "computer_id": computer_id }).to_string();
        route_inbound_frame(&state, session_id, Identity::Frontend { user_id: 7, role: Role::User }, &frame)
            .await
            .unwrap();

        let ack = user_rx.recv().await.unwrap();
        assert!(ack.contains("subscribe_response"));
        assert!(ack.contains("\"status\":\"error\""));
        assert!(ack.contains("Access denied"));
    }

    #[tokio::test]
    async fn route_inbound_frame_rejects_malformed_json() {
        let state = build_state().await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let session_id = state.session_hub.register_session(ClientKind::Frontend { user_id: 1, role: Role::Admin }, tx);

        let err = route_inbound_frame(&state, session_id, Identity::Frontend { user_id: 1, role: Role::Admin }, "not json")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn route_inbound_frame_rejects_event_not_permitted_for_client_kind() {
        let state = build_state().await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let session_id = state.session_hub.register_session(ClientKind::Agent { computer_id: 1 }, tx);

        let frame = serde_json::json!({ "event": "frontend:subscribe", "computer_id": 1 }).to_string();
        let err = route_inbound_frame(&state, session_id, Identity::Agent { computer_id: 1 }, &frame).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn authenticate_rejects_missing_client_type_header() {
        let state = build_state().await;
        let headers = HeaderMap::new();
        let err = authenticate(&state, &headers).await.unwrap_err();
        assert_eq!(err, "Authentication failed: Missing required headers");
    }

    #[tokio::test]
    async fn authenticate_accepts_valid_frontend_bearer_token() {
        let state = build_state().await;
        let credentials = cms_crypto::CredentialStore::new(Argon2Params::default());
        let hash = credentials.hash_token("correct-password").unwrap();
        state.users.create_user("alice", &hash, Role::Admin).await.unwrap();
        let pair = state.auth_service.login("alice", "correct-password").await.unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("X-Client-Type", "frontend".parse().unwrap());
        headers.insert(axum::http::header::AUTHORIZATION, format!("Bearer {}", pair.access_token).parse().unwrap());

        let identity = authenticate(&state, &headers).await.unwrap();
        assert!(matches!(identity, Identity::Frontend { role: Role::Admin, .. }));
    }

    #[tokio::test]
    async fn authenticate_rejects_unknown_agent_credentials() {
        let state = build_state().await;
        let mut headers = HeaderMap::new();
        headers.insert("X-Client-Type", "agent".parse().unwrap());
        headers.insert("X-Agent-ID", "ghost-agent".parse().unwrap());
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer whatever".parse().unwrap());

        let err = authenticate(&state, &headers).await.unwrap_err();
        assert_eq!(err, "Authentication failed: Invalid agent credentials");
    }
}
