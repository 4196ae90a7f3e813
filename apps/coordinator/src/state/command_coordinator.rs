// [apps/coordinator/src/state/command_coordinator.rs]
/*!
 * =================================================================
 * APARATO: COMMAND COORDINATOR (C6)
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L4)
 * RESPONSABILIDAD: DESPACHO DE COMANDOS CON CORRELACIÓN Y EXPIRACIÓN
 *
 * Entrega a lo sumo una vez: cada comando despachado recibe un
 * identificador de correlación y un temporizador de expiración de 5
 * minutos; si el agente no responde dentro de la ventana, la entrada se
 * purga sin notificación (la expiración es un hecho silencioso, no un
 * resultado de comando). La autorización (asignación de sala para
 * usuarios no-admin) se resuelve antes de llamar a `dispatch`; este
 * aparato sólo conoce el mapa de pendientes y la ventana de conexión.
 * =================================================================
 */

use crate::state::session_hub::{agent_room, user_room, SessionHub};
use chrono::{DateTime, Utc};
use cms_domain::command::{CommandResult, CommandType};
use cms_domain::CoreError;
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Longitud máxima del texto de comando, en bytes.
pub const MAX_COMMAND_TEXT_BYTES: usize = 2000;

struct PendingCommand {
    computer_id: i64,
    requested_by_user_id: i64,
    command_type: CommandType,
    created_at: DateTime<Utc>,
    expiry_task: JoinHandle<()>,
}

pub struct CommandCoordinator {
    pending: DashMap<Uuid, PendingCommand>,
    timeout: Duration,
}

impl CommandCoordinator {
    pub fn new(timeout: Duration) -> Self {
        CommandCoordinator {
            pending: DashMap::new(),
            timeout,
        }
    }

    /// Despacha `command_text` al agente `computer_id` en nombre de
    /// `requested_by_user_id`. El llamador ya generó `command_id` (lo
    /// necesita para su ack incluso si el despacho falla por agente
    /// desconectado); la autorización de sala ya fue resuelta por el
    /// llamador. Aquí sólo se valida el tamaño del texto y la
    /// conectividad del agente antes de crear la entrada pendiente.
    #[instrument(skip(self, hub, command_text))]
    pub fn dispatch(
        self: &Arc<Self>,
        hub: &Arc<SessionHub>,
        command_id: Uuid,
        computer_id: i64,
        requested_by_user_id: i64,
        command_text: &str,
        command_type: CommandType,
    ) -> Result<(), CoreError> {
        if command_text.is_empty() || command_text.len() > MAX_COMMAND_TEXT_BYTES {
            return Err(CoreError::ValidationFailed("command text must be 1-2000 bytes".to_string()));
        }

        if !hub.is_connected(computer_id) {
            return Err(CoreError::AgentOffline);
        }

        let coordinator = Arc::clone(self);
        let hub_for_timeout = Arc::clone(hub);
        let timeout = self.timeout;
        let expiry_task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            coordinator.expire(command_id);
        });

        self.pending.insert(
            command_id,
            PendingCommand {
                computer_id,
                requested_by_user_id,
                command_type: command_type.clone(),
                created_at: Utc::now(),
                expiry_task,
            },
        );

        hub.emit_to_room(
            &agent_room(computer_id),
            "command:execute",
            json!({
                "command_id": command_id,
                "command": command_text,
                "command_type": command_type.as_str(),
            }),
        );

        info!("dispatched command {} ({}) to computer {}", command_id, command_type.as_str(), computer_id);
        Ok(())
    }

    /// Correlaciona `agent:command_result` con su comando pendiente y
    /// notifica al solicitante original vía `command:completed`. Una
    /// respuesta para un comando ya expirado, ya entregado, o
    /// desconocido se descarta silenciosamente (entrega a lo sumo una
    /// vez).
    #[instrument(skip(self, hub, result))]
    pub fn complete(&self, hub: &Arc<SessionHub>, command_id: Uuid, result: CommandResult) {
        let Some((_, pending)) = self.pending.remove(&command_id) else {
            warn!("command {} completed after expiry or unknown to coordinator", command_id);
            return;
        };
        pending.expiry_task.abort();

        hub.emit_to_room(
            &user_room(pending.requested_by_user_id),
            "command:completed",
            json!({
                "command_id": command_id,
                "computer_id": pending.computer_id,
                "type": result.normalized_type(),
                "success": result.success,
                "result": result,
                "timestamp": Utc::now(),
            }),
        );
    }

    /// Expiración silenciosa: la entrada se purga sin emitir ningún
    /// evento. El operador puede observar el vencimiento vía logs.
    fn expire(&self, command_id: Uuid) {
        if let Some((_, pending)) = self.pending.remove(&command_id) {
            warn!(
                "command {} ({}) timed out awaiting computer {}",
                command_id,
                pending.command_type.as_str(),
                pending.computer_id
            );
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session_hub::ClientKind;
    use cms_domain::Role;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    #[tokio::test]
    async fn dispatch_rejects_empty_command_text() {
        let hub = Arc::new(SessionHub::new(Duration::from_millis(50)));
        let coordinator = Arc::new(CommandCoordinator::new(Duration::from_secs(5)));

        let err = coordinator.dispatch(&hub, Uuid::new_v4(), 1, 1, "", CommandType::default()).unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn dispatch_rejects_oversized_command_text() {
        let hub = Arc::new(SessionHub::new(Duration::from_millis(50)));
        let coordinator = Arc::new(CommandCoordinator::new(Duration::from_secs(5)));
        let oversized = "a".repeat(MAX_COMMAND_TEXT_BYTES + 1);

        let err = coordinator.dispatch(&hub, Uuid::new_v4(), 1, 1, &oversized, CommandType::default()).unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn dispatch_to_offline_agent_is_rejected_but_keeps_no_pending_entry() {
        let hub = Arc::new(SessionHub::new(Duration::from_millis(50)));
        let coordinator = Arc::new(CommandCoordinator::new(Duration::from_secs(5)));

        let err = coordinator.dispatch(&hub, Uuid::new_v4(), 1, 1, "whoami", CommandType::default()).unwrap_err();
        assert!(matches!(err, CoreError::AgentOffline));
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn dispatch_then_complete_notifies_requester_once() {
        let hub = Arc::new(SessionHub::new(Duration::from_millis(50)));
        let coordinator = Arc::new(CommandCoordinator::new(Duration::from_secs(5)));

        let (agent_tx, _agent_rx) = mpsc::unbounded_channel();
        hub.register_session(ClientKind::Agent { computer_id: 1 }, agent_tx);
        hub.on_agent_connected(1);

        let (user_tx, mut user_rx) = mpsc::unbounded_channel();
        hub.register_session(ClientKind::Frontend { user_id: 9, role: Role::Admin }, user_tx);

        let command_id = Uuid::new_v4();
        coordinator.dispatch(&hub, command_id, 1, 9, "whoami", CommandType::default()).unwrap();
        assert_eq!(coordinator.pending_count(), 1);

        let result = CommandResult {
            success: true,
            result_type: Some("console".to_string()),
            stdout: "root".to_string(),
            stderr: String::new(),
            exit_code: 0,
        };
        coordinator.complete(&hub, command_id, result);
        assert_eq!(coordinator.pending_count(), 0);

        let frame = user_rx.recv().await.unwrap();
        assert!(frame.contains("command:completed"));
        assert!(frame.contains("root"));
    }

    #[tokio::test]
    async fn expired_command_is_purged_silently() {
        let hub = Arc::new(SessionHub::new(Duration::from_millis(50)));
        let coordinator = Arc::new(CommandCoordinator::new(Duration::from_millis(30)));

        let (agent_tx, _agent_rx) = mpsc::unbounded_channel();
        hub.register_session(ClientKind::Agent { computer_id: 2 }, agent_tx);
        hub.on_agent_connected(2);

        let (user_tx, mut user_rx) = mpsc::unbounded_channel();
        hub.register_session(ClientKind::Frontend { user_id: 3, role: Role::User }, user_tx);

        coordinator.dispatch(&hub, Uuid::new_v4(), 2, 3, "whoami", CommandType::default()).unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(coordinator.pending_count(), 0);
        assert!(user_rx.try_recv().is_err());
    }
}
