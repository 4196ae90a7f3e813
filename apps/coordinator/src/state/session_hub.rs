// [apps/coordinator/src/state/session_hub.rs]
/*!
 * =================================================================
 * APARATO: SESSION HUB (C5)
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L4)
 * RESPONSABILIDAD: REGISTRO DE SESIONES EN TIEMPO REAL Y PRESENCIA
 *
 * El mux central del sistema: mapea identidades de Agent/User/Admin a
 * sesiones WebSocket vivas, agrupadas en salas lógicas (`agent(cid)`,
 * `user(uid)`, `admin`, `subscribers(cid)`), y mantiene el estado
 * volátil de presencia con detección de desconexión con rebote
 * ("debounce"). Generaliza el bus de difusión único del aparato
 * original a un enrutamiento por sala: cada sesión posee su propio
 * canal de salida, y una sala es sólo el conjunto de sesiones que la
 * integran en un instante dado.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use cms_domain::Role;
use dashmap::{DashMap, DashSet};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Agent { computer_id: i64 },
    Frontend { user_id: i64, role: Role },
}

/// Canal de salida de una sesión: frames JSON ya serializados, listos
/// para envuelta en un `Message::Text` por el handler de transporte.
pub type OutboundSender = mpsc::UnboundedSender<String>;

struct LiveSession {
    client_kind: ClientKind,
    sender: OutboundSender,
    rooms: DashSet<String>,
}

#[derive(Debug, Clone, Copy, Serialize, serde::Deserialize)]
pub struct RealtimeStatus {
    pub status: PresenceStatus,
    pub cpu_pct: f64,
    pub ram_pct: f64,
    pub disk_pct: f64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

use serde::Serialize;

pub const ADMIN_ROOM: &str = "admin";

pub fn agent_room(computer_id: i64) -> String {
    format!("agent:{computer_id}")
}

pub fn user_room(user_id: i64) -> String {
    format!("user:{user_id}")
}

pub fn subscribers_room(computer_id: i64) -> String {
    format!("subscribers:{computer_id}")
}

/// El registro central de sesiones en vivo. Pensado para vivir detrás
/// de un único `Arc<SessionHub>` compartido por todos los handlers.
pub struct SessionHub {
    sessions: DashMap<Uuid, LiveSession>,
    rooms: DashMap<String, DashSet<Uuid>>,
    realtime_status: DashMap<i64, RealtimeStatus>,
    debounce_tasks: DashMap<i64, JoinHandle<()>>,
    offline_debounce: Duration,
    next_session_ordinal: AtomicI64,
}

impl SessionHub {
    pub fn new(offline_debounce: Duration) -> Self {
        SessionHub {
            sessions: DashMap::new(),
            rooms: DashMap::new(),
            realtime_status: DashMap::new(),
            debounce_tasks: DashMap::new(),
            offline_debounce,
            next_session_ordinal: AtomicI64::new(0),
        }
    }

    /// Registra una sesión recién autenticada y la une a sus salas base.
    pub fn register_session(&self, client_kind: ClientKind, sender: OutboundSender) -> Uuid {
        let session_id = Uuid::new_v4();
        self.next_session_ordinal.fetch_add(1, Ordering::Relaxed);

        self.sessions.insert(
            session_id,
            LiveSession {
                client_kind,
                sender,
                rooms: DashSet::new(),
            },
        );

        match client_kind {
            ClientKind::Agent { computer_id } => self.join(session_id, &agent_room(computer_id)),
            ClientKind::Frontend { user_id, role } => {
                self.join(session_id, &user_room(user_id));
                if role.is_admin() {
                    self.join(session_id, ADMIN_ROOM);
                }
            }
        }

        session_id
    }

    pub fn join(&self, session_id: Uuid, room: &str) {
        if let Some(session) = self.sessions.get(&session_id) {
            session.rooms.insert(room.to_string());
        }
        self.rooms.entry(room.to_string()).or_default().insert(session_id);
    }

    pub fn leave(&self, session_id: Uuid, room: &str) {
        if let Some(session) = self.sessions.get(&session_id) {
            session.rooms.remove(room);
        }
        if let Some(members) = self.rooms.get(room) {
            members.remove(&session_id);
        }
    }

    pub fn room_size(&self, room: &str) -> usize {
        self.rooms.get(room).map(|members| members.len()).unwrap_or(0)
    }

    /// Difunde `event` con `payload` fusionado a toda sesión miembro de
    /// `room`. El orden de envío dentro de una misma sesión se preserva
    /// porque cada sesión posee un único canal `mpsc` FIFO.
    #[instrument(skip(self, payload))]
    pub fn emit_to_room(&self, room: &str, event: &str, payload: Value) {
        let Some(members) = self.rooms.get(room) else {
            debug!("emit_to_room: room {} has no members, dropping {}", room, event);
            return;
        };

        let frame = envelope(event, payload);
        for session_ref in members.iter() {
            let session_id = *session_ref.key();
            if let Some(session) = self.sessions.get(&session_id) {
                if session.sender.send(frame.clone()).is_err() {
                    warn!("session {} channel closed while emitting {}", session_id, event);
                }
            }
        }
    }

    /// Envía un frame a una única sesión (usado para acks `subscribe_response`).
    pub fn emit_to_session(&self, session_id: Uuid, event: &str, payload: Value) {
        if let Some(session) = self.sessions.get(&session_id) {
            let _ = session.sender.send(envelope(event, payload));
        }
    }

    pub fn is_connected(&self, computer_id: i64) -> bool {
        self.room_size(&agent_room(computer_id)) > 0
    }

    /// Número de agentes distintos con al menos una sesión viva.
    pub fn connected_agent_count(&self) -> usize {
        let mut computer_ids = std::collections::HashSet::new();
        for session in self.sessions.iter() {
            if let ClientKind::Agent { computer_id } = session.client_kind {
                computer_ids.insert(computer_id);
            }
        }
        computer_ids.len()
    }

    /// Número de usuarios distintos con al menos una sesión de frontend
    /// viva (una pestaña abierta cuenta como en línea).
    pub fn online_user_count(&self) -> usize {
        let mut user_ids = std::collections::HashSet::new();
        for session in self.sessions.iter() {
            if let ClientKind::Frontend { user_id, .. } = session.client_kind {
                user_ids.insert(user_id);
            }
        }
        user_ids.len()
    }

    /// Difunde a toda sesión de agente conectada, sin importar su sala
    /// individual. Usado por `agent:new_version_available` cuando el
    /// catálogo promueve una versión a estable.
    #[instrument(skip(self, payload))]
    pub fn emit_to_all_agents(&self, event: &str, payload: Value) {
        let frame = envelope(event, payload);
        for session in self.sessions.iter() {
            if matches!(session.client_kind, ClientKind::Agent { .. }) {
                let _ = session.sender.send(frame.clone());
            }
        }
    }

    /// Difunde a la sala `admin`.
    pub fn emit_to_admins(&self, event: &str, payload: Value) {
        self.emit_to_room(ADMIN_ROOM, event, payload);
    }

    pub fn realtime_status(&self, computer_id: i64) -> Option<RealtimeStatus> {
        self.realtime_status.get(&computer_id).map(|entry| *entry)
    }

    /// Invocado cuando una sesión de agente se admite. Si es la primera
    /// sesión viva para `computer_id`, siembra el estado en línea,
    /// cancela cualquier temporizador de desconexión pendiente, y
    /// difunde la instantánea a los suscriptores.
    #[instrument(skip(self))]
    pub fn on_agent_connected(&self, computer_id: i64) {
        if let Some((_, handle)) = self.debounce_tasks.remove(&computer_id) {
            handle.abort();
            debug!("cancelled pending offline debounce for computer {}", computer_id);
        }

        let seeded = self.realtime_status.entry(computer_id).or_insert_with(|| RealtimeStatus {
            status: PresenceStatus::Online,
            cpu_pct: 0.0,
            ram_pct: 0.0,
            disk_pct: 0.0,
            last_updated: Utc::now(),
        });
        let snapshot = *seeded;
        drop(seeded);

        self.emit_to_room(&subscribers_room(computer_id), "computer:status_updated", status_payload(computer_id, &snapshot));
    }

    /// Aplica un reporte de métricas de un agente, recortando a `[0,100]`.
    #[instrument(skip(self))]
    pub fn apply_status_update(&self, computer_id: i64, cpu_pct: f64, ram_pct: f64, disk_pct: f64) {
        let status = RealtimeStatus {
            status: PresenceStatus::Online,
            cpu_pct: cpu_pct.clamp(0.0, 100.0),
            ram_pct: ram_pct.clamp(0.0, 100.0),
            disk_pct: disk_pct.clamp(0.0, 100.0),
            last_updated: Utc::now(),
        };
        self.realtime_status.insert(computer_id, status);
        self.emit_to_room(&subscribers_room(computer_id), "computer:status_updated", status_payload(computer_id, &status));
    }

    /// Retira la sesión de todas sus salas. Si era la última sesión de
    /// agente para `computer_id`, arma el temporizador de rebote de
    /// desconexión (1500ms por defecto).
    #[instrument(skip(self, hub))]
    pub fn on_session_closed(hub: &Arc<SessionHub>, session_id: Uuid) {
        let Some((_, session)) = hub.sessions.remove(&session_id) else {
            return;
        };

        let rooms: Vec<String> = session.rooms.iter().map(|r| r.key().clone()).collect();
        for room in &rooms {
            if let Some(members) = hub.rooms.get(room) {
                members.remove(&session_id);
            }
        }

        if let ClientKind::Agent { computer_id } = session.client_kind {
            if !hub.is_connected(computer_id) {
                hub.spawn_offline_debounce(computer_id);
            }
        }
    }

    fn spawn_offline_debounce(self: &Arc<Self>, computer_id: i64) {
        let hub = Arc::clone(self);
        let deadline = hub.offline_debounce;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            if hub.is_connected(computer_id) {
                return;
            }

            let status = RealtimeStatus {
                status: PresenceStatus::Offline,
                cpu_pct: 0.0,
                ram_pct: 0.0,
                disk_pct: 0.0,
                last_updated: Utc::now(),
            };
            hub.emit_to_room(&subscribers_room(computer_id), "computer:status_updated", status_payload(computer_id, &status));
            hub.realtime_status.remove(&computer_id);
            hub.debounce_tasks.remove(&computer_id);
            info!("computer {} marked offline after debounce window", computer_id);
        });

        self.debounce_tasks.insert(computer_id, handle);
    }

    /// `frontend:subscribe`. El llamador ya resolvió la autorización
    /// (admin, o asignación de sala); este método sólo hace la mutación
    /// de membresía y emite ack + instantánea en el orden exigido.
    #[instrument(skip(self))]
    pub fn subscribe(&self, session_id: Uuid, computer_id: i64) {
        self.join(session_id, &subscribers_room(computer_id));
        self.emit_to_session(session_id, "subscribe_response", json!({ "success": true, "computer_id": computer_id }));
        if let Some(status) = self.realtime_status(computer_id) {
            self.emit_to_session(session_id, "computer:status_updated", status_payload(computer_id, &status));
        }
    }

    #[instrument(skip(self))]
    pub fn unsubscribe(&self, session_id: Uuid, computer_id: i64) {
        self.leave(session_id, &subscribers_room(computer_id));
        self.emit_to_session(session_id, "unsubscribe_response", json!({ "success": true, "computer_id": computer_id }));
    }
}

fn status_payload(computer_id: i64, status: &RealtimeStatus) -> Value {
    json!({
        "computer_id": computer_id,
        "status": status.status,
        "cpu_pct": status.cpu_pct,
        "ram_pct": status.ram_pct,
        "disk_pct": status.disk_pct,
        "last_updated": status.last_updated,
    })
}

fn envelope(event: &str, payload: Value) -> String {
    let mut frame = json!({ "event": event });
    if let Value::Object(map) = payload {
        if let Value::Object(frame_map) = &mut frame {
            frame_map.extend(map);
        }
    } else {
        frame["data"] = payload;
    }
    frame.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_without_existing_status_only_acks() {
        let hub = SessionHub::new(Duration::from_millis(50));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session_id = hub.register_session(ClientKind::Frontend { user_id: 1, role: Role::User }, tx);

        hub.subscribe(session_id, 42);

        let first = rx.recv().await.unwrap();
        assert!(first.contains("subscribe_response"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn subscribe_with_existing_status_sends_ack_then_snapshot() {
        let hub = SessionHub::new(Duration::from_millis(50));
        hub.on_agent_connected(7);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session_id = hub.register_session(ClientKind::Frontend { user_id: 1, role: Role::Admin }, tx);

        hub.subscribe(session_id, 7);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(first.contains("subscribe_response"));
        assert!(second.contains("computer:status_updated"));
    }

    #[tokio::test]
    async fn connected_agent_and_online_user_counts_reflect_live_sessions() {
        let hub = SessionHub::new(Duration::from_millis(50));
        let (agent_tx, _agent_rx) = mpsc::unbounded_channel();
        hub.register_session(ClientKind::Agent { computer_id: 1 }, agent_tx);
        let (agent_tx2, _agent_rx2) = mpsc::unbounded_channel();
        hub.register_session(ClientKind::Agent { computer_id: 2 }, agent_tx2);

        let (user_tx, _user_rx) = mpsc::unbounded_channel();
        hub.register_session(ClientKind::Frontend { user_id: 10, role: Role::User }, user_tx);
        let (user_tx2, _user_rx2) = mpsc::unbounded_channel();
        hub.register_session(ClientKind::Frontend { user_id: 10, role: Role::User }, user_tx2);

        assert_eq!(hub.connected_agent_count(), 2);
        assert_eq!(hub.online_user_count(), 1);
    }

    #[tokio::test]
    async fn reconnect_within_debounce_window_cancels_offline_transition() {
        let hub = Arc::new(SessionHub::new(Duration::from_millis(100)));
        let (tx, _rx) = mpsc::unbounded_channel();
        let session_id = hub.register_session(ClientKind::Agent { computer_id: 9 }, tx);
        hub.on_agent_connected(9);

        SessionHub::on_session_closed(&hub, session_id);
        assert!(!hub.is_connected(9));

        let (tx2, _rx2) = mpsc::unbounded_channel();
        hub.register_session(ClientKind::Agent { computer_id: 9 }, tx2);
        hub.on_agent_connected(9);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let status = hub.realtime_status(9).unwrap();
        assert_eq!(status.status, PresenceStatus::Online);
    }
}
