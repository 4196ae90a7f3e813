// [apps/coordinator/src/services/agent_registry.rs]
/*!
 * =================================================================
 * APARATO: AGENT REGISTRY (C4)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: IDENTIDAD Y POSICIONAMIENTO DE AGENTES EN SALAS
 *
 * Fachada sobre el repositorio de `Computer`: resuelve `agent_id` a
 * `computer_id`, valida credenciales de portador en tiempo constante, y
 * gobierna la colocación en la grilla de una sala al registrar o
 * refrescar un agente.
 * =================================================================
 */

use cms_crypto::{generate_secret, CredentialStore};
use cms_db::{ComputerRepository, DbError, RoomRepository};
use cms_domain::computer::PositionInfo;
use cms_domain::{Computer, CoreError, Room};
use std::sync::Arc;
use tracing::instrument;

pub struct AgentRegistry {
    computers: Arc<ComputerRepository>,
    rooms: Arc<RoomRepository>,
    credentials: Arc<CredentialStore>,
}

impl AgentRegistry {
    pub fn new(computers: Arc<ComputerRepository>, rooms: Arc<RoomRepository>, credentials: Arc<CredentialStore>) -> Self {
        AgentRegistry { computers, rooms, credentials }
    }

    #[instrument(skip(self))]
    pub async fn find_by_agent_id(&self, agent_id: &str) -> Result<Option<Computer>, CoreError> {
        self.computers.find_computer_by_agent_id(agent_id).await.map_err(map_db_err)
    }

    /// Compone `find_by_agent_id` con la verificación de portador en
    /// tiempo constante. Devuelve `None` ante registro ausente, hash
    /// nulo (agente aún no bootstrapeado), o credencial incorrecta —
    /// las tres causas son indistinguibles para el llamador.
    #[instrument(skip(self, presented))]
    pub async fn verify_agent_token(&self, agent_id: &str, presented: &str) -> Result<Option<i64>, CoreError> {
        let Some(computer) = self.find_by_agent_id(agent_id).await? else {
            return Ok(None);
        };
        let Some(stored_hash) = &computer.agent_token_hash else {
            return Ok(None);
        };
        if self.credentials.verify_token(presented, stored_hash) {
            Ok(Some(computer.computer_id))
        } else {
            Ok(None)
        }
    }

    /// Valida `position_info` contra los límites de la grilla de su sala y
    /// la ausencia de colisión de asiento, sin persistir nada. Usado tanto
    /// por `register_or_refresh` como por el pre-chequeo de `/agent/identify`
    /// antes de emitir un código MFA (evitar bootstrapear un agente con una
    /// posición que de todos modos será rechazada).
    #[instrument(skip(self, position_info))]
    pub async fn check_position(&self, position_info: &PositionInfo, agent_id: &str) -> Result<Room, CoreError> {
        let room = self
            .rooms
            .find_room_by_name(&position_info.room_name)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| CoreError::NotFound(format!("room '{}'", position_info.room_name)))?;

        if !room.layout.contains(position_info.pos_x, position_info.pos_y) {
            return Err(CoreError::ValidationFailed("position is outside the room's grid layout".to_string()));
        }

        if self
            .rooms_position_occupied(room.room_id, position_info.pos_x, position_info.pos_y, agent_id)
            .await?
        {
            return Err(CoreError::Conflict("position already occupied by another agent".to_string()));
        }

        Ok(room)
    }

    /// Registra un agente nuevo o refresca uno existente, colocándolo en
    /// `position_info.room_name` tras validar los límites de la grilla y
    /// la ausencia de colisión de asiento. Atómico respecto del registro
    /// de `Computer`: una sola transición consistente entre "ausente" y
    /// "token+posición nuevos".
    #[instrument(skip(self, position_info))]
    pub async fn register_or_refresh(&self, agent_id: &str, position_info: &PositionInfo) -> Result<(i64, String), CoreError> {
        let room = self.check_position(position_info, agent_id).await?;

        let token_plain = hex::encode(generate_secret(32));
        let token_hash = self
            .credentials
            .hash_token(&token_plain)
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        let existing = self.find_by_agent_id(agent_id).await?;
        let computer_id = match existing {
            Some(computer) => {
                self.computers
                    .update_token_and_position(
                        computer.computer_id,
                        &token_hash,
                        Some(room.room_id),
                        position_info.pos_x,
                        position_info.pos_y,
                    )
                    .await
                    .map_err(map_db_err)?;
                computer.computer_id
            }
            None => self
                .computers
                .create_computer(agent_id, &token_hash, Some(room.room_id), position_info.pos_x, position_info.pos_y)
                .await
                .map_err(map_db_err)?,
        };

        Ok((computer_id, token_plain))
    }

    async fn rooms_position_occupied(&self, room_id: i64, pos_x: i32, pos_y: i32, agent_id: &str) -> Result<bool, CoreError> {
        self.computers
            .position_occupied_by_other(room_id, pos_x, pos_y, agent_id)
            .await
            .map_err(map_db_err)
    }
}

fn map_db_err(err: DbError) -> CoreError {
    match err {
        DbError::NotFound => CoreError::NotFound("resource".to_string()),
        DbError::Conflict(message) => CoreError::Conflict(message),
        other => CoreError::Internal(other.to_string()),
    }
}
