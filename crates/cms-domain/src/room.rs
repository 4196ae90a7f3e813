// [crates/cms-domain/src/room.rs]
/*!
 * =================================================================
 * APARATO: ROOM DOMAIN MODELS
 * CLASIFICACIÓN: DOMAIN ENTITIES (ESTRATO L2)
 * RESPONSABILIDAD: AGRUPACIÓN LÓGICA DE COMPUTADORAS Y ASIGNACIÓN DE USUARIOS
 * =================================================================
 */

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub room_id: i64,
    pub name: String,
    pub layout: RoomLayout,
    pub description: Option<String>,
}

/// Dimensiones de la cuadrícula de asientos. Toda `Computer` asignada a
/// la sala debe satisfacer `0 <= pos_x < columns` y `0 <= pos_y < rows`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoomLayout {
    pub columns: i32,
    pub rows: i32,
}

impl RoomLayout {
    pub fn contains(&self, pos_x: i32, pos_y: i32) -> bool {
        pos_x >= 0 && pos_x < self.columns && pos_y >= 0 && pos_y < self.rows
    }
}

/// Arista de autorización: un usuario no-admin sólo puede interactuar con
/// computadoras de salas para las que exista una asignación.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UserRoomAssignment {
    pub user_id: i64,
    pub room_id: i64,
}
