// [crates/cms-domain/src/lib.rs]
/*!
 * =================================================================
 * APARATO: DOMAIN ENTITIES (ESTRATO L2)
 * RESPONSABILIDAD: DEFINICIÓN DE ENTIDADES, DTOs Y TAXONOMÍA DE ERRORES
 *
 * Las entidades aquí descritas son agnósticas de transporte y de
 * persistencia: ni conocen HTTP/WebSocket, ni SQL. `cms-db` las
 * hidrata desde el repositorio; `apps/coordinator` las sirve a través
 * de la frontera HTTP/WS.
 * =================================================================
 */

pub mod agent_version;
pub mod command;
pub mod computer;
pub mod duration;
pub mod error;
pub mod room;
pub mod user;

pub use agent_version::AgentVersion;
pub use command::{CommandResult, CommandType};
pub use computer::{Computer, ErrorRecord, PositionInfo};
pub use error::CoreError;
pub use room::{Room, RoomLayout, UserRoomAssignment};
pub use user::{RefreshToken, Role, User, UserProfile};
