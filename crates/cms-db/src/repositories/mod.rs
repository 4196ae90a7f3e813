// [crates/cms-db/src/repositories/mod.rs]
pub mod agent_version_repository;
pub mod computer_repository;
pub mod refresh_token_repository;
pub mod room_repository;
pub mod user_repository;

pub use agent_version_repository::AgentVersionRepository;
pub use computer_repository::ComputerRepository;
pub use refresh_token_repository::RefreshTokenRepository;
pub use room_repository::RoomRepository;
pub use user_repository::UserRepository;
