// Managers Module
//
// Focused manager classes extracted from the engine to apply Single
// Responsibility Principle.
//
// - BroadcastChannelManager: Tokio broadcast channel management

pub mod broadcast_manager;

pub use broadcast_manager::BroadcastChannelManager;
