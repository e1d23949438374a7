/// Compound scoreboard transitions.
pub mod game_flow;
/// Shared storage origin and the cross-context listener.
pub mod sync_service;
