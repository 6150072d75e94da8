use thiserror::Error;

use crate::value::Value;

/// Failure reported by a host capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// WebSocket hub operations reachable from bytecode. Implementations are
/// shared across executions, so every method takes `&self`.
pub trait WebSocketHandler: Send + Sync {
    fn send(&self, message: &Value) -> Result<(), HostError>;
    fn broadcast(&self, message: &Value) -> Result<(), HostError>;
    fn broadcast_to_room(&self, room: &str, message: &Value) -> Result<(), HostError>;
    fn join_room(&self, room: &str) -> Result<(), HostError>;
    fn leave_room(&self, room: &str) -> Result<(), HostError>;
    fn close(&self, reason: &str) -> Result<(), HostError>;
    fn rooms(&self) -> Result<Vec<String>, HostError>;
    fn room_clients(&self, room: &str) -> Result<Vec<String>, HostError>;
    fn connection_count(&self) -> Result<i64, HostError>;
    /// Seconds since the hub started.
    fn uptime(&self) -> Result<i64, HostError>;
}
