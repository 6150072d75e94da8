use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{HostError, WebSocketHandler};
use crate::value::Value;

/// One capability call observed by [`RecordingHandler`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Send(Value),
    Broadcast(Value),
    BroadcastToRoom { room: String, message: Value },
    Join(String),
    Leave(String),
    Close(String),
}

#[derive(Debug, Default)]
struct Recorded {
    calls: Vec<HostCall>,
    rooms: BTreeMap<String, Vec<String>>,
}

/// In-memory hub for a single connection. Records every side effect and keeps
/// room membership so the query opcodes see earlier joins.
#[derive(Debug)]
pub struct RecordingHandler {
    client: String,
    connections: i64,
    uptime: i64,
    state: Mutex<Recorded>,
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new("client-1")
    }
}

impl RecordingHandler {
    pub fn new(client: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            connections: 1,
            uptime: 0,
            state: Mutex::new(Recorded::default()),
        }
    }

    pub fn with_stats(mut self, connections: i64, uptime: i64) -> Self {
        self.connections = connections;
        self.uptime = uptime;
        self
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Recorded>, HostError> {
        self.state
            .lock()
            .map_err(|_| HostError::new("recording handler state poisoned"))
    }

    fn record(&self, call: HostCall) -> Result<(), HostError> {
        self.lock()?.calls.push(call);
        Ok(())
    }
}

impl WebSocketHandler for RecordingHandler {
    fn send(&self, message: &Value) -> Result<(), HostError> {
        self.record(HostCall::Send(message.clone()))
    }

    fn broadcast(&self, message: &Value) -> Result<(), HostError> {
        self.record(HostCall::Broadcast(message.clone()))
    }

    fn broadcast_to_room(&self, room: &str, message: &Value) -> Result<(), HostError> {
        self.record(HostCall::BroadcastToRoom {
            room: room.to_string(),
            message: message.clone(),
        })
    }

    fn join_room(&self, room: &str) -> Result<(), HostError> {
        let mut state = self.lock()?;
        let members = state.rooms.entry(room.to_string()).or_default();
        if !members.contains(&self.client) {
            members.push(self.client.clone());
        }
        state.calls.push(HostCall::Join(room.to_string()));
        Ok(())
    }

    fn leave_room(&self, room: &str) -> Result<(), HostError> {
        let mut state = self.lock()?;
        if let Some(members) = state.rooms.get_mut(room) {
            members.retain(|c| c != &self.client);
            if members.is_empty() {
                state.rooms.remove(room);
            }
        }
        state.calls.push(HostCall::Leave(room.to_string()));
        Ok(())
    }

    fn close(&self, reason: &str) -> Result<(), HostError> {
        self.record(HostCall::Close(reason.to_string()))
    }

    fn rooms(&self) -> Result<Vec<String>, HostError> {
        Ok(self.lock()?.rooms.keys().cloned().collect())
    }

    fn room_clients(&self, room: &str) -> Result<Vec<String>, HostError> {
        Ok(self.lock()?.rooms.get(room).cloned().unwrap_or_default())
    }

    fn connection_count(&self) -> Result<i64, HostError> {
        Ok(self.connections)
    }

    fn uptime(&self) -> Result<i64, HostError> {
        Ok(self.uptime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_follows_join_and_leave() {
        let hub = RecordingHandler::new("c1");
        hub.join_room("lobby").unwrap();
        assert_eq!(hub.room_clients("lobby").unwrap(), vec!["c1".to_string()]);
        hub.leave_room("lobby").unwrap();
        assert!(hub.rooms().unwrap().is_empty());
        assert_eq!(
            hub.calls(),
            vec![HostCall::Join("lobby".into()), HostCall::Leave("lobby".into())]
        );
    }
}
