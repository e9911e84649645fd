use std::collections::{HashMap, HashSet};

use crate::{ConnId, RoomId};

/// Topic subscriptions, decoupled from the transport. A room is just a set
/// of connections; publishing to members is the handler's job.
pub struct RoomState {
    rooms: HashMap<RoomId, HashSet<ConnId>>,
}

impl RoomState {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    pub fn join(&mut self, room: &str, conn_id: &str) {
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(conn_id.to_string());
    }

    /// Leaving a room the connection never joined is a no-op.
    pub fn leave(&mut self, room: &str, conn_id: &str) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(conn_id);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }

    /// Drop every membership for a connection (disconnect path).
    pub fn leave_all(&mut self, conn_id: &str) {
        self.rooms.retain(|_, members| {
            members.remove(conn_id);
            !members.is_empty()
        });
    }

    pub fn members(&self, room: &str) -> Vec<ConnId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_and_members() {
        let mut rooms = RoomState::new();
        rooms.join("tracking", "a");
        rooms.join("tracking", "b");
        rooms.join("tracking", "a");

        let mut members = rooms.members("tracking");
        members.sort();
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn leave_unknown_room_or_member_is_noop() {
        let mut rooms = RoomState::new();
        rooms.leave("tracking", "a");
        rooms.join("tracking", "a");
        rooms.leave("tracking", "b");
        assert_eq!(rooms.members("tracking"), vec!["a".to_string()]);
    }

    #[test]
    fn leave_all_clears_every_membership() {
        let mut rooms = RoomState::new();
        rooms.join("tracking", "a");
        rooms.join("user:1", "a");
        rooms.join("tracking", "b");

        rooms.leave_all("a");
        assert_eq!(rooms.members("tracking"), vec!["b".to_string()]);
        assert!(rooms.members("user:1").is_empty());
    }
}
