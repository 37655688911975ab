//! Room pairing state machine
//!
//! Rooms are created lazily on the first join that names them and deleted the
//! moment their last member leaves, so the map never holds an empty room.
//! A connection is a member of at most one room at a time.
//!
//! Every operation returns the responses it produced as an [`Outbox`]; the
//! caller encodes and sends them. Size checks and broadcasts happen inside a
//! single call on the tick thread, so nothing can interleave between them.

use crate::transport::ConnectionId;
use log::{debug, info};
use shared::{
    Response, DEFAULT_ROOM_CAPACITY, MSG_JOINED, MSG_LEFT_ROOM, MSG_ROOM_FULL, MSG_WAITING,
    OPPONENT_PREFIX,
};
use std::collections::HashMap;

/// Responses addressed to individual connections, in send order
pub type Outbox = Vec<(ConnectionId, Response)>;

#[derive(Debug)]
pub struct RoomManager {
    /// Room name -> members in join order
    rooms: HashMap<String, Vec<ConnectionId>>,
    /// Member -> the one room it sits in
    membership: HashMap<ConnectionId, String>,
    capacity: usize,
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomManager {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ROOM_CAPACITY)
    }

    /// A room counts as paired once it holds `capacity` members
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            membership: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Joins `conn` to the room called `name`, creating the room if needed.
    ///
    /// Re-joining a room already joined is a silent no-op. A full room
    /// rejects the joiner without touching its members. A connection sitting
    /// in another room is moved out of it first, but only once the join is
    /// known to succeed.
    pub fn join_or_create(&mut self, name: &str, conn: ConnectionId) -> Outbox {
        if let Some(members) = self.rooms.get(name) {
            if members.contains(&conn) {
                debug!("{} is already in room '{}'", conn, name);
                return Vec::new();
            }
            if members.len() >= self.capacity {
                info!("{} rejected from full room '{}'", conn, name);
                return vec![(conn, Response::error(MSG_ROOM_FULL))];
            }
        }

        if let Some(previous) = self.remove_member(conn) {
            info!("{} moved out of room '{}'", conn, previous);
        }

        self.membership.insert(conn, name.to_string());
        let members = self.rooms.entry(name.to_string()).or_default();
        members.push(conn);
        info!(
            "{} joined room '{}' ({}/{})",
            conn,
            name,
            members.len(),
            self.capacity
        );

        if members.len() == self.capacity {
            members
                .iter()
                .map(|member| (*member, Response::success(MSG_JOINED)))
                .collect()
        } else {
            vec![(conn, Response::success(MSG_WAITING))]
        }
    }

    /// Removes `conn` from its room and always confirms to `conn`
    pub fn leave(&mut self, conn: ConnectionId) -> Outbox {
        match self.remove_member(conn) {
            Some(room) => info!("{} left room '{}'", conn, room),
            None => debug!("{} asked to leave but is in no room", conn),
        }
        vec![(conn, Response::info(MSG_LEFT_ROOM))]
    }

    /// Removes a connection that is already gone. Nobody is notified,
    /// including the remaining occupant. Returns the room it was in.
    pub fn disconnect(&mut self, conn: ConnectionId) -> Option<String> {
        let room = self.remove_member(conn);
        if let Some(room) = &room {
            info!("{} dropped from room '{}'", conn, room);
        }
        room
    }

    /// Forwards `content` to every other member of the sender's room
    pub fn relay(&self, conn: ConnectionId, content: &str) -> Outbox {
        let Some(members) = self.room_of(conn).and_then(|name| self.rooms.get(name)) else {
            debug!("{} played outside of any room", conn);
            return Vec::new();
        };

        let message = format!("{}{}", OPPONENT_PREFIX, content);
        members
            .iter()
            .filter(|member| **member != conn)
            .map(|member| (*member, Response::success(message.clone())))
            .collect()
    }

    pub fn members(&self, name: &str) -> Option<&[ConnectionId]> {
        self.rooms.get(name).map(Vec::as_slice)
    }

    pub fn room_of(&self, conn: ConnectionId) -> Option<&str> {
        self.membership.get(&conn).map(String::as_str)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.rooms.clear();
        self.membership.clear();
    }

    fn remove_member(&mut self, conn: ConnectionId) -> Option<String> {
        let name = self.membership.remove(&conn)?;

        if let Some(members) = self.rooms.get_mut(&name) {
            members.retain(|member| *member != conn);
            if members.is_empty() {
                self.rooms.remove(&name);
                debug!("Room '{}' deleted", name);
            }
        }

        Some(name)
    }
}
