//! Connection registry for the relay server
//!
//! This module owns the set of live connection handles:
//! - Accepting every link the transport has pending, up to a capacity limit
//! - Sweeping entries whose link is no longer valid
//! - Removing entries on disconnect notification
//!
//! Room membership is not tracked here. The server loop pairs every removal
//! with the matching room cleanup.

use crate::transport::{ConnectionId, Transport};
use log::{info, warn};
use std::collections::HashMap;
use std::time::Instant;

/// Represents one accepted client link
#[derive(Debug)]
pub struct Client {
    /// Handle assigned by the transport
    pub id: ConnectionId,
    /// When the link was accepted
    pub connected_at: Instant,
    /// Last time a frame arrived on this link
    pub last_seen: Instant,
    /// Number of data frames received
    pub frames_received: u64,
}

impl Client {
    pub fn new(id: ConnectionId) -> Self {
        let now = Instant::now();
        Self {
            id,
            connected_at: now,
            last_seen: now,
            frames_received: 0,
        }
    }

    pub fn record_frame(&mut self) {
        self.last_seen = Instant::now();
        self.frames_received += 1;
    }
}

/// Manages all accepted client links
///
/// The ClientManager is the sole owner of connection handles. Rooms and the
/// dispatcher only ever hold copies of a handle for lookup and sending.
pub struct ClientManager {
    /// Accepted clients indexed by handle
    clients: HashMap<ConnectionId, Client>,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty registry that holds at most `max_clients` links
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
        }
    }

    /// Registers a handle. Returns false if the registry is at capacity or
    /// already holds the handle.
    pub fn add_client(&mut self, id: ConnectionId) -> bool {
        if self.clients.len() >= self.max_clients || self.clients.contains_key(&id) {
            return false;
        }

        self.clients.insert(id, Client::new(id));
        true
    }

    /// Pulls every pending link from the transport.
    ///
    /// Links beyond capacity are closed on the spot. Returns the handles
    /// that were accepted.
    pub fn accept<T: Transport>(&mut self, transport: &mut T) -> Vec<ConnectionId> {
        let mut accepted = Vec::new();

        while let Some(id) = transport.accept() {
            if self.add_client(id) {
                accepted.push(id);
                info!(
                    "Accepted new connection {}. Total: {}",
                    id,
                    self.clients.len()
                );
            } else {
                warn!(
                    "Rejecting connection {}: server full ({} clients)",
                    id, self.max_clients
                );
                transport.close(id);
            }
        }

        accepted
    }

    /// Removes entries whose link is no longer open and returns them
    pub fn sweep<T: Transport>(&mut self, transport: &T) -> Vec<ConnectionId> {
        let stale: Vec<ConnectionId> = self
            .clients
            .keys()
            .filter(|id| !transport.is_open(**id))
            .copied()
            .collect();

        for id in &stale {
            self.clients.remove(id);
            info!("Swept closed connection {}", id);
        }

        stale
    }

    /// Removes a client on disconnect. Returns true if it was registered.
    pub fn remove_client(&mut self, id: &ConnectionId) -> bool {
        match self.clients.remove(id) {
            Some(client) => {
                info!(
                    "Client {} disconnected after {:.1}s ({} frames)",
                    client.id,
                    client.connected_at.elapsed().as_secs_f32(),
                    client.frames_received
                );
                true
            }
            None => false,
        }
    }

    pub fn record_frame(&mut self, id: ConnectionId) {
        if let Some(client) = self.clients.get_mut(&id) {
            client.record_frame();
        }
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Snapshot of all handles in ascending order
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.clients.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Forgets every client without touching the transport
    pub fn clear(&mut self) {
        self.clients.clear();
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// Returns the number of currently registered clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are registered
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackTransport;

    #[test]
    fn test_client_creation() {
        let client = Client::new(ConnectionId(3));

        assert_eq!(client.id, ConnectionId(3));
        assert_eq!(client.frames_received, 0);
        assert_eq!(client.connected_at, client.last_seen);
    }

    #[test]
    fn test_client_record_frame() {
        let mut client = Client::new(ConnectionId(1));
        client.record_frame();
        client.record_frame();

        assert_eq!(client.frames_received, 2);
        assert!(client.last_seen >= client.connected_at);
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(5);
        assert_eq!(manager.max_clients(), 5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        assert!(manager.add_client(ConnectionId(1)));
        assert!(!manager.add_client(ConnectionId(2)));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_add_duplicate_client() {
        let mut manager = ClientManager::new(4);

        assert!(manager.add_client(ConnectionId(1)));
        assert!(!manager.add_client(ConnectionId(1)));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_accept_drains_all_pending() {
        let mut transport = LoopbackTransport::new();
        let mut manager = ClientManager::new(10);

        let a = transport.connect();
        let b = transport.connect();
        let c = transport.connect();

        let accepted = manager.accept(&mut transport);
        assert_eq!(accepted, vec![a, b, c]);
        assert_eq!(manager.ids(), vec![a, b, c]);
        assert!(manager.accept(&mut transport).is_empty());
    }

    #[test]
    fn test_accept_over_capacity_closes_link() {
        let mut transport = LoopbackTransport::new();
        let mut manager = ClientManager::new(1);

        let a = transport.connect();
        let b = transport.connect();

        assert_eq!(manager.accept(&mut transport), vec![a]);
        assert!(manager.contains(a));
        assert!(!manager.contains(b));
        assert!(transport.is_open(a));
        assert!(!transport.is_open(b));
    }

    #[test]
    fn test_sweep_removes_closed_links_only() {
        let mut transport = LoopbackTransport::new();
        let mut manager = ClientManager::new(10);

        let a = transport.connect();
        let b = transport.connect();
        let c = transport.connect();
        manager.accept(&mut transport);

        transport.sever(b);

        assert_eq!(manager.sweep(&transport), vec![b]);
        assert_eq!(manager.ids(), vec![a, c]);
        assert!(manager.sweep(&transport).is_empty());
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new(2);
        manager.add_client(ConnectionId(1));

        assert!(manager.remove_client(&ConnectionId(1)));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_remove_nonexistent_client() {
        let mut manager = ClientManager::new(2);

        assert!(!manager.remove_client(&ConnectionId(999)));
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_record_frame_through_manager() {
        let mut manager = ClientManager::new(2);
        manager.add_client(ConnectionId(1));

        manager.record_frame(ConnectionId(1));
        manager.record_frame(ConnectionId(42));

        assert_eq!(manager.get(ConnectionId(1)).unwrap().frames_received, 1);
        assert!(manager.get(ConnectionId(42)).is_none());
    }
}
