//! Server loop tying the transport, registry, dispatcher and rooms together

use crate::client_manager::ClientManager;
use crate::dispatcher;
use crate::room_manager::{Outbox, RoomManager};
use crate::transport::{TcpTransport, Transport, TransportError, TransportEvent};
use log::{debug, error, info, warn};
use shared::codec::{self, EncodeError};
use shared::DEFAULT_ROOM_CAPACITY;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Links accepted beyond this are closed immediately
    pub max_clients: usize,
    pub room_capacity: usize,
    /// Interval between ticks when driven by [`Server::run`]
    pub tick_duration: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_clients: 1000,
            room_capacity: DEFAULT_ROOM_CAPACITY,
            tick_duration: Duration::from_millis(16),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Running,
    Stopped,
}

/// What a single tick did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub accepted: usize,
    pub swept: usize,
    pub frames: usize,
    pub disconnects: usize,
    pub responses: usize,
}

impl TickStats {
    pub fn is_idle(&self) -> bool {
        *self == TickStats::default()
    }
}

/// Matchmaking server over any [`Transport`]
///
/// All registry and room state is mutated from [`Server::tick`] only, so no
/// locking is needed as long as a single task drives it.
pub struct Server<T: Transport> {
    transport: T,
    clients: ClientManager,
    rooms: RoomManager,
    state: ServerState,
    tick: u64,
    tick_duration: Duration,
}

impl Server<TcpTransport> {
    /// Binds a TCP listener. Fails if the address cannot be bound.
    pub async fn bind(addr: &str, config: ServerConfig) -> Result<Self, TransportError> {
        let transport = TcpTransport::bind(addr).await?;
        Ok(Self::new(transport, config))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }
}

impl<T: Transport> Server<T> {
    pub fn new(transport: T, config: ServerConfig) -> Self {
        Self {
            transport,
            clients: ClientManager::new(config.max_clients),
            rooms: RoomManager::with_capacity(config.room_capacity),
            state: ServerState::Running,
            tick: 0,
            tick_duration: config.tick_duration,
        }
    }

    /// Runs one pass: update the transport, sweep, accept, then drain and
    /// dispatch every connection's pending events in arrival order.
    pub fn tick(&mut self) -> TickStats {
        let mut stats = TickStats::default();
        if self.state == ServerState::Stopped {
            return stats;
        }

        self.transport.update();

        let swept = self.clients.sweep(&self.transport);
        for id in &swept {
            self.rooms.disconnect(*id);
        }
        stats.swept = swept.len();

        stats.accepted = self.clients.accept(&mut self.transport).len();

        for id in self.clients.ids() {
            while let Some(event) = self.transport.pop_event(id) {
                match event {
                    TransportEvent::Connect => debug!("Connection {} ready", id),
                    TransportEvent::Data(frame) => {
                        stats.frames += 1;
                        self.clients.record_frame(id);
                        let outbox = dispatcher::dispatch(&mut self.rooms, id, &frame);
                        stats.responses += self.deliver(outbox);
                    }
                    TransportEvent::Disconnect => {
                        info!("Client {} disconnected", id);
                        stats.disconnects += 1;
                        self.rooms.disconnect(id);
                        self.clients.remove_client(&id);
                        self.transport.close(id);
                        break;
                    }
                }
            }
        }

        self.tick += 1;
        if !stats.is_idle() {
            debug!(
                "Tick {}: {} clients, {} rooms, {:?}",
                self.tick,
                self.clients.len(),
                self.rooms.room_count(),
                stats
            );
        }

        stats
    }

    /// Encodes and sends each response. Returns how many were handed to the
    /// transport.
    fn deliver(&mut self, outbox: Outbox) -> usize {
        let mut sent = 0;

        for (id, response) in outbox {
            let frame = match codec::encode(&response) {
                Ok(frame) => frame,
                Err(e @ EncodeError::TooLarge(_)) => {
                    warn!("Dropping response for {}: {}", id, e);
                    continue;
                }
                Err(e) => {
                    error!("Failed to encode response for {}: {}", id, e);
                    continue;
                }
            };

            match self.transport.send(id, frame) {
                Ok(()) => sent += 1,
                Err(e) => warn!("Failed to send to {}: {}", id, e),
            }
        }

        sent
    }

    /// Disposes the transport and drops every connection and room
    pub fn shutdown(&mut self) {
        if self.state == ServerState::Stopped {
            return;
        }

        info!(
            "Server shutting down ({} clients, {} rooms)",
            self.clients.len(),
            self.rooms.room_count()
        );
        self.transport.shutdown();
        self.clients.clear();
        self.rooms.clear();
        self.state = ServerState::Stopped;
    }

    /// Ticks at the configured rate until `shutdown` resolves, then stops
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("Server started successfully");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tick_interval.tick() => {
                    self.tick();
                }
            }
        }

        self.shutdown();
    }

    /// Ticks until Ctrl+C
    pub async fn run(&mut self) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
