//! # Matchmaking Relay Server Library
//!
//! This library implements a small two-player matchmaking service. Clients
//! log in, join or create a named room, and once two clients occupy a room
//! every gameplay message one of them sends is relayed to the other until
//! someone leaves or disconnects.
//!
//! ## Core Responsibilities
//!
//! ### Connection Lifecycle
//! Links are accepted from the transport, swept when they become invalid and
//! removed on disconnect. A disconnect cascades into room cleanup.
//!
//! ### Room Pairing
//! Rooms are created lazily by name, hold at most two members and are deleted
//! the instant they become empty. The second joiner triggers a "start
//! playing" notification to both members; a third joiner is turned away.
//!
//! ### Message Dispatch
//! Each inbound frame is decoded into a typed request and routed by its
//! action. Malformed frames and unknown actions are logged and dropped
//! without closing the connection.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Tick
//! All registry and room state is owned by [`network::Server`] and mutated
//! only from [`network::Server::tick`]. Each tick updates the transport,
//! sweeps dead links, accepts new ones and drains every connection's event
//! queue in arrival order. Nothing needs a lock.
//!
//! ### Pluggable Transport
//! Socket I/O sits behind the [`transport::Transport`] trait. The TCP
//! implementation runs reads and writes on tokio tasks and only ever exposes
//! completed events to the tick; the loopback implementation lets tests
//! drive the server frame by frame.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Registry of accepted connection handles with an optional capacity limit.
//!
//! ### Room Manager Module (`room_manager`)
//! Room map and pairing state machine. Operations return an outbox of
//! responses instead of writing to the network.
//!
//! ### Dispatcher Module (`dispatcher`)
//! Decodes frames and routes requests to the auth and room handlers.
//!
//! ### Network Module (`network`)
//! The server loop, its configuration and shutdown handling.
//!
//! ### Transport Module (`transport`)
//! Connection handles, transport events and the TCP/loopback transports.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::bind("0.0.0.0:9002", ServerConfig::default()).await?;
//!
//!     // Ticks until Ctrl+C, then releases every connection and room
//!     server.run().await;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod dispatcher;
pub mod network;
pub mod room_manager;
pub mod transport;
