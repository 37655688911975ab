//! # Matchmaking Client Library
//!
//! A thin terminal client for the relay server. It turns typed commands into
//! protocol requests and tracks the session state the server's responses
//! imply: login, lobby, waiting for an opponent, playing.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! Session state machine driven purely by server responses. No request is
//! ever assumed to succeed until the matching response arrives.
//!
//! ### Input Module (`input`)
//! Parses terminal lines into commands. While a match is running, free text
//! is sent to the opponent as a move.
//!
//! ### Network Module (`network`)
//! TCP connection, request sending and the interactive loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use shared::{Credentials, Request};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect("127.0.0.1:9002").await?;
//!
//!     client
//!         .send_request(&Request::Login(Credentials {
//!             username: "alice".to_string(),
//!             password: String::new(),
//!         }))
//!         .await?;
//!
//!     if let Some(response) = client.next_response().await {
//!         println!("{}", response.message);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
