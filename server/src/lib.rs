//! # Four-Player Pong Server Library
//!
//! This library provides the authoritative server for a four-player pong
//! match. It runs the lobby, owns the canonical game state, applies player
//! actions and keeps every client's mirror in step.
//!
//! ## Core Responsibilities
//!
//! ### Lobby
//! Players connect over TCP and join with a nickname. Each is seated in the
//! lowest free slot (0 to 3), which also fixes the wall they defend. The
//! match starts exactly once, when all four connected players are ready.
//!
//! ### Authoritative Simulation
//! The server runs the definitive ball and paddle simulation from
//! [`shared::GameState`]. Clients predict their own paddle, apply echoed
//! actions from the others, and overwrite their mirror with each snapshot.
//!
//! ### State Broadcasting
//! Paddle actions are echoed to the other players as they arrive, and a
//! full `GameSync` snapshot goes out every sync interval while the match
//! runs. When only one player has points left the server sends `GameEnd`
//! with the final scores and shuts down.
//!
//! ## Architecture Design
//!
//! ### Two Channels on One Port
//! Lobby control travels over TCP, which gives ordering and delivery.
//! Actions and snapshots use UDP on the same port number. A datagram is
//! attributed to a player by matching its source address against the peer
//! address of that player's TCP connection, so clients bind their UDP
//! socket to their TCP local address.
//!
//! ### Task Layout
//! - **Accept loop**: spawns one task per TCP connection
//! - **Connection task**: reads lobby messages; a sibling writer task drains
//!   the connection's outbox so no lock is held during socket writes
//! - **Datagram reader**: validates actions, queues them, echoes them
//! - **Game loop**: drains the action queue, ticks, and sends snapshots
//!
//! Shared state is a [`tokio::sync::Mutex`] around the [`session::Session`]
//! plus a separately locked [`action_queue::ActionQueue`]. A watch channel
//! carries the stop flag to every task.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::new("0.0.0.0", 8080)).await?;
//!     // Returns after the match ends or the shutdown handle fires
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod action_queue;
pub mod config;
pub mod network;
pub mod session;
