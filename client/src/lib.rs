//! # Four-Player Pong Client Library
//!
//! Client side of the four-player pong match: joining the lobby, sending
//! paddle actions, and keeping a mirror of the server's game state for a
//! front end to draw.
//!
//! ## Architecture Overview
//!
//! ### Prediction of the Local Paddle
//! When the player changes intent, the client applies it to its own paddle
//! at once and sends it to the server. There is no acknowledgement and no
//! rollback.
//!
//! ### Snapshot Correction
//! Every `GameSync` from the server overwrites ball, paddles and scores in
//! the mirror. This is the only correction; visible snaps at each sync are
//! expected. Between syncs only paddles move locally.
//!
//! ### Two Channels
//! Lobby messages use the TCP connection. Actions and snapshots use a UDP
//! socket bound to the TCP connection's local address, which is how the
//! server tells whose datagram it is.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The mirrored state: lobby roster, match phase, paddles, ball, scores.
//!
//! ### Input Module (`input`)
//! Maps keys to paddle intents and reports only changes.
//!
//! ### Network Module (`network`)
//! The connection, the join handshake and the background task that feeds
//! both inbound channels into the mirror.
//!
//! ### Status Module (`status`)
//! A one-line text scoreboard standing in for a renderer.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use client::status::Scoreboard;
//! use shared::Action;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect("127.0.0.1:8080", "alice").await?;
//!     client.ready().await?;
//!
//!     client.send_action(Action::MoveLeft).await?;
//!
//!     let state = client.state();
//!     println!("{}", Scoreboard(&*state.lock().await));
//!
//!     client.leave().await;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod status;
