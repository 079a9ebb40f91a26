//! Types and rules shared by the four-player pong server and its clients.
//!
//! The server runs [`simulation::GameState`] as ground truth; clients keep a
//! mirror of the same type and overwrite it from sync snapshots. Both sides
//! speak the fixed-layout packets defined in [`protocol`].

pub mod framing;
pub mod protocol;
pub mod simulation;

pub use protocol::{Action, Packet, PacketType, PlayerScore, ProtocolError, SyncSnapshot};
pub use simulation::{Ball, GameState, Paddle, TickReport, Wall};

use std::time::Duration;

pub const ARENA_SIZE: f32 = 80.0;
pub const PADDLE_SIZE: f32 = 10.0;
pub const BALL_RADIUS: f32 = 1.0;
pub const PADDLE_SPEED: f32 = 50.0;
pub const BALL_SPEED: f32 = 30.0;
pub const INITIAL_SCORE: i32 = 5;
pub const GAME_FPS: u32 = 60;

/// Distance from a wall at which the ball meets that wall's paddle.
pub const PADDLE_OFFSET: f32 = 2.0;

pub const MAX_PLAYERS: usize = 4;
pub const SYNC_INTERVAL: Duration = Duration::from_millis(100);

/// Slot index of a player, `0..MAX_PLAYERS`. Also selects the player's wall.
pub type PlayerId = usize;
