//! Runtime settings for the game server.

use shared::{GAME_FPS, SYNC_INTERVAL};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address for both the TCP listener and the UDP socket.
    pub bind_addr: String,
    /// Target interval between simulation ticks.
    pub tick_duration: Duration,
    /// Interval between `GameSync` broadcasts while the match runs.
    pub sync_interval: Duration,
    /// Upper bound on a measured tick delta, so a stalled loop cannot make
    /// the ball skip through a paddle.
    pub max_delta: Duration,
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            bind_addr: format!("{}:{}", host, port),
            ..Self::default()
        }
    }

    pub fn with_tick_rate(mut self, ticks_per_second: u32) -> Self {
        self.tick_duration = Duration::from_secs_f64(1.0 / ticks_per_second.max(1) as f64);
        self
    }

    pub fn with_sync_interval(mut self, sync_interval: Duration) -> Self {
        self.sync_interval = sync_interval;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            tick_duration: Duration::from_secs_f64(1.0 / GAME_FPS as f64),
            sync_interval: SYNC_INTERVAL,
            max_delta: Duration::from_millis(50),
        }
    }
}
