//! Configuration system.
//!
//! Loads client configuration from JSON strings (file IO left to the app)
//! and applies environment overrides on top.

use std::{env, f32::consts::PI, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Root client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Room server endpoint, e.g. `127.0.0.1:2567`.
    #[serde(default = "default_server_endpoint")]
    pub server_endpoint: String,
    /// Room to join on connect.
    #[serde(default = "default_room_name")]
    pub room_name: String,
    #[serde(default = "default_player_name")]
    pub player_name: String,
    /// Render/tick loop frequency.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub smoothing: SmoothingConfig,
    /// Upper bound on a single connect attempt.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Upper bound on the leave handshake during disconnect.
    #[serde(default = "default_leave_timeout_ms")]
    pub leave_timeout_ms: u64,
    /// Decimal places kept for local position/rotation.
    #[serde(default = "default_precision_decimals")]
    pub precision_decimals: u32,
    /// Falling below this height puts the local player back at the origin.
    #[serde(default = "default_fall_reset_y")]
    pub fall_reset_y: f32,
    #[serde(default)]
    pub world: WorldConfig,
}

/// Outbound throttling and change detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub min_send_interval_ms: u64,
    pub position_epsilon: f32,
    pub rotation_epsilon: f32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_send_interval_ms: 50,
            position_epsilon: 0.01,
            rotation_epsilon: 0.01,
        }
    }
}

impl SyncConfig {
    pub fn min_send_interval(&self) -> Duration {
        Duration::from_millis(self.min_send_interval_ms)
    }
}

/// Remote player smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Exponential convergence rate for position, per second.
    pub position_rate: f32,
    /// Exponential convergence rate for rotation, per second.
    pub rotation_rate: f32,
    /// Added to remote yaw before building the render quaternion.
    pub model_yaw_offset: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            position_rate: 12.0,
            rotation_rate: 12.0,
            model_yaw_offset: PI,
        }
    }
}

/// Infinite grid partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub cell_size: f32,
    pub visible_cells_x: u32,
    pub visible_cells_z: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            cell_size: 20.0,
            visible_cells_x: 3,
            visible_cells_z: 3,
        }
    }
}

fn default_server_endpoint() -> String {
    "127.0.0.1:2567".to_string()
}

fn default_room_name() -> String {
    "my_room".to_string()
}

fn default_player_name() -> String {
    "Player".to_string()
}

fn default_tick_hz() -> u32 {
    60
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_leave_timeout_ms() -> u64 {
    1000
}

fn default_precision_decimals() -> u32 {
    2
}

fn default_fall_reset_y() -> f32 {
    -10.0
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_endpoint: default_server_endpoint(),
            room_name: default_room_name(),
            player_name: default_player_name(),
            tick_hz: default_tick_hz(),
            sync: SyncConfig::default(),
            smoothing: SmoothingConfig::default(),
            connect_timeout_ms: default_connect_timeout_ms(),
            leave_timeout_ms: default_leave_timeout_ms(),
            precision_decimals: default_precision_decimals(),
            fall_reset_y: default_fall_reset_y(),
            world: WorldConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Applies `PLAZA_*` environment overrides. Unparseable values are ignored.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PLAZA_SERVER_ENDPOINT") {
            self.server_endpoint = v;
        }
        if let Some(v) = lookup("PLAZA_ROOM_NAME") {
            self.room_name = v;
        }
        if let Some(v) = lookup("PLAZA_PLAYER_NAME") {
            self.player_name = v;
        }
        if let Some(v) = lookup("PLAZA_CONNECT_TIMEOUT_MS") {
            match v.parse() {
                Ok(ms) => self.connect_timeout_ms = ms,
                Err(_) => warn!(value = %v, "Ignoring bad PLAZA_CONNECT_TIMEOUT_MS"),
            }
        }
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn leave_timeout(&self) -> Duration {
        Duration::from_millis(self.leave_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.tick_hz.max(1) as f32)
    }
}
