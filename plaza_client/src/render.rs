//! Render-state projection.
//!
//! Turns the registry snapshot and the local player into what a renderer
//! consumes each frame. Smoothing state lives here, one [`SnapshotBuffer`]
//! per remote player, created when the player first shows up in a snapshot
//! and dropped when it leaves.

use std::collections::BTreeMap;

use glam::Quat;
use plaza_shared::{
    animation::AnimationName,
    config::SmoothingConfig,
    math::{Euler, Vec3},
};
use tokio::time::Instant;

use crate::{
    interp::{smoothing_factor, SnapshotBuffer},
    local_player::LocalPlayer,
    registry::RegistrySnapshot,
};

/// Smoothed state for one remote player.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRenderState {
    pub session_id: String,
    pub username: String,
    pub position: Vec3,
    pub rotation: Quat,
    pub animation: AnimationName,
    pub avatar: Option<String>,
}

/// Local player fields as the renderer sees them.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRenderState {
    pub session_id: String,
    pub username: String,
    pub position: Vec3,
    pub rotation: Euler,
    pub animation: AnimationName,
    pub last_sent_at: Option<Instant>,
}

impl LocalRenderState {
    pub fn from_player(player: &LocalPlayer, last_sent_at: Option<Instant>) -> Self {
        Self {
            session_id: player.session_id().to_string(),
            username: player.username().to_string(),
            position: player.position(),
            rotation: player.rotation(),
            animation: player.animation(),
            last_sent_at,
        }
    }
}

/// Everything to draw for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderFrame {
    pub local: LocalRenderState,
    /// In session id order.
    pub remotes: Vec<RemoteRenderState>,
}

impl RenderFrame {
    pub fn remote(&self, session_id: &str) -> Option<&RemoteRenderState> {
        self.remotes.iter().find(|r| r.session_id == session_id)
    }
}

/// Per-player smoothing buffers, keyed by session id.
#[derive(Debug, Clone)]
pub struct RemoteSmoothing {
    cfg: SmoothingConfig,
    buffers: BTreeMap<String, SnapshotBuffer>,
}

impl RemoteSmoothing {
    pub fn new(cfg: SmoothingConfig) -> Self {
        Self {
            cfg,
            buffers: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    /// Advances every buffer by `dt_sec` toward the snapshot's targets.
    pub fn advance(&mut self, snapshot: &RegistrySnapshot, dt_sec: f32) -> Vec<RemoteRenderState> {
        let pos_factor = smoothing_factor(self.cfg.position_rate, dt_sec);
        let rot_factor = smoothing_factor(self.cfg.rotation_rate, dt_sec);
        self.advance_with_factors(snapshot, pos_factor, rot_factor)
    }

    /// Same as [`RemoteSmoothing::advance`] with explicit blend factors.
    pub fn advance_with_factors(
        &mut self,
        snapshot: &RegistrySnapshot,
        position_factor: f32,
        rotation_factor: f32,
    ) -> Vec<RemoteRenderState> {
        self.buffers.retain(|id, _| snapshot.contains_key(id));

        let yaw_offset = self.cfg.model_yaw_offset;
        snapshot
            .values()
            .map(|entry| {
                let buffer = self
                    .buffers
                    .entry(entry.session_id.clone())
                    .or_insert_with(|| SnapshotBuffer::new(yaw_offset));
                let pose =
                    buffer.advance(entry.position, entry.rotation, position_factor, rotation_factor);
                RemoteRenderState {
                    session_id: entry.session_id.clone(),
                    username: entry.username.clone(),
                    position: pose.position,
                    rotation: pose.rotation,
                    animation: entry.animation,
                    avatar: entry.avatar.clone(),
                }
            })
            .collect()
    }
}
