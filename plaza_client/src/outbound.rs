//! Outbound sync policy.
//!
//! Decides, once per tick, whether the local pose goes out to the room.
//! The minimum send interval is checked first and wins outright; only then
//! is the pose compared against what was last sent.

use std::time::Duration;

use plaza_shared::{config::SyncConfig, net::MoveData};
use tokio::time::Instant;

use crate::local_player::LocalPlayer;

/// Last-sent snapshot plus throttle state.
#[derive(Debug, Clone)]
pub struct OutboundSync {
    min_interval: Duration,
    position_epsilon: f32,
    rotation_epsilon: f32,
    last_sent: Option<MoveData>,
    last_sent_at: Option<Instant>,
}

impl OutboundSync {
    pub fn new(cfg: &SyncConfig) -> Self {
        Self {
            min_interval: cfg.min_send_interval(),
            position_epsilon: cfg.position_epsilon,
            rotation_epsilon: cfg.rotation_epsilon,
            last_sent: None,
            last_sent_at: None,
        }
    }

    pub fn last_sent(&self) -> Option<&MoveData> {
        self.last_sent.as_ref()
    }

    pub fn last_sent_at(&self) -> Option<Instant> {
        self.last_sent_at
    }

    /// Forgets the last send so the next eligible tick always sends.
    pub fn reset(&mut self) {
        self.last_sent = None;
        self.last_sent_at = None;
    }

    /// Returns the payload to send this tick, if any, and records it as sent.
    pub fn tick(&mut self, now: Instant, connected: bool, local: &LocalPlayer) -> Option<MoveData> {
        if !connected {
            return None;
        }
        if let Some(at) = self.last_sent_at {
            if now.saturating_duration_since(at) < self.min_interval {
                return None;
            }
        }

        let current = local.move_data();
        if let Some(prev) = &self.last_sent {
            let moved = current.position.differs_from(prev.position, self.position_epsilon);
            let turned = current.rotation.differs_from(prev.rotation, self.rotation_epsilon);
            let animated = current.animation != prev.animation;
            if !(moved || turned || animated) {
                return None;
            }
        }

        self.last_sent = Some(current);
        self.last_sent_at = Some(now);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaza_shared::{
        animation::AnimationName,
        math::{Euler, Vec3},
    };

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn nothing_sent_while_disconnected() {
        let mut out = OutboundSync::new(&SyncConfig::default());
        let local = LocalPlayer::default();
        assert!(out.tick(Instant::now(), false, &local).is_none());
        assert!(out.last_sent().is_none());
    }

    #[test]
    fn first_connected_tick_sends() {
        let mut out = OutboundSync::new(&SyncConfig::default());
        let local = LocalPlayer::default();
        let sent = out.tick(Instant::now(), true, &local).unwrap();
        assert_eq!(sent.position, Vec3::ZERO);
        assert_eq!(sent.animation, AnimationName::Idle);
    }

    #[test]
    fn throttle_caps_rate_under_continuous_motion() {
        let mut out = OutboundSync::new(&SyncConfig::default());
        let mut local = LocalPlayer::default();
        let start = Instant::now();

        // 1 second of 1 ms ticks with the player always moving.
        let mut sent = 0;
        for i in 0..1000u64 {
            local.set_position(Vec3::new(i as f32 * 0.1, 0.0, 0.0));
            if out.tick(start + ms(i), true, &local).is_some() {
                sent += 1;
            }
        }
        assert_eq!(sent, 20);
    }

    #[test]
    fn unchanged_state_is_not_resent() {
        let mut out = OutboundSync::new(&SyncConfig::default());
        let mut local = LocalPlayer::default();
        let start = Instant::now();
        assert!(out.tick(start, true, &local).is_some());

        assert!(out.tick(start + ms(500), true, &local).is_none());

        // Below epsilon after rounding.
        local.set_position(Vec3::new(0.004, 0.0, 0.0));
        assert!(out.tick(start + ms(1000), true, &local).is_none());

        local.set_rotation(Euler::new(0.0, 0.5, 0.0));
        assert!(out.tick(start + ms(1100), true, &local).is_some());

        local.set_animation(AnimationName::Run);
        assert!(out.tick(start + ms(1120), true, &local).is_none());
        assert!(out.tick(start + ms(1150), true, &local).is_some());
    }

    #[test]
    fn reset_allows_immediate_send() {
        let mut out = OutboundSync::new(&SyncConfig::default());
        let local = LocalPlayer::default();
        let start = Instant::now();
        assert!(out.tick(start, true, &local).is_some());
        out.reset();
        assert!(out.tick(start + ms(1), true, &local).is_some());
    }
}
