//! Local player state.
//!
//! Holds the pose this client owns and reports to the room. Values are
//! derived every tick from character-controller output and pass through a
//! fixed rounding/normalization policy before they are stored, so the
//! outbound path only ever sees quantized data.

use plaza_shared::{
    animation::AnimationName,
    config::ClientConfig,
    math::{Euler, Vec3},
    net::MoveData,
};
use tracing::{debug, info};

use crate::{controller::ControllerSample, registry::DEFAULT_USERNAME};

/// One-shot pose override for the character controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Teleport {
    pub position: Vec3,
    /// `None` keeps the controller's current facing.
    pub rotation: Option<Euler>,
}

/// Authoritative local pose plus identity.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPlayer {
    session_id: String,
    username: String,
    position: Vec3,
    rotation: Euler,
    animation: AnimationName,
    pending_teleport: Option<Teleport>,
    precision: u32,
    fall_reset_y: f32,
}

impl Default for LocalPlayer {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl LocalPlayer {
    pub fn from_config(cfg: &ClientConfig) -> Self {
        Self {
            session_id: String::new(),
            username: cfg.player_name.clone(),
            position: Vec3::ZERO,
            rotation: Euler::IDENTITY,
            animation: AnimationName::Idle,
            pending_teleport: None,
            precision: cfg.precision_decimals,
            fall_reset_y: cfg.fall_reset_y,
        }
    }

    // ─── Identity ───

    /// Empty until the first successful join.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Stores the id a room assigned. Returns whether it changed.
    pub fn assign_session_id(&mut self, session_id: &str) -> bool {
        if self.session_id == session_id {
            return false;
        }
        info!(session_id, "Local session id assigned");
        self.session_id = session_id.to_string();
        true
    }

    pub fn clear_session(&mut self) {
        self.session_id.clear();
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Blank names fall back to the default.
    pub fn set_username(&mut self, username: &str) {
        let trimmed = username.trim();
        self.username = if trimmed.is_empty() {
            DEFAULT_USERNAME.to_string()
        } else {
            trimmed.to_string()
        };
    }

    // ─── Pose ───

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Euler {
        self.rotation
    }

    pub fn animation(&self) -> AnimationName {
        self.animation
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position.rounded(self.precision);
    }

    /// Wraps into (-π, π] and then rounds.
    pub fn set_rotation(&mut self, rotation: Euler) {
        self.rotation = rotation.normalized().rounded(self.precision);
    }

    pub fn set_animation(&mut self, animation: AnimationName) {
        self.animation = animation;
    }

    /// Resolves the controller's running action. Unknown or absent names
    /// mean idle.
    pub fn set_action(&mut self, active_action: Option<&str>) {
        let animation = AnimationName::from_action(active_action);
        if let Some(name) = active_action {
            if animation.as_str() != name {
                debug!(action = name, "Unknown action, using idle");
            }
        }
        self.animation = animation;
    }

    // ─── Per-tick update ───

    /// Queues a teleport for the next controller sample.
    pub fn request_teleport(&mut self, position: Vec3, rotation: Option<Euler>) {
        self.pending_teleport = Some(Teleport { position, rotation });
    }

    pub fn pending_teleport(&self) -> Option<&Teleport> {
        self.pending_teleport.as_ref()
    }

    /// Folds one controller sample into the state.
    ///
    /// A pending teleport replaces the sampled pose and is consumed. A pose
    /// below the fall threshold is put back at the origin. Either way the
    /// returned correction tells the caller where to move the controller.
    pub fn apply_controller_sample(&mut self, sample: &ControllerSample) -> Option<Teleport> {
        let mut position = sample.position;
        let mut rotation = sample.rotation;
        let mut correction = None;

        if let Some(teleport) = self.pending_teleport.take() {
            debug!(?teleport, "Applying pending teleport");
            position = teleport.position;
            if let Some(r) = teleport.rotation {
                rotation = r;
            }
            correction = Some(teleport);
        }

        if position.y < self.fall_reset_y {
            info!(y = position.y, "Fell out of the world, resetting to origin");
            position = Vec3::ZERO;
            correction = Some(Teleport {
                position,
                rotation: correction.and_then(|c| c.rotation),
            });
        }

        self.set_position(position);
        self.set_rotation(rotation);
        self.set_action(sample.active_action.as_deref());
        correction
    }

    /// Wire payload for the current pose. Roll is never networked.
    pub fn move_data(&self) -> MoveData {
        MoveData {
            position: self.position,
            rotation: Euler::new(self.rotation.x, self.rotation.y, 0.0),
            animation: self.animation,
        }
    }

    /// Back to startup defaults, keeping the configured policy.
    pub fn reset(&mut self) {
        *self = Self {
            precision: self.precision,
            fall_reset_y: self.fall_reset_y,
            ..Self::from_config(&ClientConfig::default())
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn defaults_before_join() {
        let p = LocalPlayer::default();
        assert_eq!(p.session_id(), "");
        assert_eq!(p.username(), "Player");
        assert_eq!(p.position(), Vec3::ZERO);
        assert_eq!(p.animation(), AnimationName::Idle);
    }

    #[test]
    fn position_is_rounded() {
        let mut p = LocalPlayer::default();
        p.set_position(Vec3::new(1.23456, -0.005001, 9.999));
        assert_eq!(p.position(), Vec3::new(1.23, -0.01, 10.0));
    }

    #[test]
    fn rotation_is_wrapped_then_rounded() {
        let mut p = LocalPlayer::default();
        p.set_rotation(Euler::new(0.0, 3.0 * PI / 2.0, -0.123));
        let r = p.rotation();
        assert_eq!(r.x, 0.0);
        assert!((r.y - -1.57).abs() < 1e-6);
        assert!((r.z - -0.12).abs() < 1e-6);
    }

    #[test]
    fn set_action_falls_back_to_idle() {
        let mut p = LocalPlayer::default();
        p.set_action(Some("run"));
        assert_eq!(p.animation(), AnimationName::Run);
        p.set_action(Some("dance"));
        assert_eq!(p.animation(), AnimationName::Idle);
        p.set_action(Some("jumpForward"));
        p.set_action(None);
        assert_eq!(p.animation(), AnimationName::Idle);
    }

    #[test]
    fn session_id_assignment_reports_change() {
        let mut p = LocalPlayer::default();
        assert!(p.assign_session_id("abc"));
        assert!(!p.assign_session_id("abc"));
        p.clear_session();
        assert_eq!(p.session_id(), "");
        assert!(p.assign_session_id("def"));
    }

    #[test]
    fn blank_username_uses_default() {
        let mut p = LocalPlayer::default();
        p.set_username("  ann ");
        assert_eq!(p.username(), "ann");
        p.set_username("   ");
        assert_eq!(p.username(), DEFAULT_USERNAME);
    }

    #[test]
    fn teleport_is_one_shot() {
        let mut p = LocalPlayer::default();
        p.request_teleport(Vec3::new(5.0, 1.0, 5.0), Some(Euler::new(0.0, 1.0, 0.0)));

        let sample = ControllerSample::new(Vec3::new(100.0, 0.0, 0.0), Euler::IDENTITY);
        let correction = p.apply_controller_sample(&sample).unwrap();
        assert_eq!(correction.position, Vec3::new(5.0, 1.0, 5.0));
        assert_eq!(p.position(), Vec3::new(5.0, 1.0, 5.0));
        assert_eq!(p.rotation(), Euler::new(0.0, 1.0, 0.0));
        assert!(p.pending_teleport().is_none());

        assert!(p.apply_controller_sample(&sample).is_none());
        assert_eq!(p.position(), Vec3::new(100.0, 0.0, 0.0));
    }

    #[test]
    fn falling_resets_to_origin() {
        let mut p = LocalPlayer::default();
        let sample = ControllerSample::new(Vec3::new(3.0, -10.5, 4.0), Euler::IDENTITY)
            .with_action("jumpLoop");
        let correction = p.apply_controller_sample(&sample).unwrap();
        assert_eq!(correction.position, Vec3::ZERO);
        assert_eq!(p.position(), Vec3::ZERO);
        assert_eq!(p.animation(), AnimationName::JumpLoop);

        let at_edge = ControllerSample::new(Vec3::new(0.0, -10.0, 0.0), Euler::IDENTITY);
        assert!(p.apply_controller_sample(&at_edge).is_none());
    }

    #[test]
    fn move_data_drops_roll() {
        let mut p = LocalPlayer::default();
        p.set_rotation(Euler::new(0.1, 0.2, 0.3));
        p.set_animation(AnimationName::Walk);
        let data = p.move_data();
        assert_eq!(data.rotation, Euler::new(0.1, 0.2, 0.0));
        assert_eq!(data.animation, AnimationName::Walk);
    }

    #[test]
    fn reset_restores_defaults() {
        let mut p = LocalPlayer::default();
        p.assign_session_id("x");
        p.set_username("bob");
        p.set_position(Vec3::new(1.0, 2.0, 3.0));
        p.request_teleport(Vec3::ZERO, None);
        p.reset();
        assert_eq!(p, LocalPlayer::default());
    }
}
