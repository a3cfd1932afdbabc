//! Interpolation.
//!
//! Remote players arrive as sparse, step-wise targets. The client renders at
//! its own rate and eases a per-entity current value toward the latest
//! target every tick. Position uses lerp; rotation is converted to a
//! quaternion and uses slerp, which always takes the shorter arc.
//!
//! Buffers are pull-based: the caller supplies the factor (or the elapsed
//! time via [`smoothing_factor`]) and they know nothing about the network.

use glam::Quat;
use plaza_shared::math::{lerp_angle, Euler, Vec3};

/// Frame-rate independent blend factor: the fraction of the remaining
/// distance to cover after `dt_sec` when converging at `rate` per second.
pub fn smoothing_factor(rate: f32, dt_sec: f32) -> f32 {
    if dt_sec <= 0.0 || rate <= 0.0 {
        return 0.0;
    }
    (1.0 - (-rate * dt_sec).exp()).clamp(0.0, 1.0)
}

/// Smooths a position toward its latest target.
#[derive(Debug, Clone, Default)]
pub struct PositionBuffer {
    current: Vec3,
    initialized: bool,
}

impl PositionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances one tick. The first call after (re)initialization snaps
    /// straight to `target`.
    pub fn advance(&mut self, target: Vec3, factor: f32) -> Vec3 {
        if !self.initialized {
            self.current = target;
            self.initialized = true;
        } else {
            self.current = self.current.lerp(target, factor);
        }
        self.current
    }

    pub fn current(&self) -> Option<Vec3> {
        self.initialized.then_some(self.current)
    }

    pub fn reset(&mut self) {
        self.initialized = false;
    }
}

/// Smooths an Euler rotation target through quaternion slerp.
#[derive(Debug, Clone)]
pub struct RotationBuffer {
    current: Quat,
    initialized: bool,
    yaw_offset: f32,
}

impl Default for RotationBuffer {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl RotationBuffer {
    /// `yaw_offset` is added to the target's Y angle before conversion, for
    /// models whose rest pose faces away from the gameplay forward axis.
    pub fn new(yaw_offset: f32) -> Self {
        Self {
            current: Quat::IDENTITY,
            initialized: false,
            yaw_offset,
        }
    }

    pub fn advance(&mut self, target: Euler, factor: f32) -> Quat {
        let to = target.to_quat_with_yaw_offset(self.yaw_offset);
        if !self.initialized {
            self.current = to;
            self.initialized = true;
        } else {
            self.current = self.current.slerp(to, factor.clamp(0.0, 1.0)).normalize();
        }
        self.current
    }

    pub fn current(&self) -> Option<Quat> {
        self.initialized.then_some(self.current)
    }

    pub fn reset(&mut self) {
        self.initialized = false;
    }
}

/// Smooths a single raw angle (radians) along the shortest arc.
#[derive(Debug, Clone, Default)]
pub struct AngleBuffer {
    current: f32,
    initialized: bool,
}

impl AngleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, target: f32, factor: f32) -> f32 {
        if !self.initialized {
            self.current = target;
            self.initialized = true;
        } else {
            self.current = lerp_angle(self.current, target, factor);
        }
        self.current
    }

    pub fn current(&self) -> Option<f32> {
        self.initialized.then_some(self.current)
    }
}

/// Smoothed pose handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedPose {
    pub position: Vec3,
    pub rotation: Quat,
}

/// Per-entity snapshot buffer: one position and one rotation channel.
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    position: PositionBuffer,
    rotation: RotationBuffer,
}

impl SnapshotBuffer {
    pub fn new(yaw_offset: f32) -> Self {
        Self {
            position: PositionBuffer::new(),
            rotation: RotationBuffer::new(yaw_offset),
        }
    }

    pub fn advance(
        &mut self,
        position: Vec3,
        rotation: Euler,
        position_factor: f32,
        rotation_factor: f32,
    ) -> SmoothedPose {
        SmoothedPose {
            position: self.position.advance(position, position_factor),
            rotation: self.rotation.advance(rotation, rotation_factor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_advance_snaps_to_target() {
        let mut buf = PositionBuffer::new();
        let target = Vec3::new(42.0, -3.0, 7.5);
        assert_eq!(buf.advance(target, 0.1), target);

        let mut rot = RotationBuffer::new(0.0);
        let q = rot.advance(Euler::new(0.2, 1.0, 0.0), 0.1);
        assert!(q.dot(Euler::new(0.2, 1.0, 0.0).to_quat()).abs() > 0.9999);
    }

    #[test]
    fn lerp_converges_without_overshoot() {
        let mut buf = PositionBuffer::new();
        buf.advance(Vec3::ZERO, 0.25);
        let target = Vec3::new(8.0, 0.0, -4.0);
        let mut prev = Vec3::ZERO;
        for _ in 0..20 {
            let next = buf.advance(target, 0.25);
            assert!(next.x > prev.x && next.x < target.x);
            assert!(next.z < prev.z && next.z > target.z);
            prev = next;
        }
        assert!(prev.distance(target) < 0.05);
    }

    #[test]
    fn unchanged_target_is_idempotent() {
        let mut buf = PositionBuffer::new();
        let target = Vec3::new(1.0, 2.0, 3.0);
        buf.advance(target, 0.5);
        for _ in 0..5 {
            assert_eq!(buf.advance(target, 0.5), target);
        }
    }

    #[test]
    fn reset_snaps_again() {
        let mut buf = PositionBuffer::new();
        buf.advance(Vec3::ZERO, 0.1);
        buf.reset();
        assert_eq!(buf.current(), None);
        assert_eq!(buf.advance(Vec3::new(5.0, 0.0, 0.0), 0.1), Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn slerp_crosses_the_seam_the_short_way() {
        let mut rot = RotationBuffer::new(0.0);
        let start = Euler::new(0.0, 3.1, 0.0);
        let target = Euler::new(0.0, -3.1, 0.0);
        let target_q = target.to_quat();

        let mut current = rot.advance(start, 0.2);
        for _ in 0..10 {
            let before = current.angle_between(target_q);
            current = rot.advance(target, 0.2);
            let after = current.angle_between(target_q);
            assert!(after <= before + 1e-5, "moved away: {before} -> {after}");
            // The short arc is ~0.083 rad; the long one would pass through ~0.
            let (_, yaw, _) = current.to_euler(glam::EulerRot::YXZ);
            assert!(yaw.abs() > 3.0, "yaw swung through the back: {yaw}");
        }
    }

    #[test]
    fn angle_buffer_takes_shortest_arc() {
        let mut buf = AngleBuffer::new();
        buf.advance(3.1, 0.5);
        let before = plaza_shared::math::shortest_angle_delta(3.1, -3.1).abs();
        let next = buf.advance(-3.1, 0.5);
        let after = plaza_shared::math::shortest_angle_delta(next, -3.1).abs();
        assert!(after < before);
        assert!(next.abs() > 3.1);
    }

    #[test]
    fn smoothing_factor_is_frame_rate_independent() {
        let rate = 10.0;
        let one_step = smoothing_factor(rate, 1.0 / 30.0);
        let half = smoothing_factor(rate, 1.0 / 60.0);
        // Two 60 Hz steps cover the same ground as one 30 Hz step.
        let remaining_two = (1.0 - half) * (1.0 - half);
        assert!(((1.0 - one_step) - remaining_two).abs() < 1e-5);
        assert_eq!(smoothing_factor(rate, 0.0), 0.0);
        assert!(smoothing_factor(rate, 100.0) <= 1.0);
    }
}
