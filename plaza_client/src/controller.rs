//! Character-controller samples.
//!
//! In a real client the physics character controller produces these once per
//! frame. This module defines the sample shape the sync core consumes and a
//! deterministic wandering path for headless runs and bots.

use std::f32::consts::TAU;

use plaza_shared::math::{Euler, Vec3};

/// What the character controller reports for one tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControllerSample {
    pub position: Vec3,
    pub rotation: Euler,
    /// Name of the animation action currently playing, if any.
    pub active_action: Option<String>,
}

impl ControllerSample {
    pub fn new(position: Vec3, rotation: Euler) -> Self {
        Self {
            position,
            rotation,
            active_action: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.active_action = Some(action.into());
        self
    }
}

/// Walks a circle around `center`, idling for a while each lap.
#[derive(Debug, Clone)]
pub struct WanderPath {
    center: Vec3,
    radius: f32,
    /// Radians per second.
    speed: f32,
    elapsed: f32,
}

impl WanderPath {
    pub fn new(center: Vec3, radius: f32, speed: f32) -> Self {
        Self {
            center,
            radius,
            speed,
            elapsed: 0.0,
        }
    }

    /// Advances by `dt_sec` and returns the new sample.
    pub fn step(&mut self, dt_sec: f32) -> ControllerSample {
        self.elapsed += dt_sec.max(0.0);
        let lap = TAU / self.speed.abs().max(f32::EPSILON);
        let phase = self.elapsed % (lap + 1.0);

        // One second of idling at the start of each lap.
        if phase < 1.0 {
            let pos = self.point_at(0.0);
            return ControllerSample::new(pos, Euler::new(0.0, 0.0, 0.0)).with_action("idle");
        }

        let angle = (phase - 1.0) * self.speed;
        let pos = self.point_at(angle);
        // Face along the direction of travel.
        let yaw = -angle * self.speed.signum();
        ControllerSample::new(pos, Euler::new(0.0, yaw, 0.0).normalized()).with_action("walk")
    }

    fn point_at(&self, angle: f32) -> Vec3 {
        Vec3::new(
            self.center.x + self.radius * angle.cos(),
            self.center.y,
            self.center.z + self.radius * angle.sin(),
        )
    }
}
