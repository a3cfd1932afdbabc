//! Math types.
//!
//! Plain `Vec3`/`Euler` structs are what travels on the wire and what state
//! stores hold. Quaternion work (construction from Euler angles, slerp) goes
//! through `glam` so smoothing never has to reason about wraparound itself.

use std::f32::consts::{PI, TAU};

use glam::{EulerRot, Quat};
use serde::{Deserialize, Serialize};

/// 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn len_sq(self) -> f32 {
        self.dot(self)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn distance(self, rhs: Self) -> f32 {
        self.sub(rhs).len_sq().sqrt()
    }

    pub fn lerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self::new(
            self.x + (to.x - self.x) * t,
            self.y + (to.y - self.y) * t,
            self.z + (to.z - self.z) * t,
        )
    }

    /// True when every component is a finite number.
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// True when any component differs from `other` by more than `epsilon`.
    pub fn differs_from(self, other: Self, epsilon: f32) -> bool {
        (self.x - other.x).abs() > epsilon
            || (self.y - other.y).abs() > epsilon
            || (self.z - other.z).abs() > epsilon
    }

    /// Rounds every component to `decimals` places.
    pub fn rounded(self, decimals: u32) -> Self {
        Self::new(
            round_to_decimals(self.x, decimals),
            round_to_decimals(self.y, decimals),
            round_to_decimals(self.z, decimals),
        )
    }
}

impl From<Vec3> for glam::Vec3 {
    fn from(v: Vec3) -> Self {
        glam::Vec3::new(v.x, v.y, v.z)
    }
}

impl From<glam::Vec3> for Vec3 {
    fn from(v: glam::Vec3) -> Self {
        Vec3::new(v.x, v.y, v.z)
    }
}

/// Euler rotation in radians.
///
/// Applied yaw (Y) first, then pitch (X), then roll (Z), matching the
/// renderer's convention for character models.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Euler {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Euler {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Wraps every component into (-π, π].
    pub fn normalized(self) -> Self {
        Self::new(wrap_angle(self.x), wrap_angle(self.y), wrap_angle(self.z))
    }

    pub fn rounded(self, decimals: u32) -> Self {
        Self::new(
            round_to_decimals(self.x, decimals),
            round_to_decimals(self.y, decimals),
            round_to_decimals(self.z, decimals),
        )
    }

    /// True when any component's shortest angular distance to `other`
    /// exceeds `epsilon`.
    pub fn differs_from(self, other: Self, epsilon: f32) -> bool {
        shortest_angle_delta(other.x, self.x).abs() > epsilon
            || shortest_angle_delta(other.y, self.y).abs() > epsilon
            || shortest_angle_delta(other.z, self.z).abs() > epsilon
    }

    /// Unit quaternion for this rotation, with `yaw_offset` added to the
    /// Y component first.
    pub fn to_quat_with_yaw_offset(self, yaw_offset: f32) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.y + yaw_offset, self.x, self.z)
    }

    pub fn to_quat(self) -> Quat {
        self.to_quat_with_yaw_offset(0.0)
    }
}

impl From<Vec3> for Euler {
    fn from(v: Vec3) -> Self {
        Euler::new(v.x, v.y, v.z)
    }
}

impl From<Euler> for Vec3 {
    fn from(e: Euler) -> Self {
        Vec3::new(e.x, e.y, e.z)
    }
}

/// Rounds `value` to `decimals` decimal places (half away from zero).
pub fn round_to_decimals(value: f32, decimals: u32) -> f32 {
    let multiplier = 10f32.powi(decimals as i32);
    (value * multiplier).round() / multiplier
}

/// Wraps an angle in radians into (-π, π].
pub fn wrap_angle(angle: f32) -> f32 {
    PI - (PI - angle).rem_euclid(TAU)
}

/// Signed shortest rotation that takes `from` to `to`, in [-π, π).
pub fn shortest_angle_delta(from: f32, to: f32) -> f32 {
    (to - from + PI).rem_euclid(TAU) - PI
}

/// Moves the angle `current` toward `target` by `t` of the shortest arc.
pub fn lerp_angle(current: f32, target: f32, t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    wrap_angle(current + shortest_angle_delta(current, target) * t)
}
