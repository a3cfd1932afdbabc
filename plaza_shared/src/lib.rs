//! `plaza_shared`
//!
//! Shared primitives used by the client and its transports.
//!
//! Design goals:
//! - Plain, serde-friendly data on the wire; no transport assumptions in
//!   payload types.
//! - Deterministic helpers (rounding, angle wrapping) with stable semantics.
//! - No `unsafe`.

pub mod animation;
pub mod config;
pub mod math;
pub mod net;
pub mod world;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::animation::*;
    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::world::*;
}
