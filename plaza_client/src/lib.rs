//! `plaza_client`
//!
//! Client-side network state sync for a shared 3D world:
//! - Connection lifecycle against a room transport
//! - Local player state and throttled outbound moves
//! - Remote player registry fed by room events
//! - Interpolation of remote players for rendering
//! - Loopback and TCP room transports

pub mod client;
pub mod connection;
pub mod console;
pub mod controller;
pub mod inbound;
pub mod interp;
pub mod local_player;
pub mod outbound;
pub mod registry;
pub mod render;
pub mod transport;

pub use client::GameClient;
