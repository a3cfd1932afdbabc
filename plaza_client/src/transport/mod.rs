//! Room transport abstraction.
//!
//! The client never talks to sockets directly. A [`Transport`] joins a room
//! and hands back a [`Session`]; the session sends client messages, exposes
//! the current player set and lets listeners subscribe to room events.
//!
//! Subscriptions deliver into an [`EventSink`] so that every event reaches
//! the tick owner through one ordered channel, and each returns a
//! [`Subscription`] disposer that detaches the listener exactly once.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use plaza_shared::net::{ClientMessage, JoinOptions, PlayerState};
use tokio::sync::mpsc;

pub mod hub;
pub mod loopback;
pub mod tcp;

pub use hub::EventHub;
pub use loopback::{ConnectMode, LoopbackRoom, LoopbackTransport};
pub use tcp::TcpTransport;

/// Close code used when a peer vanishes without a leave handshake.
pub const CLOSE_ABNORMAL: i32 = 1006;
/// Close code for a consented leave.
pub const CLOSE_CONSENTED: i32 = 1000;

/// Event emitted by a joined room.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    PlayerAdded { key: String, state: PlayerState },
    PlayerChanged { key: String, state: PlayerState },
    PlayerRemoved { key: String },
    Error { code: i32, message: String },
    Left { code: i32 },
}

impl RoomEvent {
    pub fn kind(&self) -> RoomEventKind {
        match self {
            RoomEvent::PlayerAdded { .. } => RoomEventKind::PlayerAdded,
            RoomEvent::PlayerChanged { .. } => RoomEventKind::PlayerChanged,
            RoomEvent::PlayerRemoved { .. } => RoomEventKind::PlayerRemoved,
            RoomEvent::Error { .. } => RoomEventKind::Error,
            RoomEvent::Left { .. } => RoomEventKind::Left,
        }
    }
}

/// Which events a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomEventKind {
    PlayerAdded,
    PlayerChanged,
    PlayerRemoved,
    Error,
    Left,
}

/// Destination for subscribed events.
pub type EventSink = mpsc::UnboundedSender<RoomEvent>;

/// Disposer returned by [`Session::subscribe`].
///
/// Unsubscribes on [`Subscription::unsubscribe`] or on drop, whichever comes
/// first; the underlying detach runs once.
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new<F>(dispose: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// A subscription with nothing to detach.
    pub fn noop() -> Self {
        Self { dispose: None }
    }

    pub fn is_active(&self) -> bool {
        self.dispose.is_some()
    }

    pub fn unsubscribe(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// An established membership in a room.
#[async_trait]
pub trait Session: Send + Sync {
    /// Id the room assigned to this client.
    fn session_id(&self) -> &str;

    fn send(&self, message: ClientMessage) -> anyhow::Result<()>;

    /// Players currently in the room, including this session's own entry.
    fn players(&self) -> Vec<(String, PlayerState)>;

    fn subscribe(&self, kind: RoomEventKind, sink: EventSink) -> Subscription;

    /// Leave handshake. May fail; callers treat it as best effort.
    async fn leave(&self) -> anyhow::Result<()>;
}

/// Something that can join rooms.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        endpoint: &str,
        room: &str,
        options: &JoinOptions,
    ) -> anyhow::Result<Arc<dyn Session>>;
}
