//! Connection lifecycle.
//!
//! One [`ConnectionManager`] owns the connect/disconnect state machine for a
//! running client:
//!
//! ```text
//! idle ──connect──▶ connecting ──▶ connected ──leave──▶ disconnected
//!                        │                                   │
//!                        └──────▶ failed ◀── (retry) ────────┘
//! ```
//!
//! Goals:
//! - At most one outstanding connect attempt
//! - Attempts never hang: every attempt is bounded by a timeout
//! - Never block the tick: attempts run as tasks, outcomes are applied in
//!   [`ConnectionManager::poll`]
//! - Results of attempts that were abandoned (disconnect, teardown) are
//!   discarded and their sessions left in the background
//! - Disconnect always ends in `disconnected`, whatever the leave handshake
//!   does

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use plaza_shared::{config::ClientConfig, net::JoinOptions};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::transport::{RoomEvent, RoomEventKind, Session, Subscription, Transport};

/// Where the client is in the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Failed,
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Failed => "failed",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status plus the last human-readable error.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub error: Option<String>,
}

/// Why a connect call did not produce a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("a connection attempt is already in progress")]
    AlreadyInProgress,
    #[error("already connected")]
    AlreadyConnected,
    #[error("{0}")]
    Transport(String),
    #[error("connection timed out after {0:?}")]
    TimedOut(Duration),
    #[error("room did not assign a session id")]
    MissingSessionId,
}

impl ConnectError {
    /// True for the two "nothing to do" outcomes of a repeated connect.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            ConnectError::AlreadyInProgress | ConnectError::AlreadyConnected
        )
    }
}

/// Transition reported by [`ConnectionManager::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected { session_id: String },
    Failed { message: String },
    /// The room ended the session.
    Disconnected { code: i32 },
    RoomError { code: i32, message: String },
}

struct Attempt {
    epoch: u64,
    result: Result<Arc<dyn Session>, ConnectError>,
}

/// Owns the session and the connection state machine.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    endpoint: String,
    connect_timeout: Duration,
    leave_timeout: Duration,

    state: ConnectionState,
    status_tx: watch::Sender<ConnectionState>,

    /// Bumped whenever in-flight work must be abandoned.
    epoch: u64,
    in_flight: bool,
    attempts_tx: mpsc::UnboundedSender<Attempt>,
    attempts_rx: mpsc::UnboundedReceiver<Attempt>,

    session: Option<Arc<dyn Session>>,
    room_tx: mpsc::UnboundedSender<RoomEvent>,
    room_rx: mpsc::UnboundedReceiver<RoomEvent>,
    room_subs: Vec<Subscription>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, cfg: &ClientConfig) -> Self {
        let (status_tx, _) = watch::channel(ConnectionState::default());
        let (attempts_tx, attempts_rx) = mpsc::unbounded_channel();
        let (room_tx, room_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            endpoint: cfg.server_endpoint.clone(),
            connect_timeout: cfg.connect_timeout(),
            leave_timeout: cfg.leave_timeout(),
            state: ConnectionState::default(),
            status_tx,
            epoch: 0,
            in_flight: false,
            attempts_tx,
            attempts_rx,
            session: None,
            room_tx,
            room_rx,
            room_subs: Vec::new(),
        }
    }

    // ─── Accessors ───

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.status
    }

    pub fn is_connected(&self) -> bool {
        self.state.status == ConnectionStatus::Connected && self.session.is_some()
    }

    pub fn is_connecting(&self) -> bool {
        self.in_flight
    }

    pub fn session(&self) -> Option<&Arc<dyn Session>> {
        self.session.as_ref()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Observer for status changes.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.status_tx.subscribe()
    }

    // ─── Connect ───

    /// Starts a connect attempt in the background. Must be called from
    /// within a tokio runtime.
    pub fn connect(&mut self, room: &str, options: JoinOptions) -> Result<(), ConnectError> {
        if self.in_flight {
            warn!(room, "Connect ignored, attempt already in progress");
            return Err(ConnectError::AlreadyInProgress);
        }
        if self.is_connected() {
            warn!(room, "Connect ignored, already connected");
            return Err(ConnectError::AlreadyConnected);
        }

        self.epoch += 1;
        self.in_flight = true;
        self.set_status(ConnectionStatus::Connecting, self.state.error.clone());
        info!(endpoint = %self.endpoint, room, epoch = self.epoch, "Connecting");

        let epoch = self.epoch;
        let transport = Arc::clone(&self.transport);
        let endpoint = self.endpoint.clone();
        let room = room.to_string();
        let limit = self.connect_timeout;
        let leave_limit = self.leave_timeout;
        let tx = self.attempts_tx.clone();
        tokio::spawn(async move {
            let result =
                match tokio::time::timeout(limit, transport.connect(&endpoint, &room, &options))
                    .await
                {
                    Ok(Ok(session)) => Ok(session),
                    Ok(Err(e)) => Err(ConnectError::Transport(format!("{e:#}"))),
                    Err(_) => Err(ConnectError::TimedOut(limit)),
                };
            // The manager is gone; nobody will ever leave this session.
            if let Err(mpsc::error::SendError(attempt)) = tx.send(Attempt { epoch, result }) {
                if let Ok(session) = attempt.result {
                    leave_with_limit(session, leave_limit).await;
                }
            }
        });
        Ok(())
    }

    /// Applies finished attempts and room notifications. Never blocks.
    pub fn poll(&mut self) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        while let Ok(attempt) = self.attempts_rx.try_recv() {
            events.extend(self.apply_attempt(attempt));
        }
        while let Ok(event) = self.room_rx.try_recv() {
            events.extend(self.apply_room_event(event));
        }
        events
    }

    /// Waits for the outstanding attempt, if any, then polls.
    pub async fn settled(&mut self) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        while self.in_flight {
            match self.attempts_rx.recv().await {
                Some(attempt) => events.extend(self.apply_attempt(attempt)),
                None => break,
            }
        }
        events.extend(self.poll());
        events
    }

    fn apply_attempt(&mut self, attempt: Attempt) -> Option<ConnectionEvent> {
        if attempt.epoch != self.epoch {
            debug!(
                epoch = attempt.epoch,
                current = self.epoch,
                "Discarding result of abandoned connect attempt"
            );
            if let Ok(session) = attempt.result {
                leave_in_background(session, self.leave_timeout);
            }
            return None;
        }
        self.in_flight = false;

        let result = attempt.result.and_then(|session| {
            if session.session_id().is_empty() {
                leave_in_background(session, self.leave_timeout);
                Err(ConnectError::MissingSessionId)
            } else {
                Ok(session)
            }
        });

        match result {
            Ok(session) => {
                let session_id = session.session_id().to_string();
                self.room_subs = vec![
                    session.subscribe(RoomEventKind::Error, self.room_tx.clone()),
                    session.subscribe(RoomEventKind::Left, self.room_tx.clone()),
                ];
                self.session = Some(session);
                self.set_status(ConnectionStatus::Connected, None);
                info!(session_id = %session_id, "Connected");
                Some(ConnectionEvent::Connected { session_id })
            }
            Err(e) => {
                match &e {
                    ConnectError::TimedOut(limit) => warn!(?limit, "Connect timed out"),
                    other => warn!(error = %other, "Connect failed"),
                }
                let message = e.to_string();
                self.set_status(ConnectionStatus::Failed, Some(message.clone()));
                Some(ConnectionEvent::Failed { message })
            }
        }
    }

    fn apply_room_event(&mut self, event: RoomEvent) -> Option<ConnectionEvent> {
        match event {
            RoomEvent::Error { code, message } => {
                warn!(code, message = %message, "Room error");
                self.set_status(self.state.status, Some(message.clone()));
                Some(ConnectionEvent::RoomError { code, message })
            }
            RoomEvent::Left { code } => {
                self.session.as_ref()?;
                info!(code, "Room closed the session");
                self.drop_room_subscriptions();
                self.session = None;
                self.set_status(ConnectionStatus::Disconnected, self.state.error.clone());
                Some(ConnectionEvent::Disconnected { code })
            }
            _ => None,
        }
    }

    // ─── Disconnect ───

    /// Leaves the room (best effort) and always ends `disconnected`.
    /// Abandons any in-flight attempt.
    pub async fn disconnect(&mut self) {
        self.abandon_attempt();
        self.drop_room_subscriptions();
        if let Some(session) = self.session.take() {
            let session_id = session.session_id().to_string();
            match tokio::time::timeout(self.leave_timeout, session.leave()).await {
                Ok(Ok(())) => info!(session_id = %session_id, "Left room"),
                Ok(Err(e)) => warn!(session_id = %session_id, error = %e, "Leave failed"),
                Err(_) => warn!(session_id = %session_id, "Leave timed out"),
            }
        }
        self.set_status(ConnectionStatus::Disconnected, None);
    }

    /// Synchronous teardown for scopes that cannot await: abandons the
    /// attempt and leaves the session in the background.
    pub fn teardown(&mut self) {
        self.abandon_attempt();
        self.drop_room_subscriptions();
        if let Some(session) = self.session.take() {
            leave_in_background(session, self.leave_timeout);
        }
        if self.state.status != ConnectionStatus::Idle {
            self.set_status(ConnectionStatus::Disconnected, None);
        }
    }

    fn abandon_attempt(&mut self) {
        if self.in_flight {
            debug!(epoch = self.epoch, "Abandoning connect attempt");
        }
        self.epoch += 1;
        self.in_flight = false;
    }

    fn drop_room_subscriptions(&mut self) {
        for mut sub in self.room_subs.drain(..) {
            sub.unsubscribe();
        }
        while self.room_rx.try_recv().is_ok() {}
    }

    fn set_status(&mut self, status: ConnectionStatus, error: Option<String>) {
        let next = ConnectionState { status, error };
        if next != self.state {
            self.state = next;
            self.status_tx.send_replace(self.state.clone());
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn leave_in_background(session: Arc<dyn Session>, limit: Duration) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        debug!("No runtime, dropping session without leave");
        return;
    };
    handle.spawn(leave_with_limit(session, limit));
}

async fn leave_with_limit(session: Arc<dyn Session>, limit: Duration) {
    match tokio::time::timeout(limit, session.leave()).await {
        Ok(Ok(())) => debug!(session_id = session.session_id(), "Background leave done"),
        Ok(Err(e)) => debug!(error = %e, "Background leave failed"),
        Err(_) => debug!("Background leave timed out"),
    }
}
