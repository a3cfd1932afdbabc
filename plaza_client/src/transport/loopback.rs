//! In-process room.
//!
//! [`LoopbackRoom`] plays the part of a room server inside the client
//! process: it assigns session ids, keeps the authoritative player set,
//! applies `Move`/`ChangeProfile` messages and broadcasts the resulting
//! events to every joined session, echoes included. Players that are not
//! backed by a session (bots) can be added and driven directly.
//!
//! It backs the binary's offline mode and the test suites, so it also
//! exposes knobs for the unhappy paths: rejected or stalled joins and
//! failing leave handshakes.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use plaza_shared::{
    animation::AnimationName,
    math::{Euler, Vec3},
    net::{ClientMessage, JoinOptions, PlayerState},
};
use tokio::sync::Notify;
use tracing::debug;

use super::{
    hub::merge_player_state, EventHub, EventSink, RoomEvent, RoomEventKind, Session,
    Subscription, Transport, CLOSE_CONSENTED,
};

/// How the room answers join requests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectMode {
    /// Join immediately.
    #[default]
    Accept,
    /// Fail the join with this message.
    Reject(String),
    /// Never answer.
    Stall,
    /// Wait for [`LoopbackRoom::release_pending`] before joining.
    AwaitRelease,
}

#[derive(Default)]
struct RoomInner {
    next_session: u64,
    players: BTreeMap<String, PlayerState>,
    sessions: HashMap<String, Arc<EventHub>>,
    sent: Vec<(String, ClientMessage)>,
    connect_calls: usize,
    connect_mode: ConnectMode,
    fail_leave: bool,
}

/// Shared handle to an in-process room.
#[derive(Clone)]
pub struct LoopbackRoom {
    name: Arc<str>,
    inner: Arc<Mutex<RoomInner>>,
    release: Arc<Notify>,
}

impl LoopbackRoom {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            inner: Arc::default(),
            release: Arc::new(Notify::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, RoomInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn broadcast(inner: &RoomInner, event: RoomEvent) {
        for hub in inner.sessions.values() {
            hub.publish(event.clone());
        }
    }

    pub fn set_connect_mode(&self, mode: ConnectMode) {
        self.lock().connect_mode = mode;
    }

    /// Lets one join waiting in [`ConnectMode::AwaitRelease`] proceed.
    pub fn release_pending(&self) {
        self.release.notify_one();
    }

    pub fn set_fail_leave(&self, fail: bool) {
        self.lock().fail_leave = fail;
    }

    /// Number of join requests seen so far, answered or not.
    pub fn connect_calls(&self) -> usize {
        self.lock().connect_calls
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Messages a session has sent, oldest first.
    pub fn messages_from(&self, session_id: &str) -> Vec<ClientMessage> {
        self.lock()
            .sent
            .iter()
            .filter(|(from, _)| from == session_id)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    pub fn player(&self, key: &str) -> Option<PlayerState> {
        self.lock().players.get(key).cloned()
    }

    /// Adds a player that is not backed by a session.
    pub fn add_player(&self, key: &str, state: PlayerState) {
        let mut inner = self.lock();
        inner.players.insert(key.to_string(), state.clone());
        Self::broadcast(
            &inner,
            RoomEvent::PlayerAdded {
                key: key.to_string(),
                state,
            },
        );
    }

    /// Merges `update` into a player and broadcasts the full new state.
    pub fn update_player(&self, key: &str, update: PlayerState) {
        let mut inner = self.lock();
        let Some(state) = inner.players.get_mut(key) else {
            debug!(key, "update for unknown loopback player");
            return;
        };
        merge_player_state(state, update);
        let state = state.clone();
        Self::broadcast(
            &inner,
            RoomEvent::PlayerChanged {
                key: key.to_string(),
                state,
            },
        );
    }

    /// Broadcasts a change event verbatim, without touching room state.
    pub fn push_raw_change(&self, key: &str, state: PlayerState) {
        let inner = self.lock();
        Self::broadcast(
            &inner,
            RoomEvent::PlayerChanged {
                key: key.to_string(),
                state,
            },
        );
    }

    pub fn remove_player(&self, key: &str) {
        let mut inner = self.lock();
        if inner.players.remove(key).is_some() {
            Self::broadcast(
                &inner,
                RoomEvent::PlayerRemoved {
                    key: key.to_string(),
                },
            );
        }
    }

    /// Reports a room error to one session.
    pub fn raise_error(&self, session_id: &str, code: i32, message: &str) {
        if let Some(hub) = self.lock().sessions.get(session_id) {
            hub.publish(RoomEvent::Error {
                code,
                message: message.to_string(),
            });
        }
    }

    /// Drops a session from the room as if the server closed it.
    pub fn kick(&self, session_id: &str, code: i32) {
        let mut inner = self.lock();
        if let Some(hub) = inner.sessions.remove(session_id) {
            hub.publish(RoomEvent::Left { code });
        }
        if inner.players.remove(session_id).is_some() {
            Self::broadcast(
                &inner,
                RoomEvent::PlayerRemoved {
                    key: session_id.to_string(),
                },
            );
        }
    }

    fn join(&self, options: &JoinOptions) -> Arc<LoopbackSession> {
        let mut inner = self.lock();
        inner.next_session += 1;
        let session_id = format!("s{}", inner.next_session);
        let state = PlayerState::full(
            options.username.as_deref().unwrap_or("Player"),
            Vec3::ZERO,
            Euler::IDENTITY,
            AnimationName::Idle,
        );
        inner.players.insert(session_id.clone(), state.clone());
        Self::broadcast(
            &inner,
            RoomEvent::PlayerAdded {
                key: session_id.clone(),
                state,
            },
        );

        let hub = Arc::new(EventHub::with_players(inner.players.clone()));
        inner.sessions.insert(session_id.clone(), Arc::clone(&hub));
        debug!(room = %self.name, session_id = %session_id, "loopback join");

        Arc::new(LoopbackSession {
            session_id,
            room: self.clone(),
            hub,
        })
    }

    fn apply(&self, session_id: &str, message: ClientMessage) -> anyhow::Result<()> {
        let mut inner = self.lock();
        if !inner.sessions.contains_key(session_id) {
            bail!("session {session_id} is not in the room");
        }
        inner.sent.push((session_id.to_string(), message.clone()));
        let update = match message {
            ClientMessage::Move(mv) => PlayerState {
                position: Some(mv.position),
                rotation: Some(mv.rotation.into()),
                animation: Some(mv.animation.as_str().to_string()),
                ..PlayerState::default()
            },
            ClientMessage::ChangeProfile(profile) => PlayerState {
                username: Some(profile.username),
                ..PlayerState::default()
            },
        };
        let state = inner.players.entry(session_id.to_string()).or_default();
        merge_player_state(state, update);
        let state = state.clone();
        Self::broadcast(
            &inner,
            RoomEvent::PlayerChanged {
                key: session_id.to_string(),
                state,
            },
        );
        Ok(())
    }

    fn leave(&self, session_id: &str) -> anyhow::Result<()> {
        let mut inner = self.lock();
        if inner.fail_leave {
            bail!("leave rejected by room");
        }
        if let Some(hub) = inner.sessions.remove(session_id) {
            hub.publish(RoomEvent::Left {
                code: CLOSE_CONSENTED,
            });
        }
        if inner.players.remove(session_id).is_some() {
            Self::broadcast(
                &inner,
                RoomEvent::PlayerRemoved {
                    key: session_id.to_string(),
                },
            );
        }
        Ok(())
    }
}

/// Session joined through a [`LoopbackTransport`].
pub struct LoopbackSession {
    session_id: String,
    room: LoopbackRoom,
    hub: Arc<EventHub>,
}

#[async_trait]
impl Session for LoopbackSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn send(&self, message: ClientMessage) -> anyhow::Result<()> {
        self.room.apply(&self.session_id, message)
    }

    fn players(&self) -> Vec<(String, PlayerState)> {
        self.hub.players()
    }

    fn subscribe(&self, kind: RoomEventKind, sink: EventSink) -> Subscription {
        self.hub.subscribe(kind, sink)
    }

    async fn leave(&self) -> anyhow::Result<()> {
        self.room.leave(&self.session_id)
    }
}

/// Transport that joins a [`LoopbackRoom`] by name.
#[derive(Clone)]
pub struct LoopbackTransport {
    room: LoopbackRoom,
}

impl LoopbackTransport {
    pub fn new(room: LoopbackRoom) -> Self {
        Self { room }
    }

    pub fn room(&self) -> &LoopbackRoom {
        &self.room
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(
        &self,
        _endpoint: &str,
        room: &str,
        options: &JoinOptions,
    ) -> anyhow::Result<Arc<dyn Session>> {
        let mode = {
            let mut inner = self.room.lock();
            inner.connect_calls += 1;
            inner.connect_mode.clone()
        };
        if room != self.room.name() {
            return Err(anyhow!("no room named {room:?}"));
        }
        match mode {
            ConnectMode::Accept => {}
            ConnectMode::Reject(message) => bail!(message),
            ConnectMode::Stall => std::future::pending::<()>().await,
            ConnectMode::AwaitRelease => self.room.release.notified().await,
        }
        let session: Arc<dyn Session> = self.room.join(options);
        Ok(session)
    }
}
