//! Subscriber bookkeeping shared by the concrete transports.
//!
//! An [`EventHub`] belongs to one session. It mirrors the room's player set
//! (so a late listener can enumerate who is already there) and fans
//! published events out to the sinks subscribed to that event kind.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use plaza_shared::net::PlayerState;

use super::{EventSink, RoomEvent, RoomEventKind, Subscription};

#[derive(Default)]
struct HubInner {
    next_id: u64,
    subscribers: HashMap<u64, (RoomEventKind, EventSink)>,
    players: BTreeMap<String, PlayerState>,
}

/// Per-session event fan-out plus player mirror.
#[derive(Default)]
pub struct EventHub {
    inner: Arc<Mutex<HubInner>>,
}

fn lock(inner: &Mutex<HubInner>) -> MutexGuard<'_, HubInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Writes the supplied fields of `update` over `state`.
pub fn merge_player_state(state: &mut PlayerState, update: PlayerState) {
    if update.username.is_some() {
        state.username = update.username;
    }
    if update.position.is_some() {
        state.position = update.position;
    }
    if update.rotation.is_some() {
        state.rotation = update.rotation;
    }
    if update.animation.is_some() {
        state.animation = update.animation;
    }
    if update.avatar.is_some() {
        state.avatar = update.avatar;
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hub whose mirror starts from the room's join-time player list.
    pub fn with_players(players: impl IntoIterator<Item = (String, PlayerState)>) -> Self {
        let hub = Self::new();
        lock(&hub.inner).players.extend(players);
        hub
    }

    pub fn subscribe(&self, kind: RoomEventKind, sink: EventSink) -> Subscription {
        let id = {
            let mut inner = lock(&self.inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.insert(id, (kind, sink));
            id
        };
        let weak: Weak<Mutex<HubInner>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).subscribers.remove(&id);
            }
        })
    }

    /// Updates the mirror, then delivers `event` to matching subscribers.
    /// A change is delivered as the merged player, never the raw delta.
    /// Subscribers whose receiver is gone are dropped.
    pub fn publish(&self, event: RoomEvent) {
        let mut inner = lock(&self.inner);
        let event = match event {
            RoomEvent::PlayerAdded { key, state } => {
                inner.players.insert(key.clone(), state.clone());
                RoomEvent::PlayerAdded { key, state }
            }
            RoomEvent::PlayerChanged { key, state } => {
                let entry = inner.players.entry(key.clone()).or_default();
                merge_player_state(entry, state);
                RoomEvent::PlayerChanged {
                    key,
                    state: entry.clone(),
                }
            }
            RoomEvent::PlayerRemoved { key } => {
                inner.players.remove(&key);
                RoomEvent::PlayerRemoved { key }
            }
            other @ (RoomEvent::Error { .. } | RoomEvent::Left { .. }) => other,
        };

        let kind = event.kind();
        inner
            .subscribers
            .retain(|_, (k, sink)| *k != kind || sink.send(event.clone()).is_ok());
    }

    pub fn players(&self) -> Vec<(String, PlayerState)> {
        lock(&self.inner)
            .players
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }
}
