//! Inbound sync.
//!
//! Bridges a session's player add/change/remove events into the
//! [`RemotePlayers`] registry.
//!
//! Goals:
//! - Never let the local session's own id into the registry
//! - Drop malformed payloads whole, never apply half of one
//! - Start every attach from an empty registry plus one bulk reconcile
//! - Apply events in delivery order, on the tick owner's schedule

use plaza_shared::{
    animation::AnimationName,
    math::{Euler, Vec3},
    net::PlayerState,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::{
    registry::{PlayerPatch, RemotePlayers},
    transport::{RoomEvent, RoomEventKind, Session, Subscription},
};

/// Why an inbound player payload was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("missing position")]
    MissingPosition,
    #[error("missing rotation")]
    MissingRotation,
    #[error("non-finite position")]
    NonFinitePosition,
    #[error("non-finite rotation")]
    NonFiniteRotation,
}

/// Validates a room payload and turns it into a registry patch.
///
/// Position and rotation are required. An animation name outside the known
/// set is left out of the patch so the entry keeps its previous clip.
pub fn patch_from_state(state: &PlayerState) -> Result<PlayerPatch, PayloadError> {
    let position: Vec3 = state.position.ok_or(PayloadError::MissingPosition)?;
    if !position.is_finite() {
        return Err(PayloadError::NonFinitePosition);
    }
    let rotation: Euler = state.rotation.ok_or(PayloadError::MissingRotation)?.into();
    if !rotation.is_finite() {
        return Err(PayloadError::NonFiniteRotation);
    }

    let mut patch = PlayerPatch::default()
        .with_position(position)
        .with_rotation(rotation);
    if let Some(username) = &state.username {
        patch = patch.with_username(username.clone());
    }
    if let Some(name) = &state.animation {
        match name.parse::<AnimationName>() {
            Ok(animation) => patch = patch.with_animation(animation),
            Err(e) => debug!(error = %e, "Ignoring animation"),
        }
    }
    if let Some(avatar) = &state.avatar {
        patch = patch.with_avatar(avatar.clone());
    }
    Ok(patch)
}

/// Listener bundle for one attached session.
pub struct InboundSync {
    tx: mpsc::UnboundedSender<RoomEvent>,
    rx: mpsc::UnboundedReceiver<RoomEvent>,
    subscriptions: Vec<Subscription>,
    local_session_id: String,
}

impl Default for InboundSync {
    fn default() -> Self {
        Self::new()
    }
}

impl InboundSync {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            subscriptions: Vec::new(),
            local_session_id: String::new(),
        }
    }

    pub fn is_attached(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Subscribes to `session` and reconciles players that were already in
    /// the room. Any previous attachment is torn down first.
    pub fn attach(&mut self, session: &dyn Session, registry: &mut RemotePlayers) {
        self.detach(registry);
        self.local_session_id = session.session_id().to_string();

        for kind in [
            RoomEventKind::PlayerAdded,
            RoomEventKind::PlayerChanged,
            RoomEventKind::PlayerRemoved,
        ] {
            self.subscriptions
                .push(session.subscribe(kind, self.tx.clone()));
        }

        let mut reconciled = 0usize;
        for (key, state) in session.players() {
            if self.apply_state(&key, &state, registry) {
                reconciled += 1;
            }
        }
        debug!(
            session_id = %self.local_session_id,
            reconciled,
            "Inbound sync attached"
        );
    }

    /// Unsubscribes, discards queued events and clears the registry.
    pub fn detach(&mut self, registry: &mut RemotePlayers) {
        for mut sub in self.subscriptions.drain(..) {
            sub.unsubscribe();
        }
        while self.rx.try_recv().is_ok() {}
        self.local_session_id.clear();
        registry.clear();
    }

    /// Applies every queued event. Returns how many were processed.
    pub fn pump(&mut self, registry: &mut RemotePlayers) -> usize {
        let mut n = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.handle(event, registry);
            n += 1;
        }
        n
    }

    /// Applies one event to the registry.
    pub fn handle(&self, event: RoomEvent, registry: &mut RemotePlayers) {
        match event {
            RoomEvent::PlayerAdded { key, state } | RoomEvent::PlayerChanged { key, state } => {
                self.apply_state(&key, &state, registry);
            }
            RoomEvent::PlayerRemoved { key } => {
                if self.is_local(&key) {
                    return;
                }
                if registry.remove(&key).is_some() {
                    debug!(key = %key, "Remote player removed");
                }
            }
            RoomEvent::Error { .. } | RoomEvent::Left { .. } => {}
        }
    }

    fn is_local(&self, key: &str) -> bool {
        !self.local_session_id.is_empty() && key == self.local_session_id
    }

    fn apply_state(&self, key: &str, state: &PlayerState, registry: &mut RemotePlayers) -> bool {
        if self.is_local(key) {
            trace!(key, "Ignoring echo of local player");
            return false;
        }
        match patch_from_state(state) {
            Ok(patch) => {
                registry.upsert(key, patch);
                true
            }
            Err(e) => {
                warn!(key, error = %e, "Dropping malformed player payload");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{LoopbackRoom, LoopbackTransport, Transport};
    use plaza_shared::net::JoinOptions;

    fn state_at(x: f32) -> PlayerState {
        PlayerState::full(
            "bot",
            Vec3::new(x, 0.0, 0.0),
            Euler::IDENTITY,
            AnimationName::Walk,
        )
    }

    #[test]
    fn payload_requires_geometry() {
        let mut state = state_at(1.0);
        state.position = None;
        assert_eq!(patch_from_state(&state), Err(PayloadError::MissingPosition));

        let mut state = state_at(1.0);
        state.rotation = None;
        assert_eq!(patch_from_state(&state), Err(PayloadError::MissingRotation));

        let mut state = state_at(1.0);
        state.position = Some(Vec3::new(f32::NAN, 0.0, 0.0));
        assert_eq!(
            patch_from_state(&state),
            Err(PayloadError::NonFinitePosition)
        );

        let mut state = state_at(1.0);
        state.rotation = Some(Vec3::new(0.0, f32::INFINITY, 0.0));
        assert_eq!(
            patch_from_state(&state),
            Err(PayloadError::NonFiniteRotation)
        );
    }

    #[test]
    fn unknown_animation_keeps_previous() {
        let mut reg = RemotePlayers::new();
        let sync = InboundSync::new();
        sync.handle(
            RoomEvent::PlayerAdded {
                key: "p1".into(),
                state: state_at(0.0),
            },
            &mut reg,
        );
        let mut odd = state_at(2.0);
        odd.animation = Some("moonwalk".into());
        sync.handle(
            RoomEvent::PlayerChanged {
                key: "p1".into(),
                state: odd,
            },
            &mut reg,
        );
        let entry = reg.get("p1").unwrap();
        assert_eq!(entry.animation, AnimationName::Walk);
        assert_eq!(entry.position, Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn malformed_change_is_not_applied() {
        let mut reg = RemotePlayers::new();
        let sync = InboundSync::new();
        sync.handle(
            RoomEvent::PlayerAdded {
                key: "p1".into(),
                state: state_at(3.0),
            },
            &mut reg,
        );
        sync.handle(
            RoomEvent::PlayerChanged {
                key: "p1".into(),
                state: PlayerState {
                    username: Some("renamed".into()),
                    rotation: Some(Vec3::ZERO),
                    ..PlayerState::default()
                },
            },
            &mut reg,
        );
        let entry = reg.get("p1").unwrap();
        assert_eq!(entry.username, "bot");
        assert_eq!(entry.position, Vec3::new(3.0, 0.0, 0.0));
    }

    #[tokio::test]
    async fn attach_reconciles_and_filters_self() -> anyhow::Result<()> {
        let room = LoopbackRoom::new("r");
        room.add_player("bot-a", state_at(1.0));
        room.add_player("bot-b", state_at(2.0));
        let transport = LoopbackTransport::new(room.clone());
        let session = transport
            .connect("loopback", "r", &JoinOptions::default())
            .await?;

        let mut reg = RemotePlayers::new();
        let mut sync = InboundSync::new();
        sync.attach(session.as_ref(), &mut reg);
        assert!(sync.is_attached());
        assert_eq!(reg.len(), 2);
        assert!(!reg.contains(session.session_id()));

        // Our own moves echo back as changes for our id.
        session.send(plaza_shared::net::ClientMessage::Move(
            plaza_shared::net::MoveData {
                position: Vec3::new(9.0, 0.0, 0.0),
                rotation: Euler::IDENTITY,
                animation: AnimationName::Run,
            },
        ))?;
        room.update_player("bot-a", state_at(5.0));
        room.remove_player("bot-b");
        assert_eq!(sync.pump(&mut reg), 3);

        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("bot-a").unwrap().position, Vec3::new(5.0, 0.0, 0.0));
        assert!(!reg.contains(session.session_id()));
        Ok(())
    }

    #[tokio::test]
    async fn detach_clears_and_stops_listening() -> anyhow::Result<()> {
        let room = LoopbackRoom::new("r");
        room.add_player("bot", state_at(1.0));
        let transport = LoopbackTransport::new(room.clone());
        let session = transport
            .connect("loopback", "r", &JoinOptions::default())
            .await?;

        let mut reg = RemotePlayers::new();
        let mut sync = InboundSync::new();
        sync.attach(session.as_ref(), &mut reg);
        room.update_player("bot", state_at(2.0));
        sync.detach(&mut reg);
        assert!(reg.is_empty());
        assert!(!sync.is_attached());

        room.add_player("late", state_at(3.0));
        assert_eq!(sync.pump(&mut reg), 0);
        assert!(reg.is_empty());
        Ok(())
    }
}
