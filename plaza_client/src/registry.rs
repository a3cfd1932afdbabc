//! Remote player registry.
//!
//! The in-memory set of every other player's most recent raw network state,
//! keyed by session id. Entries hold raw targets; smoothing happens later on
//! the render path.
//!
//! The collection sits behind an `Arc` and is copied on write, so a snapshot
//! taken for rendering never changes under the reader even if events for the
//! same tick are applied afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use plaza_shared::{
    animation::AnimationName,
    math::{Euler, Vec3},
};

/// Default display name for players that have not set one.
pub const DEFAULT_USERNAME: &str = "Player";

/// Last-known state of one remote player.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayerEntry {
    pub session_id: String,
    pub username: String,
    pub position: Vec3,
    pub rotation: Euler,
    pub animation: AnimationName,
    pub avatar: Option<String>,
}

impl RemotePlayerEntry {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            username: DEFAULT_USERNAME.to_string(),
            position: Vec3::ZERO,
            rotation: Euler::IDENTITY,
            animation: AnimationName::Idle,
            avatar: None,
        }
    }
}

/// Partial update for a remote player. `None` fields keep their value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerPatch {
    pub username: Option<String>,
    pub position: Option<Vec3>,
    pub rotation: Option<Euler>,
    pub animation: Option<AnimationName>,
    pub avatar: Option<String>,
}

impl PlayerPatch {
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_rotation(mut self, rotation: Euler) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn with_animation(mut self, animation: AnimationName) -> Self {
        self.animation = Some(animation);
        self
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    /// Writes every supplied field over `entry`.
    pub fn merge_into(self, entry: &mut RemotePlayerEntry) {
        if let Some(username) = self.username {
            entry.username = username;
        }
        if let Some(position) = self.position {
            entry.position = position;
        }
        if let Some(rotation) = self.rotation {
            entry.rotation = rotation;
        }
        if let Some(animation) = self.animation {
            entry.animation = animation;
        }
        if let Some(avatar) = self.avatar {
            entry.avatar = Some(avatar);
        }
    }
}

/// Read-only view of the registry for one tick.
pub type RegistrySnapshot = Arc<BTreeMap<String, RemotePlayerEntry>>;

/// Keyed collection of remote players.
#[derive(Debug, Clone, Default)]
pub struct RemotePlayers {
    players: RegistrySnapshot,
}

impl RemotePlayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a defaulted entry for an unseen id, then merges `patch` over
    /// it.
    pub fn upsert(&mut self, session_id: &str, patch: PlayerPatch) {
        let players = Arc::make_mut(&mut self.players);
        let entry = players
            .entry(session_id.to_string())
            .or_insert_with(|| RemotePlayerEntry::new(session_id));
        patch.merge_into(entry);
    }

    /// Removes an entry. Unknown ids are a no-op.
    pub fn remove(&mut self, session_id: &str) -> Option<RemotePlayerEntry> {
        if !self.players.contains_key(session_id) {
            return None;
        }
        Arc::make_mut(&mut self.players).remove(session_id)
    }

    /// Drops every entry. Outstanding snapshots keep their contents.
    pub fn clear(&mut self) {
        self.players = RegistrySnapshot::default();
    }

    pub fn get(&self, session_id: &str) -> Option<&RemotePlayerEntry> {
        self.players.get(session_id)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.players.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Stable view for the current tick, in key order.
    pub fn snapshot(&self) -> RegistrySnapshot {
        Arc::clone(&self.players)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemotePlayerEntry> {
        self.players.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_patch() -> PlayerPatch {
        PlayerPatch::default()
            .with_username("ann")
            .with_position(Vec3::new(1.0, 2.0, 3.0))
            .with_rotation(Euler::new(0.0, 1.5, 0.0))
            .with_animation(AnimationName::Walk)
    }

    #[test]
    fn upsert_then_remove_leaves_empty() {
        let mut reg = RemotePlayers::new();
        reg.upsert("p1", full_patch());
        assert_eq!(reg.len(), 1);
        assert!(reg.remove("p1").is_some());
        assert!(reg.is_empty());
    }

    #[test]
    fn remove_unknown_or_twice_is_noop() {
        let mut reg = RemotePlayers::new();
        reg.upsert("p1", full_patch());
        assert!(reg.remove("ghost").is_none());
        assert_eq!(reg.len(), 1);
        reg.remove("p1");
        assert!(reg.remove("p1").is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn partial_upsert_preserves_other_fields() {
        let mut reg = RemotePlayers::new();
        reg.upsert("p1", full_patch());
        reg.upsert("p1", PlayerPatch::default().with_animation(AnimationName::Run));

        let entry = reg.get("p1").unwrap();
        assert_eq!(entry.animation, AnimationName::Run);
        assert_eq!(entry.username, "ann");
        assert_eq!(entry.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(entry.rotation, Euler::new(0.0, 1.5, 0.0));
    }

    #[test]
    fn unseen_id_gets_defaults() {
        let mut reg = RemotePlayers::new();
        reg.upsert("p2", PlayerPatch::default().with_position(Vec3::new(4.0, 0.0, 0.0)));
        let entry = reg.get("p2").unwrap();
        assert_eq!(entry.username, DEFAULT_USERNAME);
        assert_eq!(entry.rotation, Euler::IDENTITY);
        assert_eq!(entry.animation, AnimationName::Idle);
        assert_eq!(entry.position, Vec3::new(4.0, 0.0, 0.0));
    }

    #[test]
    fn snapshot_is_stable_across_mutation() {
        let mut reg = RemotePlayers::new();
        reg.upsert("a", full_patch());
        reg.upsert("b", full_patch());
        let snap = reg.snapshot();

        reg.remove("a");
        reg.upsert("c", full_patch());
        reg.upsert("b", PlayerPatch::default().with_animation(AnimationName::JumpUp));
        reg.clear();

        let keys: Vec<&str> = snap.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(snap["b"].animation, AnimationName::Walk);
        assert!(reg.is_empty());
    }
}
