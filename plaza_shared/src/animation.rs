//! Animation names shared by the local player, remote players and the wire.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The fixed set of character animation clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum AnimationName {
    #[default]
    Idle,
    Walk,
    Run,
    JumpUp,
    JumpLoop,
    JumpDown,
    JumpForward,
}

impl AnimationName {
    pub const ALL: [AnimationName; 7] = [
        AnimationName::Idle,
        AnimationName::Walk,
        AnimationName::Run,
        AnimationName::JumpUp,
        AnimationName::JumpLoop,
        AnimationName::JumpDown,
        AnimationName::JumpForward,
    ];

    /// Wire name of the clip.
    pub fn as_str(self) -> &'static str {
        match self {
            AnimationName::Idle => "idle",
            AnimationName::Walk => "walk",
            AnimationName::Run => "run",
            AnimationName::JumpUp => "jumpUp",
            AnimationName::JumpLoop => "jumpLoop",
            AnimationName::JumpDown => "jumpDown",
            AnimationName::JumpForward => "jumpForward",
        }
    }

    /// Resolves an optional action name, falling back to idle.
    pub fn from_action(name: Option<&str>) -> Self {
        name.and_then(|n| n.parse().ok()).unwrap_or_default()
    }
}

impl fmt::Display for AnimationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the seven clip names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown animation name: {0:?}")]
pub struct UnknownAnimation(pub String);

impl FromStr for AnimationName {
    type Err = UnknownAnimation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnimationName::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownAnimation(s.to_string()))
    }
}
