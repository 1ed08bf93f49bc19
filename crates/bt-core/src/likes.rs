//! # Like Toggle
//!
//! Per (user, post) pair there are two states and one transition. Each
//! toggle flips the state exactly once; it is not a set-to-value call.
//! Adapters evaluate [`toggle`] inside the same transaction that inserts or
//! deletes the `Like` record, so the counter cannot drift from the set.

use serde::{Deserialize, Serialize};

use crate::counters;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeState {
    NotLiked,
    Liked,
}

impl LikeState {
    pub fn from_present(present: bool) -> Self {
        if present {
            Self::Liked
        } else {
            Self::NotLiked
        }
    }

    pub fn is_liked(self) -> bool {
        self == Self::Liked
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::NotLiked => Self::Liked,
            Self::Liked => Self::NotLiked,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeTransition {
    pub from: LikeState,
    pub to: LikeState,
}

impl LikeTransition {
    /// +1 when a like is created, -1 when one is removed.
    pub fn counter_delta(self) -> i64 {
        match (self.from, self.to) {
            (LikeState::NotLiked, LikeState::Liked) => 1,
            (LikeState::Liked, LikeState::NotLiked) => -1,
            _ => 0,
        }
    }

    /// The post's `likes_count` after this transition.
    pub fn apply_to(self, likes_count: u32) -> u32 {
        counters::adjust(likes_count, self.counter_delta())
    }
}

pub fn toggle(current: LikeState) -> LikeTransition {
    LikeTransition {
        from: current,
        to: current.toggled(),
    }
}

/// What the caller sees after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeOutcome {
    pub state: LikeState,
    pub likes_count: u32,
}
