// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trophy model for storage and notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trophy grade, ordered from most common to rarest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrophyRank {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl TrophyRank {
    /// The top rank, which gets its own notification per trophy.
    pub const TOP: TrophyRank = TrophyRank::Platinum;

    pub fn is_top(self) -> bool {
        self == Self::TOP
    }

    /// Emoji prefix used in messages.
    pub fn emoji(self) -> &'static str {
        match self {
            TrophyRank::Bronze => "🥉",
            TrophyRank::Silver => "🥈",
            TrophyRank::Gold => "🥇",
            TrophyRank::Platinum => "🏆",
        }
    }
}

/// A trophy as reported by the trophy API, before it is attached to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarnedTrophy {
    pub trophy_id: u32,
    pub name: String,
    pub description: String,
    pub rank: TrophyRank,
    pub icon_url: Option<String>,
    /// NP communication ID of the game
    pub game_id: String,
    pub game_name: String,
    pub earned_at: DateTime<Utc>,
}

/// Stored trophy record in Firestore.
///
/// Identity is `(user_id, trophy_id, game_id)`; see [`TrophyKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trophy {
    /// Discord user ID (owner)
    pub user_id: String,
    pub trophy_id: u32,
    pub name: String,
    pub description: String,
    pub rank: TrophyRank,
    pub icon_url: Option<String>,
    pub game_id: String,
    pub game_name: String,
    pub earned_at: DateTime<Utc>,
    /// Derived from `rank`, stored for queries
    pub is_platinum: bool,
    /// Set once a notification was attempted
    #[serde(default)]
    pub notified: bool,
}

impl Trophy {
    /// Attach an API trophy to its owner.
    pub fn from_earned(user_id: &str, earned: EarnedTrophy) -> Self {
        Self {
            user_id: user_id.to_string(),
            trophy_id: earned.trophy_id,
            name: earned.name,
            description: earned.description,
            is_platinum: earned.rank.is_top(),
            rank: earned.rank,
            icon_url: earned.icon_url,
            game_id: earned.game_id,
            game_name: earned.game_name,
            earned_at: earned.earned_at,
            notified: false,
        }
    }

    pub fn key(&self) -> TrophyKey {
        TrophyKey {
            user_id: self.user_id.clone(),
            trophy_id: self.trophy_id,
            game_id: self.game_id.clone(),
        }
    }
}

/// Unique identity of a stored trophy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrophyKey {
    pub user_id: String,
    pub trophy_id: u32,
    pub game_id: String,
}

impl TrophyKey {
    /// Firestore document ID. Components are URL-encoded so a `:` inside an
    /// ID cannot collide with the separator.
    pub fn doc_id(&self) -> String {
        format!(
            "{}:{}:{}",
            urlencoding::encode(&self.user_id),
            urlencoding::encode(&self.game_id),
            self.trophy_id
        )
    }
}
