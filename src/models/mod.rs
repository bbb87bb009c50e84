// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod restriction;
pub mod settings;
pub mod trophy;
pub mod user;

pub use restriction::GuildRestriction;
pub use settings::NotificationSettings;
pub use trophy::{EarnedTrophy, Trophy, TrophyKey, TrophyRank};
pub use user::{User, UserTokens};
