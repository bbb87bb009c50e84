// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! Services depend on [`TrackerStore`] so the Firestore backend can be swapped
//! for the in-memory one (local runs, tests).

pub mod firestore;
pub mod memory;

pub use self::firestore::FirestoreDb;
pub use memory::InMemoryStore;

use crate::error::Result;
use crate::models::{GuildRestriction, NotificationSettings, Trophy, TrophyKey, User, UserTokens};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const TROPHIES: &str = "trophies";
    pub const NOTIFICATION_SETTINGS: &str = "notification_settings";
    pub const GUILD_RESTRICTIONS: &str = "guild_restrictions";
}

/// Persistence operations used by the sync pipeline and command layer.
#[async_trait]
pub trait TrackerStore: Send + Sync {
    // ─── Users ───────────────────────────────────────────────────

    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    /// Write a whole user document. Only used to create a user.
    async fn upsert_user(&self, user: &User) -> Result<()>;

    /// Replace only the linked account and display name of a user.
    async fn set_link(
        &self,
        user_id: &str,
        account_id: &str,
        online_id: Option<&str>,
    ) -> Result<()>;

    /// Replace only the notification toggle of a user.
    async fn set_notifications_enabled(&self, user_id: &str, enabled: bool) -> Result<()>;

    /// Users with notifications enabled and a linked account.
    async fn list_sync_candidates(&self) -> Result<Vec<User>>;

    /// Replace only the credential bundle of a user.
    async fn set_tokens(&self, user_id: &str, tokens: &UserTokens) -> Result<()>;

    /// Remove the credential bundle of a user.
    async fn clear_tokens(&self, user_id: &str) -> Result<()>;

    /// Replace only the watermark of a user.
    async fn set_last_checked(&self, user_id: &str, checked_at: DateTime<Utc>) -> Result<()>;

    // ─── Trophies ────────────────────────────────────────────────

    /// Insert a trophy unless one with the same key exists.
    ///
    /// Returns `true` if the trophy was new. A duplicate is not an error.
    async fn insert_trophy(&self, trophy: &Trophy) -> Result<bool>;

    async fn mark_notified(&self, keys: &[TrophyKey]) -> Result<()>;

    // ─── Settings ────────────────────────────────────────────────

    async fn get_settings(&self, user_id: &str) -> Result<Option<NotificationSettings>>;

    async fn set_settings(&self, settings: &NotificationSettings) -> Result<()>;

    // ─── Guild restrictions ──────────────────────────────────────

    async fn get_restriction(&self, guild_id: &str) -> Result<Option<GuildRestriction>>;

    async fn set_restriction(&self, restriction: &GuildRestriction) -> Result<()>;
}
