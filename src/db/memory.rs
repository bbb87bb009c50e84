// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Process-local store backed by `DashMap`.
//!
//! Used for `STORE_BACKEND=memory` runs and as the store in tests.

use crate::db::TrackerStore;
use crate::error::AppError;
use crate::models::{GuildRestriction, NotificationSettings, Trophy, TrophyKey, User, UserTokens};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory implementation of [`TrackerStore`].
///
/// Cloning shares the underlying maps.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    users: Arc<DashMap<String, User>>,
    trophies: Arc<DashMap<TrophyKey, Trophy>>,
    settings: Arc<DashMap<String, NotificationSettings>>,
    restrictions: Arc<DashMap<String, GuildRestriction>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored trophies for a user, oldest first.
    pub fn trophies_for(&self, user_id: &str) -> Vec<Trophy> {
        let mut trophies: Vec<Trophy> = self
            .trophies
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        trophies.sort_by_key(|t| t.earned_at);
        trophies
    }

    fn missing_user(user_id: &str) -> AppError {
        AppError::Database(format!("User {} does not exist", user_id))
    }
}

#[async_trait]
impl TrackerStore for InMemoryStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.get(user_id).map(|u| u.clone()))
    }

    async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn set_link(
        &self,
        user_id: &str,
        account_id: &str,
        online_id: Option<&str>,
    ) -> Result<(), AppError> {
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| Self::missing_user(user_id))?;
        user.account_id = Some(account_id.to_string());
        user.online_id = online_id.map(str::to_string);
        Ok(())
    }

    async fn set_notifications_enabled(
        &self,
        user_id: &str,
        enabled: bool,
    ) -> Result<(), AppError> {
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| Self::missing_user(user_id))?;
        user.notifications_enabled = enabled;
        Ok(())
    }

    async fn list_sync_candidates(&self) -> Result<Vec<User>, AppError> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|u| u.notifications_enabled && u.account_id.is_some())
            .map(|u| u.value().clone())
            .collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(users)
    }

    async fn set_tokens(&self, user_id: &str, tokens: &UserTokens) -> Result<(), AppError> {
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| Self::missing_user(user_id))?;
        user.tokens = Some(tokens.clone());
        Ok(())
    }

    async fn clear_tokens(&self, user_id: &str) -> Result<(), AppError> {
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| Self::missing_user(user_id))?;
        user.tokens = None;
        Ok(())
    }

    async fn set_last_checked(
        &self,
        user_id: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| Self::missing_user(user_id))?;
        user.last_checked_at = checked_at;
        Ok(())
    }

    async fn insert_trophy(&self, trophy: &Trophy) -> Result<bool, AppError> {
        match self.trophies.entry(trophy.key()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(trophy.clone());
                Ok(true)
            }
        }
    }

    async fn mark_notified(&self, keys: &[TrophyKey]) -> Result<(), AppError> {
        for key in keys {
            if let Some(mut trophy) = self.trophies.get_mut(key) {
                trophy.notified = true;
            }
        }
        Ok(())
    }

    async fn get_settings(&self, user_id: &str) -> Result<Option<NotificationSettings>, AppError> {
        Ok(self.settings.get(user_id).map(|s| s.clone()))
    }

    async fn set_settings(&self, settings: &NotificationSettings) -> Result<(), AppError> {
        self.settings
            .insert(settings.user_id.clone(), settings.clone());
        Ok(())
    }

    async fn get_restriction(&self, guild_id: &str) -> Result<Option<GuildRestriction>, AppError> {
        Ok(self.restrictions.get(guild_id).map(|r| r.clone()))
    }

    async fn set_restriction(&self, restriction: &GuildRestriction) -> Result<(), AppError> {
        self.restrictions
            .insert(restriction.guild_id.clone(), restriction.clone());
        Ok(())
    }
}
