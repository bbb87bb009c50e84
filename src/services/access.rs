// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-guild command channel restrictions.

use crate::db::TrackerStore;
use crate::error::Result;
use crate::models::GuildRestriction;
use std::sync::Arc;

/// Decides whether a command may run in a given channel.
#[derive(Clone)]
pub struct AccessGate {
    store: Arc<dyn TrackerStore>,
}

impl AccessGate {
    pub fn new(store: Arc<dyn TrackerStore>) -> Self {
        Self { store }
    }

    /// Whether commands may run in `channel_id`.
    ///
    /// Direct messages (no guild) are always allowed. If the restriction
    /// lookup fails the command is allowed.
    pub async fn is_allowed(&self, guild_id: Option<&str>, channel_id: &str) -> bool {
        let Some(guild_id) = guild_id else {
            return true;
        };

        match self.store.get_restriction(guild_id).await {
            Ok(Some(restriction)) => restriction.permits(channel_id),
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(
                    guild_id,
                    channel_id,
                    error = %e,
                    "Restriction lookup failed, allowing command"
                );
                true
            }
        }
    }

    /// Current restriction state; unrestricted if none is stored.
    pub async fn status(&self, guild_id: &str) -> Result<GuildRestriction> {
        Ok(self
            .store
            .get_restriction(guild_id)
            .await?
            .unwrap_or_else(|| GuildRestriction::unrestricted(guild_id)))
    }

    /// Allow-list a channel. The first one switches the guild to restricted.
    ///
    /// Returns `false` if the channel was already allowed.
    pub async fn allow_channel(&self, guild_id: &str, channel_id: &str) -> Result<bool> {
        let mut restriction = self.status(guild_id).await?;
        let added = restriction.allow(channel_id);
        self.store.set_restriction(&restriction).await?;

        tracing::info!(guild_id, channel_id, added, "Channel allowed for commands");
        Ok(added)
    }

    /// Remove a channel. The guild stays restricted even if none remain.
    ///
    /// Returns `false` if the channel was not on the list.
    pub async fn disallow_channel(&self, guild_id: &str, channel_id: &str) -> Result<bool> {
        let mut restriction = self.status(guild_id).await?;
        let removed = restriction.disallow(channel_id);
        if removed {
            self.store.set_restriction(&restriction).await?;
        }

        tracing::info!(guild_id, channel_id, removed, "Channel removed from allow-list");
        Ok(removed)
    }

    /// Drop all restrictions for a guild.
    pub async fn clear(&self, guild_id: &str) -> Result<()> {
        let mut restriction = self.status(guild_id).await?;
        restriction.clear();
        self.store.set_restriction(&restriction).await?;

        tracing::info!(guild_id, "Channel restrictions cleared");
        Ok(())
    }
}
