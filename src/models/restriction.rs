// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-guild command channel allow-list.
//!
//! A guild starts unrestricted. Allowing the first channel switches it to
//! restricted mode, and it stays restricted (even with an empty list) until
//! it is explicitly cleared.

use serde::{Deserialize, Serialize};

/// Command channel restrictions for one guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildRestriction {
    /// Discord guild ID (also used as document ID)
    pub guild_id: String,
    #[serde(default)]
    pub restricted: bool,
    #[serde(default)]
    pub allowed_channel_ids: Vec<String>,
}

impl GuildRestriction {
    /// Unrestricted state for a guild with no stored document.
    pub fn unrestricted(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            restricted: false,
            allowed_channel_ids: Vec::new(),
        }
    }

    /// Whether a command may run in `channel_id`.
    pub fn permits(&self, channel_id: &str) -> bool {
        !self.restricted || self.allowed_channel_ids.iter().any(|c| c == channel_id)
    }

    /// Add a channel to the allow-list. Returns `false` if already present.
    pub fn allow(&mut self, channel_id: &str) -> bool {
        self.restricted = true;
        if self.allowed_channel_ids.iter().any(|c| c == channel_id) {
            return false;
        }
        self.allowed_channel_ids.push(channel_id.to_string());
        true
    }

    /// Remove a channel. The guild stays restricted even when the list empties.
    pub fn disallow(&mut self, channel_id: &str) -> bool {
        let before = self.allowed_channel_ids.len();
        self.allowed_channel_ids.retain(|c| c != channel_id);
        self.allowed_channel_ids.len() != before
    }

    pub fn clear(&mut self) {
        self.restricted = false;
        self.allowed_channel_ids.clear();
    }
}
