// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user notification preferences.

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Notification preferences, keyed by Discord user ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub user_id: String,
    /// Send one message per platinum trophy
    #[serde(default = "default_true")]
    pub notify_platinum: bool,
    /// Send a batched summary for every other rank
    #[serde(default = "default_true")]
    pub notify_others: bool,
    /// Destination channel; `None` means nothing is delivered
    #[serde(default)]
    pub channel_id: Option<String>,
}

impl NotificationSettings {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            notify_platinum: true,
            notify_others: true,
            channel_id: None,
        }
    }
}
