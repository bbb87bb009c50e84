// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User model for storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time_utils::epoch;

/// Tracked user stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Discord user ID (also used as document ID)
    pub user_id: String,
    /// Linked PSN account ID
    #[serde(default)]
    pub account_id: Option<String>,
    /// PSN online ID shown in messages
    #[serde(default)]
    pub online_id: Option<String>,
    /// Encrypted credential bundle; absent for public-data-only links
    #[serde(default)]
    pub tokens: Option<UserTokens>,
    /// Whether scheduled checks and notifications are on
    #[serde(default)]
    pub notifications_enabled: bool,
    /// Watermark: trophies earned at or before this instant are already known
    #[serde(default = "epoch")]
    pub last_checked_at: DateTime<Utc>,
    /// When the account was first linked
    pub created_at: DateTime<Utc>,
}

impl User {
    /// A freshly linked user with the watermark at the epoch.
    pub fn new(user_id: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            account_id: Some(account_id.into()),
            online_id: None,
            tokens: None,
            notifications_enabled: true,
            last_checked_at: epoch(),
            created_at: Utc::now(),
        }
    }

    /// Name used in notifications: the online ID if known, else a mention.
    pub fn display_name(&self) -> String {
        match &self.online_id {
            Some(name) => name.clone(),
            None => format!("<@{}>", self.user_id),
        }
    }
}

/// User's PSN OAuth tokens (encrypted in Firestore).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTokens {
    /// Encrypted access token (base64)
    pub access_token_encrypted: String,
    /// Encrypted refresh token (base64), if the link produced one
    #[serde(default)]
    pub refresh_token_encrypted: Option<String>,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
}
