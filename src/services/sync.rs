// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trophy sync engine.
//!
//! A check for one user:
//! 1. Skip if the user is not linked (or has no credentials when they are required)
//! 2. Resolve an access token
//! 3. Fetch recently earned trophies, bounded by a timeout
//! 4. Keep trophies earned after the user's watermark
//! 5. Store them (duplicates are ignored)
//! 6. Notify if anything new was stored
//! 7. Advance the watermark
//!
//! A failed fetch still advances the watermark. A failed write does not.

use crate::config::{Config, DataSourceMode};
use crate::db::TrackerStore;
use crate::error::Result;
use crate::models::{Trophy, User, UserTokens};
use crate::services::credentials::CredentialManager;
use crate::services::notifier::{DispatchReport, NotificationDispatcher};
use crate::services::psn::TrophyApi;
use crate::services::user_locks::UserLocks;
use crate::time_utils::{advance_watermark, format_utc_rfc3339};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Tunables for a sync run.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub fetch_limit: u32,
    pub fetch_timeout: Duration,
    /// Pause between consecutive users in `sync_all`
    pub user_delay: Duration,
    pub mode: DataSourceMode,
    /// Token used in public mode when a user has no usable credential
    pub public_token: Option<String>,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fetch_limit: config.fetch_limit,
            fetch_timeout: config.fetch_timeout,
            user_delay: config.user_delay,
            mode: config.data_source_mode,
            public_token: config.psn_public_token.clone(),
        }
    }
}

/// Why a user was not checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No linked account, or the user no longer exists.
    NotLinked,
    /// No usable access token.
    NoCredential,
}

/// Result of checking one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserSyncOutcome {
    Skipped(SkipReason),
    Checked {
        /// Trophies returned by the API (zero if the fetch failed)
        fetched: usize,
        /// Trophies stored for the first time
        new_trophies: usize,
        notifications: Option<DispatchReport>,
    },
}

/// Summary of a `sync_all` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Another run was in flight; nothing was done.
    pub already_running: bool,
    pub candidates: usize,
    pub checked: usize,
    pub skipped: usize,
    pub failed: usize,
    pub new_trophies: usize,
}

impl SyncReport {
    pub fn already_running() -> Self {
        Self {
            already_running: true,
            ..Default::default()
        }
    }
}

/// Clears the running flag when a run ends, including when it is dropped.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Polls the trophy API for every eligible user and records new trophies.
pub struct SyncEngine {
    store: Arc<dyn TrackerStore>,
    api: Arc<dyn TrophyApi>,
    credentials: CredentialManager,
    notifier: NotificationDispatcher,
    settings: SyncSettings,
    running: AtomicBool,
    user_locks: UserLocks,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn TrackerStore>,
        api: Arc<dyn TrophyApi>,
        credentials: CredentialManager,
        notifier: NotificationDispatcher,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            api,
            credentials,
            notifier,
            settings,
            running: AtomicBool::new(false),
            user_locks: UserLocks::new(),
        }
    }

    /// Install a freshly linked credential bundle, or remove it with `None`.
    pub async fn replace_credential(
        &self,
        user_id: &str,
        tokens: Option<&UserTokens>,
    ) -> Result<()> {
        self.credentials.replace(user_id, tokens).await
    }

    /// Users with a live per-user lock entry.
    pub fn user_lock_count(&self) -> usize {
        self.user_locks.len()
    }

    /// Whether a `sync_all` run is in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Check every eligible user, one at a time.
    ///
    /// Per-user failures are logged and counted. If another run is already
    /// in flight this returns immediately.
    pub async fn sync_all(&self) -> SyncReport {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            tracing::warn!("Sync run already in progress, skipping");
            return SyncReport::already_running();
        };

        let users = match self.store.list_sync_candidates().await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load sync candidates");
                return SyncReport::default();
            }
        };

        let mut report = SyncReport {
            candidates: users.len(),
            ..Default::default()
        };

        tracing::info!(users = users.len(), "Starting trophy sync");

        for (i, user) in users.iter().enumerate() {
            match self.sync_one(user).await {
                Ok(UserSyncOutcome::Checked { new_trophies, .. }) => {
                    report.checked += 1;
                    report.new_trophies += new_trophies;
                }
                Ok(UserSyncOutcome::Skipped(_)) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(user_id = %user.user_id, error = %e, "Trophy sync failed for user");
                }
            }

            if i + 1 < users.len() {
                tokio::time::sleep(self.settings.user_delay).await;
            }
        }

        tracing::info!(
            checked = report.checked,
            skipped = report.skipped,
            failed = report.failed,
            new_trophies = report.new_trophies,
            "Trophy sync complete"
        );

        report
    }

    /// Check one user.
    ///
    /// Returns `Err` only when a write to the store failed; in that case the
    /// watermark is left where it was.
    pub async fn sync_one(&self, user: &User) -> Result<UserSyncOutcome> {
        self.user_locks
            .run(&user.user_id, self.sync_one_locked(&user.user_id))
            .await
    }

    async fn sync_one_locked(&self, user_id: &str) -> Result<UserSyncOutcome> {
        // The caller's copy may be stale if another check just finished.
        let Some(user) = self.store.get_user(user_id).await? else {
            tracing::debug!(user_id, "User no longer exists, skipping");
            return Ok(UserSyncOutcome::Skipped(SkipReason::NotLinked));
        };
        let user_id = user.user_id.as_str();

        // 1. Required fields
        let Some(account_id) = user.account_id.as_deref() else {
            return Ok(UserSyncOutcome::Skipped(SkipReason::NotLinked));
        };
        if user.tokens.is_none() && self.settings.mode == DataSourceMode::Authenticated {
            return Ok(UserSyncOutcome::Skipped(SkipReason::NoCredential));
        }

        // 2. Credential
        let token = match self.credentials.ensure_valid_credential(&user).await {
            Some(token) => token,
            None => match (self.settings.mode, self.settings.public_token.as_ref()) {
                (DataSourceMode::Public, Some(token)) => token.clone(),
                _ => {
                    tracing::warn!(user_id, "No valid credential, skipping user");
                    return Ok(UserSyncOutcome::Skipped(SkipReason::NoCredential));
                }
            },
        };

        let checked_at = Utc::now();
        let watermark = user.last_checked_at;

        // 3. Fetch
        let fetch = self
            .api
            .fetch_recent_trophies(&token, account_id, self.settings.fetch_limit);
        let earned = match tokio::time::timeout(self.settings.fetch_timeout, fetch).await {
            Ok(Ok(earned)) => earned,
            Ok(Err(e)) => {
                if e.is_token_error() {
                    self.credentials.invalidate(user_id);
                }
                tracing::warn!(
                    user_id,
                    error = %e,
                    rate_limited = e.is_rate_limited(),
                    "Failed to fetch trophies"
                );
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    user_id,
                    timeout_secs = self.settings.fetch_timeout.as_secs(),
                    "Trophy fetch timed out"
                );
                Vec::new()
            }
        };
        let fetched = earned.len();

        // 4. Watermark filter
        let qualifying: Vec<Trophy> = earned
            .into_iter()
            .filter(|t| t.earned_at > watermark)
            .map(|t| Trophy::from_earned(user_id, t))
            .collect();

        // 5. Idempotent insert
        let mut new_trophies = 0;
        for trophy in &qualifying {
            if self.store.insert_trophy(trophy).await? {
                new_trophies += 1;
            }
        }

        // 6. Notify
        let notifications = if new_trophies > 0 && user.notifications_enabled {
            Some(self.notifier.dispatch(&user, &qualifying).await)
        } else {
            None
        };

        // 7. Watermark
        let next_watermark = advance_watermark(watermark, checked_at);
        self.store.set_last_checked(user_id, next_watermark).await?;

        tracing::info!(
            user_id,
            fetched,
            qualifying = qualifying.len(),
            new_trophies,
            watermark = %format_utc_rfc3339(next_watermark),
            "Checked user trophies"
        );

        Ok(UserSyncOutcome::Checked {
            fetched,
            new_trophies,
            notifications,
        })
    }
}
