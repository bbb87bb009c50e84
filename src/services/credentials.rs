// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential lifecycle for PSN access tokens.
//!
//! The manager answers one question for the sync engine: "which access token
//! should this check use, if any?" It never returns an error; every failure
//! is logged and reported as "no usable credential".

use crate::db::TrackerStore;
use crate::error::AppError;
use crate::models::{User, UserTokens};
use crate::services::kms::{open_access_token, open_refresh_token, seal_tokens, KmsService};
use crate::services::psn::TrophyApi;
use crate::services::user_locks::UserLocks;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Cached access token with expiry information.
#[derive(Clone)]
pub struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Shared token cache, keyed by Discord user ID.
pub type TokenCache = Arc<DashMap<String, CachedToken>>;

/// Validates and refreshes per-user PSN credentials.
///
/// This service encapsulates:
/// - Decryption of stored tokens
/// - Refresh when the access token expires within the safety margin
/// - Re-encryption and storage of refreshed tokens
/// - In-memory caching of decrypted access tokens
/// - Per-user locking so concurrent callers share one refresh
#[derive(Clone)]
pub struct CredentialManager {
    api: Arc<dyn TrophyApi>,
    store: Arc<dyn TrackerStore>,
    kms: KmsService,
    token_cache: TokenCache,
    refresh_locks: UserLocks,
}

impl CredentialManager {
    pub fn new(api: Arc<dyn TrophyApi>, store: Arc<dyn TrackerStore>, kms: KmsService) -> Self {
        Self {
            api,
            store,
            kms,
            token_cache: Arc::new(DashMap::new()),
            refresh_locks: UserLocks::new(),
        }
    }

    /// Return a usable access token for `user`, refreshing it if needed.
    ///
    /// `None` means the user has no credentials, the refresh failed, or the
    /// stored bundle could not be read. The caller should skip the user.
    pub async fn ensure_valid_credential(&self, user: &User) -> Option<String> {
        if user.tokens.is_none() {
            return None;
        }

        match self.resolve(user).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(
                    user_id = %user.user_id,
                    error = %e,
                    "Could not obtain a valid credential"
                );
                None
            }
        }
    }

    /// Drop a cached token, e.g. after the API rejected it.
    pub fn invalidate(&self, user_id: &str) {
        self.token_cache.remove(user_id);
    }

    /// Store a newly linked bundle, or remove the bundle with `None`.
    ///
    /// Holds the user's refresh lock, so an in-flight refresh finishes first
    /// and cannot overwrite the new bundle.
    pub async fn replace(
        &self,
        user_id: &str,
        tokens: Option<&UserTokens>,
    ) -> Result<(), AppError> {
        self.refresh_locks
            .run(user_id, async {
                match tokens {
                    Some(tokens) => self.store.set_tokens(user_id, tokens).await?,
                    None => self.store.clear_tokens(user_id).await?,
                }
                self.invalidate(user_id);
                Ok::<(), AppError>(())
            })
            .await
    }

    /// Users with a live refresh lock entry.
    pub fn refresh_lock_count(&self) -> usize {
        self.refresh_locks.len()
    }

    async fn resolve(&self, user: &User) -> Result<Option<String>, AppError> {
        let user_id = user.user_id.as_str();

        if let Some(token) = self.cached(user_id) {
            return Ok(Some(token));
        }

        self.refresh_locks
            .run(user_id, self.resolve_locked(user))
            .await
    }

    async fn resolve_locked(&self, user: &User) -> Result<Option<String>, AppError> {
        let user_id = user.user_id.as_str();

        // Another task may have refreshed while we were waiting.
        if let Some(token) = self.cached(user_id) {
            return Ok(Some(token));
        }

        // Re-read the bundle: the caller's copy may predate a refresh.
        let tokens = match self.store.get_user(user_id).await? {
            Some(fresh) => fresh.tokens,
            None => user.tokens.clone(),
        };
        let Some(tokens) = tokens else {
            return Ok(None);
        };

        let access_token = open_access_token(&self.kms, user_id, &tokens).await?;

        if self.api.is_token_valid(&access_token, tokens.expires_at) {
            self.cache(user_id, &access_token, tokens.expires_at);
            return Ok(Some(access_token));
        }

        let Some(refresh_token) = open_refresh_token(&self.kms, user_id, &tokens).await? else {
            tracing::info!(
                user_id,
                "Access token expired and no refresh token stored"
            );
            return Ok(None);
        };

        tracing::info!(user_id, "Access token expired, refreshing");

        let refreshed = match self.api.refresh_token(&refresh_token).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Token refresh failed");
                return Ok(None);
            }
        };

        // Keep the old refresh token when the provider does not rotate it.
        let next_refresh = refreshed.refresh_token.as_deref().unwrap_or(&refresh_token);

        let sealed = seal_tokens(
            &self.kms,
            user_id,
            &refreshed.access_token,
            Some(next_refresh),
            refreshed.expires_at,
        )
        .await?;

        self.store.set_tokens(user_id, &sealed).await?;
        self.cache(user_id, &refreshed.access_token, refreshed.expires_at);

        tracing::info!(user_id, "Token refreshed and cached");
        Ok(Some(refreshed.access_token))
    }

    fn cached(&self, user_id: &str) -> Option<String> {
        let cached = self.token_cache.get(user_id)?;
        if self.api.is_token_valid(&cached.access_token, cached.expires_at) {
            Some(cached.access_token.clone())
        } else {
            None
        }
    }

    fn cache(&self, user_id: &str, access_token: &str, expires_at: DateTime<Utc>) {
        self.token_cache.insert(
            user_id.to_string(),
            CachedToken {
                access_token: access_token.to_string(),
                expires_at,
            },
        );
    }
}
