// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profile, encrypted tokens, watermark)
//! - Trophies (idempotent inserts keyed by user/game/trophy)
//! - Notification settings
//! - Guild command restrictions

use crate::db::{collections, TrackerStore};
use crate::error::AppError;
use crate::models::{GuildRestriction, NotificationSettings, Trophy, TrophyKey, User, UserTokens};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firestore::errors::FirestoreError;
use firestore::paths;
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};

const MAX_CONCURRENT_DB_OPS: usize = 50;

/// Partial user document for watermark writes.
#[derive(Serialize, Deserialize)]
struct WatermarkPatch {
    last_checked_at: DateTime<Utc>,
}

/// Partial user document for credential writes.
#[derive(Serialize, Deserialize)]
struct TokensPatch {
    tokens: Option<UserTokens>,
}

/// Partial user document for link writes.
#[derive(Serialize, Deserialize)]
struct LinkPatch {
    account_id: Option<String>,
    online_id: Option<String>,
}

/// Partial user document for the notification toggle.
#[derive(Serialize, Deserialize)]
struct EnabledPatch {
    notifications_enabled: bool,
}

/// Partial trophy document for the notified flag.
#[derive(Serialize, Deserialize)]
struct NotifiedPatch {
    notified: bool,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a disconnected client.
    ///
    /// All database operations return an error, which makes it a convenient
    /// stand-in for an unavailable store.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Patch only the credential bundle of a user.
    async fn write_tokens(
        &self,
        user_id: &str,
        tokens: Option<UserTokens>,
    ) -> Result<(), AppError> {
        let patch = TokensPatch { tokens };

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(paths!(TokensPatch::{tokens}))
            .in_col(collections::USERS)
            .document_id(user_id)
            .object(&patch)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }
}

#[async_trait]
impl TrackerStore for FirestoreDb {
    // ─── User Operations ─────────────────────────────────────────

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.user_id)
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn set_link(
        &self,
        user_id: &str,
        account_id: &str,
        online_id: Option<&str>,
    ) -> Result<(), AppError> {
        let patch = LinkPatch {
            account_id: Some(account_id.to_string()),
            online_id: online_id.map(str::to_string),
        };

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(paths!(LinkPatch::{account_id, online_id}))
            .in_col(collections::USERS)
            .document_id(user_id)
            .object(&patch)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn set_notifications_enabled(
        &self,
        user_id: &str,
        enabled: bool,
    ) -> Result<(), AppError> {
        let patch = EnabledPatch {
            notifications_enabled: enabled,
        };

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(paths!(EnabledPatch::{notifications_enabled}))
            .in_col(collections::USERS)
            .document_id(user_id)
            .object(&patch)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_sync_candidates(&self) -> Result<Vec<User>, AppError> {
        let users: Vec<User> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(|q| q.field("notifications_enabled").eq(true))
            .order_by([("user_id", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // account_id may be missing or null; filter unlinked users here
        Ok(users
            .into_iter()
            .filter(|u| u.account_id.is_some())
            .collect())
    }

    async fn set_tokens(&self, user_id: &str, tokens: &UserTokens) -> Result<(), AppError> {
        self.write_tokens(user_id, Some(tokens.clone())).await
    }

    async fn clear_tokens(&self, user_id: &str) -> Result<(), AppError> {
        self.write_tokens(user_id, None).await
    }

    async fn set_last_checked(
        &self,
        user_id: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let patch = WatermarkPatch {
            last_checked_at: checked_at,
        };

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(paths!(WatermarkPatch::{last_checked_at}))
            .in_col(collections::USERS)
            .document_id(user_id)
            .object(&patch)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Trophy Operations ───────────────────────────────────────

    async fn insert_trophy(&self, trophy: &Trophy) -> Result<bool, AppError> {
        let doc_id = trophy.key().doc_id();

        // `insert` is a create-only write: Firestore rejects it with
        // ALREADY_EXISTS when the document is present.
        let result: firestore::FirestoreResult<Trophy> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::TROPHIES)
            .document_id(&doc_id)
            .object(trophy)
            .execute()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(FirestoreError::DataConflictError(_)) => {
                tracing::debug!(
                    user_id = %trophy.user_id,
                    doc_id = %doc_id,
                    "Trophy already stored (idempotent skip)"
                );
                Ok(false)
            }
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    /// Uses concurrent writes with a limit to avoid overloading Firestore.
    async fn mark_notified(&self, keys: &[TrophyKey]) -> Result<(), AppError> {
        let client = self.get_client()?;
        let patch = NotifiedPatch { notified: true };
        let patch = &patch;

        stream::iter(keys.iter().map(TrophyKey::doc_id))
            .map(|doc_id| async move {
                let _: () = client
                    .fluent()
                    .update()
                    .fields(paths!(NotifiedPatch::{notified}))
                    .in_col(collections::TROPHIES)
                    .document_id(&doc_id)
                    .object(patch)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;

                Ok::<_, AppError>(())
            })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<(), AppError>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<()>, AppError>>()?;

        Ok(())
    }

    // ─── Settings Operations ─────────────────────────────────────

    async fn get_settings(&self, user_id: &str) -> Result<Option<NotificationSettings>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::NOTIFICATION_SETTINGS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn set_settings(&self, settings: &NotificationSettings) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::NOTIFICATION_SETTINGS)
            .document_id(&settings.user_id)
            .object(settings)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Guild Restriction Operations ────────────────────────────

    async fn get_restriction(&self, guild_id: &str) -> Result<Option<GuildRestriction>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::GUILD_RESTRICTIONS)
            .obj()
            .one(guild_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn set_restriction(&self, restriction: &GuildRestriction) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::GUILD_RESTRICTIONS)
            .document_id(&restriction.guild_id)
            .object(restriction)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
