// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Command endpoint.
//!
//! The chat gateway parses slash commands and forwards them here as signed
//! JSON. Every command except `clear_restrictions` passes the guild's
//! channel restriction check first.

use crate::error::{AppError, Result};
use crate::models::{NotificationSettings, User};
use crate::services::kms::seal_tokens;
use crate::services::sync::{SkipReason, UserSyncOutcome};
use crate::AppState;
use axum::{extract::State, routing::post, Json, Router};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Access token lifetime assumed when the link payload omits one.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/interactions", post(handle_command))
}

/// A parsed command from the gateway.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// `None` for direct messages
    #[serde(default)]
    pub guild_id: Option<String>,
    pub channel_id: String,
    pub user_id: String,
    /// Whether the invoking member may manage the guild
    #[serde(default)]
    pub is_admin: bool,
    pub command: Command,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Command {
    /// Link a PSN account, optionally with an OAuth credential bundle.
    Link {
        account_id: String,
        #[serde(default)]
        online_id: Option<String>,
        #[serde(default)]
        access_token: Option<String>,
        #[serde(default)]
        refresh_token: Option<String>,
        #[serde(default)]
        expires_in: Option<i64>,
    },
    /// Check the invoking user's trophies now.
    Check,
    Notifications {
        #[serde(default)]
        enabled: Option<bool>,
        #[serde(default)]
        platinum: Option<bool>,
        #[serde(default)]
        others: Option<bool>,
        /// Deliver notifications to this channel
        #[serde(default)]
        channel_id: Option<String>,
    },
    AllowChannel {
        #[serde(default)]
        channel_id: Option<String>,
    },
    DisallowChannel {
        #[serde(default)]
        channel_id: Option<String>,
    },
    ClearRestrictions,
    Restrictions,
}

impl Command {
    fn bypasses_gate(&self) -> bool {
        matches!(self, Command::ClearRestrictions)
    }

    fn name(&self) -> &'static str {
        match self {
            Command::Link { .. } => "link",
            Command::Check => "check",
            Command::Notifications { .. } => "notifications",
            Command::AllowChannel { .. } => "allow_channel",
            Command::DisallowChannel { .. } => "disallow_channel",
            Command::ClearRestrictions => "clear_restrictions",
            Command::Restrictions => "restrictions",
        }
    }
}

/// Reply shown to the invoking user.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CommandResponse {
    pub content: String,
    /// Only the invoking user sees the reply
    pub ephemeral: bool,
}

impl CommandResponse {
    fn private(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
        }
    }

    fn public(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: false,
        }
    }
}

async fn handle_command(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CommandRequest>,
) -> Result<Json<CommandResponse>> {
    let guild_id = request.guild_id.as_deref();

    tracing::info!(
        command = request.command.name(),
        user_id = %request.user_id,
        guild_id = ?guild_id,
        channel_id = %request.channel_id,
        "Received command"
    );

    if !request.command.bypasses_gate()
        && !state
            .access_gate
            .is_allowed(guild_id, &request.channel_id)
            .await
    {
        return Err(AppError::Forbidden(
            "commands are restricted to specific channels in this server".to_string(),
        ));
    }

    let response = match &request.command {
        Command::Link {
            account_id,
            online_id,
            access_token,
            refresh_token,
            expires_in,
        } => {
            link(
                &state,
                &request,
                LinkArgs {
                    account_id,
                    online_id: online_id.as_deref(),
                    access_token: access_token.as_deref(),
                    refresh_token: refresh_token.as_deref(),
                    expires_in: *expires_in,
                },
            )
            .await?
        }
        Command::Check => check(&state, &request).await?,
        Command::Notifications {
            enabled,
            platinum,
            others,
            channel_id,
        } => {
            notifications(
                &state,
                &request,
                *enabled,
                *platinum,
                *others,
                channel_id.as_deref(),
            )
            .await?
        }
        Command::AllowChannel { channel_id } => {
            let guild_id = require_admin_in_guild(&request)?;
            let channel_id = channel_id.as_deref().unwrap_or(&request.channel_id);
            if state.access_gate.allow_channel(guild_id, channel_id).await? {
                CommandResponse::private(format!("Commands are now allowed in <#{}>.", channel_id))
            } else {
                CommandResponse::private(format!("<#{}> was already allowed.", channel_id))
            }
        }
        Command::DisallowChannel { channel_id } => {
            let guild_id = require_admin_in_guild(&request)?;
            let channel_id = channel_id.as_deref().unwrap_or(&request.channel_id);
            if state
                .access_gate
                .disallow_channel(guild_id, channel_id)
                .await?
            {
                CommandResponse::private(format!(
                    "Commands are no longer allowed in <#{}>.",
                    channel_id
                ))
            } else {
                CommandResponse::private(format!("<#{}> was not on the allow-list.", channel_id))
            }
        }
        Command::ClearRestrictions => {
            let guild_id = require_admin_in_guild(&request)?;
            state.access_gate.clear(guild_id).await?;
            CommandResponse::private("Channel restrictions cleared. Commands work everywhere.")
        }
        Command::Restrictions => {
            let guild_id = require_guild(&request)?;
            let status = state.access_gate.status(guild_id).await?;
            if !status.restricted {
                CommandResponse::private("Commands are allowed in every channel.")
            } else if status.allowed_channel_ids.is_empty() {
                CommandResponse::private(
                    "Commands are restricted and no channel is allowed. Use clear_restrictions to reset.",
                )
            } else {
                let channels: Vec<String> = status
                    .allowed_channel_ids
                    .iter()
                    .map(|c| format!("<#{}>", c))
                    .collect();
                CommandResponse::private(format!(
                    "Commands are allowed in: {}",
                    channels.join(", ")
                ))
            }
        }
    };

    Ok(Json(response))
}

fn require_guild(request: &CommandRequest) -> Result<&str> {
    request
        .guild_id
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("this command only works in a server".to_string()))
}

fn require_admin_in_guild(request: &CommandRequest) -> Result<&str> {
    let guild_id = require_guild(request)?;
    if !request.is_admin {
        return Err(AppError::Forbidden(
            "only server administrators can change channel restrictions".to_string(),
        ));
    }
    Ok(guild_id)
}

struct LinkArgs<'a> {
    account_id: &'a str,
    online_id: Option<&'a str>,
    access_token: Option<&'a str>,
    refresh_token: Option<&'a str>,
    expires_in: Option<i64>,
}

/// Create or update the user's link, then make sure settings exist.
///
/// Existing users are only patched field by field; the watermark is never
/// written here.
async fn link(
    state: &AppState,
    request: &CommandRequest,
    args: LinkArgs<'_>,
) -> Result<CommandResponse> {
    let user_id = request.user_id.as_str();

    let tokens = match args.access_token {
        Some(access_token) => {
            let lifetime = args.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
            let expires_at = Utc::now() + Duration::seconds(lifetime);
            Some(
                seal_tokens(
                    &state.kms,
                    user_id,
                    access_token,
                    args.refresh_token,
                    expires_at,
                )
                .await?,
            )
        }
        None => None,
    };

    let previous = state.store.get_user(user_id).await?;
    let existed = previous.is_some();
    let same_account = previous
        .as_ref()
        .is_some_and(|u| u.account_id.as_deref() == Some(args.account_id));

    if !existed {
        state
            .store
            .upsert_user(&User::new(user_id, args.account_id))
            .await?;
    }

    let online_id = match args.online_id {
        Some(online_id) => Some(online_id.to_string()),
        None if same_account => previous.and_then(|u| u.online_id),
        None => None,
    };
    state
        .store
        .set_link(user_id, args.account_id, online_id.as_deref())
        .await?;

    let has_tokens = tokens.is_some();
    match tokens {
        Some(tokens) => {
            state
                .sync_engine
                .replace_credential(user_id, Some(&tokens))
                .await?
        }
        // A bundle issued for the previous account is useless now.
        None if existed && !same_account => {
            state.sync_engine.replace_credential(user_id, None).await?
        }
        None => {}
    }

    if state.store.get_settings(user_id).await?.is_none() {
        let mut settings = NotificationSettings::new(user_id);
        settings.channel_id = Some(request.channel_id.clone());
        state.store.set_settings(&settings).await?;
    }

    tracing::info!(
        user_id,
        account_id = args.account_id,
        has_tokens,
        relinked = existed,
        "Linked PSN account"
    );

    Ok(CommandResponse::private(format!(
        "Linked PSN account {}. New trophies will be announced in <#{}>.",
        online_id.as_deref().unwrap_or(args.account_id),
        request.channel_id
    )))
}

async fn check(state: &AppState, request: &CommandRequest) -> Result<CommandResponse> {
    let user = state
        .store
        .get_user(&request.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("no linked PSN account, use link first".to_string()))?;

    let outcome = state.sync_engine.sync_one(&user).await?;

    let response = match outcome {
        UserSyncOutcome::Skipped(SkipReason::NotLinked) => {
            CommandResponse::private("No linked PSN account, use link first.")
        }
        UserSyncOutcome::Skipped(SkipReason::NoCredential) => CommandResponse::private(
            "Your PSN credentials have expired. Run link again to reconnect.",
        ),
        UserSyncOutcome::Checked { new_trophies: 0, .. } => {
            CommandResponse::private("No new trophies since the last check.")
        }
        UserSyncOutcome::Checked { new_trophies, .. } => {
            CommandResponse::public(format!("Found {} new trophies!", new_trophies))
        }
    };

    Ok(response)
}

async fn notifications(
    state: &AppState,
    request: &CommandRequest,
    enabled: Option<bool>,
    platinum: Option<bool>,
    others: Option<bool>,
    channel_id: Option<&str>,
) -> Result<CommandResponse> {
    let user_id = request.user_id.as_str();

    let user = state
        .store
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("no linked PSN account, use link first".to_string()))?;

    if let Some(enabled) = enabled {
        state
            .store
            .set_notifications_enabled(user_id, enabled)
            .await?;
    }
    let enabled = enabled.unwrap_or(user.notifications_enabled);

    let mut settings = state
        .store
        .get_settings(user_id)
        .await?
        .unwrap_or_else(|| NotificationSettings::new(user_id));

    if let Some(platinum) = platinum {
        settings.notify_platinum = platinum;
    }
    if let Some(others) = others {
        settings.notify_others = others;
    }
    if let Some(channel_id) = channel_id {
        settings.channel_id = Some(channel_id.to_string());
    }
    state.store.set_settings(&settings).await?;

    let on_off = |b: bool| if b { "on" } else { "off" };
    let channel = settings
        .channel_id
        .as_deref()
        .map(|c| format!("<#{}>", c))
        .unwrap_or_else(|| "not set".to_string());

    Ok(CommandResponse::private(format!(
        "Notifications {}. Platinum: {}. Other trophies: {}. Channel: {}.",
        on_off(enabled),
        on_off(settings.notify_platinum),
        on_off(settings.notify_others),
        channel
    )))
}
