// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Discord REST client for notification delivery.

use crate::error::AppError;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Message posted to a channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutboundMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// A channel that accepts messages.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), AppError>;
}

/// Turns a stored channel reference into a send-capable handle.
#[async_trait]
pub trait ChannelResolver: Send + Sync {
    /// Fails if the channel was deleted or the bot cannot see it.
    async fn resolve(&self, channel_id: &str) -> Result<Arc<dyn MessageChannel>, AppError>;
}

/// Discord bot REST client.
#[derive(Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: String,
}

impl DiscordClient {
    pub fn new(bot_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DISCORD_API_BASE.to_string(),
            bot_token,
        }
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    /// Check response status and return error if not successful.
    async fn check_response(response: reqwest::Response) -> Result<(), AppError> {
        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 429 {
            tracing::warn!("Discord rate limit hit (429)");
        }

        Err(AppError::Discord(format!("HTTP {}: {}", status, body)))
    }
}

#[async_trait]
impl ChannelResolver for DiscordClient {
    async fn resolve(&self, channel_id: &str) -> Result<Arc<dyn MessageChannel>, AppError> {
        let url = format!("{}/channels/{}", self.base_url, channel_id);

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .await
            .map_err(|e| AppError::Discord(e.to_string()))?;

        Self::check_response(response).await?;

        Ok(Arc::new(DiscordChannel {
            client: self.clone(),
            channel_id: channel_id.to_string(),
        }))
    }
}

/// Resolved Discord text channel.
struct DiscordChannel {
    client: DiscordClient,
    channel_id: String,
}

#[async_trait]
impl MessageChannel for DiscordChannel {
    async fn send(&self, message: &OutboundMessage) -> Result<(), AppError> {
        let url = format!(
            "{}/channels/{}/messages",
            self.client.base_url, self.channel_id
        );

        let response = self
            .client
            .http
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, self.client.authorization())
            .json(message)
            .send()
            .await
            .map_err(|e| AppError::Discord(e.to_string()))?;

        DiscordClient::check_response(response).await
    }
}
