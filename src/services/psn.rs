// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! PlayStation Network trophy API client.
//!
//! Handles:
//! - Listing a user's recently earned trophies across recently played games
//! - Token refresh when expired
//! - Rate limit and token error detection

use crate::error::AppError;
use crate::models::{EarnedTrophy, TrophyRank};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Margin before token expiration when we proactively refresh (5 minutes).
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Number of recently played games scanned for new trophies.
const TITLE_SCAN_LIMIT: u32 = 10;

const TROPHY_API_BASE: &str = "https://m.np.playstation.com/api/trophy/v1";
const OAUTH_TOKEN_URL: &str = "https://ca.account.sony.com/api/authz/v3/oauth/token";

/// Whether a token expiring at `expires_at` is still usable at `now`.
pub fn token_is_fresh(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < expires_at
}

/// A refreshed credential pair.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: String,
    /// Some providers rotate the refresh token, some keep the old one.
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Operations the sync pipeline needs from the trophy service.
#[async_trait]
pub trait TrophyApi: Send + Sync {
    /// Up to `limit` most recently earned trophies, newest first.
    async fn fetch_recent_trophies(
        &self,
        access_token: &str,
        account_id: &str,
        limit: u32,
    ) -> Result<Vec<EarnedTrophy>, AppError>;

    /// Exchange a refresh token for a new access token.
    async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshedTokens, AppError>;

    fn is_token_valid(&self, access_token: &str, expires_at: DateTime<Utc>) -> bool {
        !access_token.is_empty() && token_is_fresh(expires_at, Utc::now())
    }
}

/// PSN API client.
#[derive(Clone)]
pub struct PsnClient {
    http: reqwest::Client,
    base_url: String,
    /// Basic auth value for the OAuth client
    client_auth: String,
}

impl PsnClient {
    pub fn new(client_auth: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: TROPHY_API_BASE.to_string(),
            client_auth,
        }
    }

    /// Games the user most recently earned trophies in.
    async fn list_titles(
        &self,
        access_token: &str,
        account_id: &str,
        limit: u32,
    ) -> Result<Vec<TrophyTitle>, AppError> {
        let url = format!("{}/users/{}/trophyTitles", self.base_url, account_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("limit", limit.to_string())])
            .send()
            .await
            .map_err(|e| AppError::TrophyApi(e.to_string()))?;

        let titles: TrophyTitlesResponse = self.check_response_json(response).await?;
        Ok(titles.trophy_titles)
    }

    /// Earned state of every trophy in a game for a user.
    async fn user_trophies(
        &self,
        access_token: &str,
        account_id: &str,
        title: &TrophyTitle,
    ) -> Result<Vec<UserTrophy>, AppError> {
        let url = format!(
            "{}/users/{}/npCommunicationIds/{}/trophyGroups/all/trophies",
            self.base_url, account_id, title.np_communication_id
        );
        let response: UserTrophiesResponse = self
            .get_json(&url, access_token, &title.np_service_name)
            .await?;
        Ok(response.trophies)
    }

    /// Names, descriptions and icons of every trophy in a game.
    async fn title_trophies(
        &self,
        access_token: &str,
        title: &TrophyTitle,
    ) -> Result<Vec<TrophyDefinition>, AppError> {
        let url = format!(
            "{}/npCommunicationIds/{}/trophyGroups/all/trophies",
            self.base_url, title.np_communication_id
        );
        let response: TitleTrophiesResponse = self
            .get_json(&url, access_token, &title.np_service_name)
            .await?;
        Ok(response.trophies)
    }

    /// GET request with the `npServiceName` query parameter.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
        np_service_name: &str,
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .query(&[("npServiceName", np_service_name)])
            .send()
            .await
            .map_err(|e| AppError::TrophyApi(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                tracing::warn!("PSN rate limit hit (429)");
                return Err(AppError::TrophyApi(AppError::TROPHY_RATE_LIMIT.to_string()));
            }

            if status.as_u16() == 401 {
                return Err(AppError::TrophyApi(AppError::TROPHY_TOKEN_ERROR.to_string()));
            }

            return Err(AppError::TrophyApi(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::TrophyApi(format!("JSON parse error: {}", e)))
    }
}

#[async_trait]
impl TrophyApi for PsnClient {
    async fn fetch_recent_trophies(
        &self,
        access_token: &str,
        account_id: &str,
        limit: u32,
    ) -> Result<Vec<EarnedTrophy>, AppError> {
        let titles = self
            .list_titles(access_token, account_id, TITLE_SCAN_LIMIT)
            .await?;

        let mut earned = Vec::new();

        for title in &titles {
            let progress = self.user_trophies(access_token, account_id, title).await?;
            if !progress.iter().any(|t| t.earned) {
                continue;
            }
            let definitions = self.title_trophies(access_token, title).await?;
            earned.extend(merge_title_trophies(title, &progress, &definitions));
        }

        earned.sort_by(|a, b| b.earned_at.cmp(&a.earned_at));
        earned.truncate(limit as usize);

        tracing::debug!(
            titles = titles.len(),
            trophies = earned.len(),
            "Fetched recent trophies"
        );

        Ok(earned)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshedTokens, AppError> {
        let response = self
            .http
            .post(OAUTH_TOKEN_URL)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Basic {}", self.client_auth),
            )
            .form(&[
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
                ("token_format", "jwt"),
                ("scope", "psn:mobile.v2.core psn:clientapp"),
            ])
            .send()
            .await
            .map_err(|e| AppError::TrophyApi(format!("Token refresh request failed: {}", e)))?;

        let body: TokenRefreshResponse = self.check_response_json(response).await?;

        Ok(RefreshedTokens {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_at: Utc::now() + Duration::seconds(body.expires_in),
        })
    }
}

/// Join a user's earned trophies in one game with the game's definitions.
fn merge_title_trophies(
    title: &TrophyTitle,
    progress: &[UserTrophy],
    definitions: &[TrophyDefinition],
) -> Vec<EarnedTrophy> {
    progress
        .iter()
        .filter(|t| t.earned)
        .filter_map(|t| {
            let earned_at = t.earned_date_time?;
            let definition = definitions.iter().find(|d| d.trophy_id == t.trophy_id);
            Some(EarnedTrophy {
                trophy_id: t.trophy_id,
                name: definition
                    .map(|d| d.trophy_name.clone())
                    .unwrap_or_else(|| format!("Trophy #{}", t.trophy_id)),
                description: definition
                    .and_then(|d| d.trophy_detail.clone())
                    .unwrap_or_default(),
                rank: t.trophy_type,
                icon_url: definition.and_then(|d| d.trophy_icon_url.clone()),
                game_id: title.np_communication_id.clone(),
                game_name: title.trophy_title_name.clone(),
                earned_at,
            })
        })
        .collect()
}

/// Token refresh response from the PSN OAuth endpoint.
#[derive(Debug, Clone, Deserialize)]
struct TokenRefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Lifetime in seconds
    expires_in: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrophyTitlesResponse {
    #[serde(default)]
    trophy_titles: Vec<TrophyTitle>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrophyTitle {
    np_service_name: String,
    np_communication_id: String,
    trophy_title_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserTrophiesResponse {
    #[serde(default)]
    trophies: Vec<UserTrophy>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserTrophy {
    trophy_id: u32,
    trophy_type: TrophyRank,
    #[serde(default)]
    earned: bool,
    #[serde(default)]
    earned_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TitleTrophiesResponse {
    #[serde(default)]
    trophies: Vec<TrophyDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrophyDefinition {
    trophy_id: u32,
    trophy_name: String,
    #[serde(default)]
    trophy_detail: Option<String>,
    #[serde(default)]
    trophy_icon_url: Option<String>,
}
