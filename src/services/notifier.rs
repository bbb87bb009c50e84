// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Notification dispatch for newly discovered trophies.
//!
//! Platinum trophies each get their own message. Everything else is grouped
//! by game into a single summary message.

use crate::db::TrackerStore;
use crate::models::{Trophy, TrophyKey, User};
use crate::services::discord::{
    ChannelResolver, Embed, EmbedField, EmbedFooter, EmbedImage, OutboundMessage,
};
use futures_util::future::join_all;
use std::sync::Arc;

/// Trophies listed per game before collapsing into "+N more".
pub const MAX_TROPHIES_PER_GAME: usize = 5;

/// Games listed in one summary message.
pub const MAX_GAME_GROUPS: usize = 25;

const PLATINUM_COLOR: u32 = 0x00E5_E4E2;
const SUMMARY_COLOR: u32 = 0x0000_439C;

// Discord embed limits, in characters.
const EMBED_TITLE_LIMIT: usize = 256;
const EMBED_DESCRIPTION_LIMIT: usize = 4096;
const FIELD_NAME_LIMIT: usize = 256;
const FIELD_VALUE_LIMIT: usize = 1024;
const EMBED_TOTAL_LIMIT: usize = 6000;

/// Room left for the "+N more games" footer.
const FOOTER_RESERVE: usize = 32;

/// Longest trophy name shown on a summary line.
const MAX_LISTED_NAME_CHARS: usize = 100;

/// Outcome of one dispatch call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Messages accepted by the channel
    pub delivered: usize,
    /// Messages that failed to send
    pub failed: usize,
    /// Trophies marked as notified
    pub marked: usize,
}

impl DispatchReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Trophies sharing one game, in the order they were earned.
#[derive(Debug)]
pub struct GameGroup<'a> {
    pub game_id: &'a str,
    pub game_name: &'a str,
    pub trophies: Vec<&'a Trophy>,
}

/// Split trophies into (platinum, others).
pub fn partition_trophies(trophies: &[Trophy]) -> (Vec<&Trophy>, Vec<&Trophy>) {
    trophies.iter().partition(|t| t.rank.is_top())
}

/// Group trophies by game, games ordered by their earliest trophy.
pub fn group_by_game<'a>(trophies: &[&'a Trophy]) -> Vec<GameGroup<'a>> {
    let mut sorted = trophies.to_vec();
    sorted.sort_by_key(|t| t.earned_at);

    let mut groups: Vec<GameGroup<'a>> = Vec::new();
    for trophy in sorted {
        match groups.iter_mut().find(|g| g.game_id == trophy.game_id) {
            Some(group) => group.trophies.push(trophy),
            None => groups.push(GameGroup {
                game_id: &trophy.game_id,
                game_name: &trophy.game_name,
                trophies: vec![trophy],
            }),
        }
    }
    groups
}

/// Cut `text` to at most `max` characters, marking the cut with an ellipsis.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

pub fn build_platinum_message(user: &User, trophy: &Trophy) -> OutboundMessage {
    let title = format!(
        "{} {} earned a Platinum trophy!",
        trophy.rank.emoji(),
        user.display_name()
    );
    let description = format!(
        "**{}**\n{}\n\n*{}*",
        trophy.name, trophy.game_name, trophy.description
    );

    OutboundMessage {
        content: None,
        embeds: vec![Embed {
            title: truncate_chars(&title, EMBED_TITLE_LIMIT),
            description: Some(truncate_chars(&description, EMBED_DESCRIPTION_LIMIT)),
            color: Some(PLATINUM_COLOR),
            thumbnail: trophy.icon_url.clone().map(|url| EmbedImage { url }),
            fields: Vec::new(),
            footer: None,
        }],
    }
}

fn game_field(group: &GameGroup<'_>) -> EmbedField {
    let mut lines: Vec<String> = group
        .trophies
        .iter()
        .take(MAX_TROPHIES_PER_GAME)
        .map(|t| {
            format!(
                "{} {}",
                t.rank.emoji(),
                truncate_chars(&t.name, MAX_LISTED_NAME_CHARS)
            )
        })
        .collect();

    let hidden = group.trophies.len().saturating_sub(MAX_TROPHIES_PER_GAME);
    if hidden > 0 {
        lines.push(format!("+{} more", hidden));
    }

    EmbedField {
        name: truncate_chars(group.game_name, FIELD_NAME_LIMIT),
        value: truncate_chars(&lines.join("\n"), FIELD_VALUE_LIMIT),
        inline: false,
    }
}

/// Build one summary message for non-platinum trophies.
///
/// Games that do not fit in the embed size limit are counted in the footer.
/// Returns `None` when there is nothing to report.
pub fn build_batch_message(user: &User, trophies: &[&Trophy]) -> Option<OutboundMessage> {
    if trophies.is_empty() {
        return None;
    }

    let groups = group_by_game(trophies);

    let noun = if trophies.len() == 1 {
        "trophy"
    } else {
        "trophies"
    };
    let title = truncate_chars(
        &format!(
            "{} earned {} new {}",
            user.display_name(),
            trophies.len(),
            noun
        ),
        EMBED_TITLE_LIMIT,
    );

    let mut budget = EMBED_TOTAL_LIMIT - FOOTER_RESERVE - title.chars().count();
    let mut fields = Vec::new();
    for group in groups.iter().take(MAX_GAME_GROUPS) {
        let field = game_field(group);
        let size = field.name.chars().count() + field.value.chars().count();
        if size > budget {
            break;
        }
        budget -= size;
        fields.push(field);
    }

    let hidden_games = groups.len() - fields.len();
    let footer = (hidden_games > 0).then(|| EmbedFooter {
        text: format!("+{} more games", hidden_games),
    });

    Some(OutboundMessage {
        content: None,
        embeds: vec![Embed {
            title,
            description: None,
            color: Some(SUMMARY_COLOR),
            thumbnail: None,
            fields,
            footer,
        }],
    })
}

/// Delivers trophy notifications to each user's configured channel.
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn TrackerStore>,
    resolver: Arc<dyn ChannelResolver>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn TrackerStore>, resolver: Arc<dyn ChannelResolver>) -> Self {
        Self { store, resolver }
    }

    /// Send notifications for `trophies`. Never fails.
    ///
    /// Trophies whose message was attempted are marked notified whether or
    /// not the send succeeded.
    pub async fn dispatch(&self, user: &User, trophies: &[Trophy]) -> DispatchReport {
        let mut report = DispatchReport::default();

        if trophies.is_empty() {
            return report;
        }

        let settings = match self.store.get_settings(&user.user_id).await {
            Ok(Some(s)) => s,
            Ok(None) => {
                tracing::debug!(user_id = %user.user_id, "No notification settings");
                return report;
            }
            Err(e) => {
                tracing::warn!(user_id = %user.user_id, error = %e, "Failed to load notification settings");
                return report;
            }
        };

        let Some(channel_id) = settings.channel_id.as_deref() else {
            tracing::debug!(user_id = %user.user_id, "No notification channel configured");
            return report;
        };

        let channel = match self.resolver.resolve(channel_id).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(
                    user_id = %user.user_id,
                    channel_id,
                    error = %e,
                    "Notification channel unavailable"
                );
                return report;
            }
        };

        let (platinum, others) = partition_trophies(trophies);

        let mut messages: Vec<(OutboundMessage, Vec<TrophyKey>)> = Vec::new();

        if settings.notify_platinum {
            for trophy in &platinum {
                messages.push((build_platinum_message(user, trophy), vec![trophy.key()]));
            }
        }

        if settings.notify_others {
            if let Some(message) = build_batch_message(user, &others) {
                messages.push((message, others.iter().map(|t| t.key()).collect()));
            }
        }

        let sends = messages.iter().map(|(message, _)| channel.send(message));
        let results = join_all(sends).await;

        let mut attempted_keys = Vec::new();
        for (result, (_, keys)) in results.into_iter().zip(messages) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        user_id = %user.user_id,
                        channel_id,
                        error = %e,
                        "Failed to send notification"
                    );
                }
            }
            attempted_keys.extend(keys);
        }

        if !attempted_keys.is_empty() {
            match self.store.mark_notified(&attempted_keys).await {
                Ok(()) => report.marked = attempted_keys.len(),
                Err(e) => tracing::warn!(
                    user_id = %user.user_id,
                    error = %e,
                    "Failed to mark trophies as notified"
                ),
            }
        }

        tracing::info!(
            user_id = %user.user_id,
            delivered = report.delivered,
            failed = report.failed,
            "Notifications dispatched"
        );

        report
    }
}
