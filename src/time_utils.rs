// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time handling.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Initial watermark for a user that has never been checked.
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Advance a watermark to `now` without ever moving it backwards.
pub fn advance_watermark(current: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    current.max(now)
}
