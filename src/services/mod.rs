// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod access;
pub mod credentials;
pub mod discord;
pub mod kms;
pub mod notifier;
pub mod psn;
pub mod scheduler;
pub mod sync;
pub mod user_locks;

pub use access::AccessGate;
pub use credentials::CredentialManager;
pub use discord::{ChannelResolver, DiscordClient, MessageChannel, OutboundMessage};
pub use kms::KmsService;
pub use notifier::{DispatchReport, NotificationDispatcher};
pub use psn::{PsnClient, TrophyApi};
pub use scheduler::{RunOutcome, SyncScheduler};
pub use sync::{SkipReason, SyncEngine, SyncReport, SyncSettings, UserSyncOutcome};
pub use user_locks::UserLocks;
