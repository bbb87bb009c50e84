// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trophy-Tracker: announce PlayStation trophies in Discord
//!
//! This crate polls the PSN trophy API for linked users on a timer,
//! records newly earned trophies, and posts notifications to each user's
//! configured Discord channel.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::TrackerStore;
use services::{AccessGate, KmsService, SyncEngine};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn TrackerStore>,
    pub sync_engine: Arc<SyncEngine>,
    pub access_gate: AccessGate,
    pub kms: KmsService,
}
