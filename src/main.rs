// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trophy-Tracker Server
//!
//! Runs the scheduled PSN trophy sync and serves the signed command
//! endpoint used by the Discord gateway.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trophy_tracker::{
    config::{Config, StoreBackend},
    db::{FirestoreDb, InMemoryStore, TrackerStore},
    services::{
        AccessGate, CredentialManager, DiscordClient, KmsService, NotificationDispatcher,
        PsnClient, SyncEngine, SyncScheduler, SyncSettings, TrophyApi,
    },
    AppState,
};

/// KMS key used for credential bundles.
const TOKEN_KEY_NAME: &str = "token-encryption";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Trophy-Tracker");

    // Initialize persistence and token encryption
    let (store, kms): (Arc<dyn TrackerStore>, KmsService) = match config.store_backend {
        StoreBackend::Firestore => {
            let db = FirestoreDb::new(&config.gcp_project_id).await?;
            let kms = KmsService::new(
                &config.gcp_project_id,
                &config.gcp_region,
                TOKEN_KEY_NAME,
            )
            .await?;
            tracing::info!("Firestore and KMS initialized");
            let store: Arc<dyn TrackerStore> = Arc::new(db);
            (store, kms)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; state is lost on restart");
            let store: Arc<dyn TrackerStore> = Arc::new(InMemoryStore::new());

            #[cfg(debug_assertions)]
            let kms = KmsService::new_mock();
            #[cfg(not(debug_assertions))]
            let kms = KmsService::new(
                &config.gcp_project_id,
                &config.gcp_region,
                TOKEN_KEY_NAME,
            )
            .await?;

            (store, kms)
        }
    };

    // Initialize external clients
    let api: Arc<dyn TrophyApi> = Arc::new(PsnClient::new(config.psn_client_auth.clone()));
    let discord = Arc::new(DiscordClient::new(config.discord_bot_token.clone()));

    // Build the sync pipeline
    let credentials = CredentialManager::new(api.clone(), store.clone(), kms.clone());
    let notifier = NotificationDispatcher::new(store.clone(), discord);
    let sync_engine = Arc::new(SyncEngine::new(
        store.clone(),
        api,
        credentials,
        notifier,
        SyncSettings::from_config(&config),
    ));

    let scheduler = SyncScheduler::new(
        sync_engine.clone(),
        config.sync_interval,
        config.sync_run_timeout,
    )
    .spawn();
    tokio::spawn(async move {
        if let Err(e) = scheduler.await {
            tracing::error!(error = %e, "Trophy sync scheduler stopped");
        }
    });

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        access_gate: AccessGate::new(store.clone()),
        store,
        sync_engine,
        kms,
    });

    // Build router
    let app = trophy_tracker::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trophy_tracker=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();

    Ok(())
}
