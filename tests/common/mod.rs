// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use trophy_tracker::config::{Config, DataSourceMode};
use trophy_tracker::db::{FirestoreDb, InMemoryStore, TrackerStore};
use trophy_tracker::error::AppError;
use trophy_tracker::models::{
    EarnedTrophy, GuildRestriction, NotificationSettings, Trophy, TrophyKey, TrophyRank, User,
    UserTokens,
};
use trophy_tracker::routes::create_router;
use trophy_tracker::services::kms::seal_tokens;
use trophy_tracker::services::psn::RefreshedTokens;
use trophy_tracker::services::{
    AccessGate, ChannelResolver, CredentialManager, KmsService, MessageChannel,
    NotificationDispatcher, OutboundMessage, SyncEngine, SyncSettings, TrophyApi,
};
use trophy_tracker::AppState;

/// Check if emulator is available via environment variable.
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

// ─── Trophy API fake ─────────────────────────────────────────────

/// Scripted response for one account.
#[derive(Clone)]
pub enum FakeFetch {
    Trophies(Vec<EarnedTrophy>),
    Fail(String),
    /// Never answers; exercises the fetch timeout.
    Hang,
}

/// In-process stand-in for the PSN API.
#[derive(Default)]
pub struct FakeTrophyApi {
    responses: Mutex<HashMap<String, FakeFetch>>,
    refresh_result: Mutex<Option<Result<RefreshedTokens, String>>>,
    fetch_delay: Mutex<Option<std::time::Duration>>,
    refresh_delay: Mutex<Option<std::time::Duration>>,
    fetch_calls: Mutex<Vec<(String, String)>>,
    refresh_calls: AtomicUsize,
    panic_next_fetch: AtomicBool,
    fetches_in_flight: AtomicUsize,
    max_fetches_in_flight: AtomicUsize,
}

impl FakeTrophyApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, account_id: &str, response: FakeFetch) {
        self.responses
            .lock()
            .unwrap()
            .insert(account_id.to_string(), response);
    }

    pub fn refresh_with(&self, result: Result<RefreshedTokens, String>) {
        *self.refresh_result.lock().unwrap() = Some(result);
    }

    pub fn set_fetch_delay(&self, delay: std::time::Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_refresh_delay(&self, delay: std::time::Duration) {
        *self.refresh_delay.lock().unwrap() = Some(delay);
    }

    /// `(access_token, account_id)` for every fetch, in call order.
    pub fn fetch_calls(&self) -> Vec<(String, String)> {
        self.fetch_calls.lock().unwrap().clone()
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// The next fetch panics instead of answering.
    pub fn panic_on_next_fetch(&self) {
        self.panic_next_fetch.store(true, Ordering::SeqCst);
    }

    /// Highest number of fetches that were running at the same time.
    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_fetches_in_flight.load(Ordering::SeqCst)
    }
}

/// Counts a running fetch until dropped, including when a timeout cancels it.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(count: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let running = count.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(running, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TrophyApi for FakeTrophyApi {
    async fn fetch_recent_trophies(
        &self,
        access_token: &str,
        account_id: &str,
        limit: u32,
    ) -> Result<Vec<EarnedTrophy>, AppError> {
        self.fetch_calls
            .lock()
            .unwrap()
            .push((access_token.to_string(), account_id.to_string()));

        if self.panic_next_fetch.swap(false, Ordering::SeqCst) {
            panic!("trophy API client crashed");
        }

        let _in_flight = InFlight::enter(&self.fetches_in_flight, &self.max_fetches_in_flight);
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = self.responses.lock().unwrap().get(account_id).cloned();
        match response {
            Some(FakeFetch::Trophies(mut trophies)) => {
                trophies.truncate(limit as usize);
                Ok(trophies)
            }
            Some(FakeFetch::Fail(msg)) => Err(AppError::TrophyApi(msg)),
            Some(FakeFetch::Hang) => {
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<RefreshedTokens, AppError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.refresh_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = self.refresh_result.lock().unwrap().clone();
        match result {
            Some(Ok(tokens)) => Ok(tokens),
            Some(Err(msg)) => Err(AppError::TrophyApi(msg)),
            None => Err(AppError::TrophyApi("invalid_grant".to_string())),
        }
    }
}

// ─── Channel fakes ───────────────────────────────────────────────

/// Records every message sent, per channel.
#[derive(Default)]
pub struct RecordingResolver {
    sent: Arc<Mutex<Vec<(String, OutboundMessage)>>>,
    missing: Mutex<Vec<String>>,
    /// Sends whose embed title contains this text fail.
    fail_matching: Arc<Mutex<Option<String>>>,
}

impl RecordingResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `resolve` fail for a channel, as if it had been deleted.
    pub fn remove_channel(&self, channel_id: &str) {
        self.missing.lock().unwrap().push(channel_id.to_string());
    }

    pub fn fail_sends_matching(&self, text: &str) {
        *self.fail_matching.lock().unwrap() = Some(text.to_string());
    }

    pub fn sent(&self) -> Vec<(String, OutboundMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_titles(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .flat_map(|(_, m)| m.embeds.into_iter().map(|e| e.title))
            .collect()
    }
}

struct RecordingChannel {
    channel_id: String,
    sent: Arc<Mutex<Vec<(String, OutboundMessage)>>>,
    fail_matching: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl ChannelResolver for RecordingResolver {
    async fn resolve(&self, channel_id: &str) -> Result<Arc<dyn MessageChannel>, AppError> {
        if self.missing.lock().unwrap().iter().any(|c| c == channel_id) {
            return Err(AppError::Discord("HTTP 404: Unknown Channel".to_string()));
        }
        Ok(Arc::new(RecordingChannel {
            channel_id: channel_id.to_string(),
            sent: self.sent.clone(),
            fail_matching: self.fail_matching.clone(),
        }))
    }
}

#[async_trait]
impl MessageChannel for RecordingChannel {
    async fn send(&self, message: &OutboundMessage) -> Result<(), AppError> {
        let fail_matching = self.fail_matching.lock().unwrap().clone();
        if let Some(text) = fail_matching {
            if message.embeds.iter().any(|e| e.title.contains(&text)) {
                return Err(AppError::Discord("HTTP 500: send failed".to_string()));
            }
        }
        self.sent
            .lock()
            .unwrap()
            .push((self.channel_id.clone(), message.clone()));
        Ok(())
    }
}

// ─── Store wrapper with injectable failures ──────────────────────

/// In-memory store whose trophy inserts can be switched to fail and whose
/// user reads can be slowed down.
#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    fail_inserts: Arc<AtomicBool>,
    get_user_delay: Arc<Mutex<Option<std::time::Duration>>>,
}

impl FlakyStore {
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_get_user_delay(&self, delay: Option<std::time::Duration>) {
        *self.get_user_delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl TrackerStore for FlakyStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        let delay = *self.get_user_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.get_user(user_id).await
    }

    async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.inner.upsert_user(user).await
    }

    async fn set_link(
        &self,
        user_id: &str,
        account_id: &str,
        online_id: Option<&str>,
    ) -> Result<(), AppError> {
        self.inner.set_link(user_id, account_id, online_id).await
    }

    async fn set_notifications_enabled(
        &self,
        user_id: &str,
        enabled: bool,
    ) -> Result<(), AppError> {
        self.inner.set_notifications_enabled(user_id, enabled).await
    }

    async fn list_sync_candidates(&self) -> Result<Vec<User>, AppError> {
        self.inner.list_sync_candidates().await
    }

    async fn set_tokens(&self, user_id: &str, tokens: &UserTokens) -> Result<(), AppError> {
        self.inner.set_tokens(user_id, tokens).await
    }

    async fn clear_tokens(&self, user_id: &str) -> Result<(), AppError> {
        self.inner.clear_tokens(user_id).await
    }

    async fn set_last_checked(
        &self,
        user_id: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.inner.set_last_checked(user_id, checked_at).await
    }

    async fn insert_trophy(&self, trophy: &Trophy) -> Result<bool, AppError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(AppError::Database("insert failed".to_string()));
        }
        self.inner.insert_trophy(trophy).await
    }

    async fn mark_notified(&self, keys: &[TrophyKey]) -> Result<(), AppError> {
        self.inner.mark_notified(keys).await
    }

    async fn get_settings(&self, user_id: &str) -> Result<Option<NotificationSettings>, AppError> {
        self.inner.get_settings(user_id).await
    }

    async fn set_settings(&self, settings: &NotificationSettings) -> Result<(), AppError> {
        self.inner.set_settings(settings).await
    }

    async fn get_restriction(&self, guild_id: &str) -> Result<Option<GuildRestriction>, AppError> {
        self.inner.get_restriction(guild_id).await
    }

    async fn set_restriction(&self, restriction: &GuildRestriction) -> Result<(), AppError> {
        self.inner.set_restriction(restriction).await
    }
}

// ─── Builders ────────────────────────────────────────────────────

pub fn earned(
    trophy_id: u32,
    rank: TrophyRank,
    game_id: &str,
    earned_at: DateTime<Utc>,
) -> EarnedTrophy {
    EarnedTrophy {
        trophy_id,
        name: format!("Trophy {}", trophy_id),
        description: format!("Description {}", trophy_id),
        rank,
        icon_url: None,
        game_id: game_id.to_string(),
        game_name: format!("Game {}", game_id),
        earned_at,
    }
}

/// Sync settings with short delays for tests.
pub fn fast_settings() -> SyncSettings {
    SyncSettings {
        fetch_limit: 50,
        fetch_timeout: std::time::Duration::from_millis(200),
        user_delay: std::time::Duration::from_millis(10),
        mode: DataSourceMode::Authenticated,
        public_token: None,
    }
}

/// Store a linked user with sealed tokens and a notification channel.
pub async fn seed_user(
    store: &dyn TrackerStore,
    kms: &KmsService,
    user_id: &str,
    watermark: DateTime<Utc>,
) -> User {
    let mut user = User::new(user_id, format!("acc-{}", user_id));
    user.last_checked_at = watermark;
    user.tokens = Some(
        seal_tokens(
            kms,
            user_id,
            &format!("access-{}", user_id),
            Some(format!("refresh-{}", user_id).as_str()),
            Utc::now() + Duration::hours(1),
        )
        .await
        .unwrap(),
    );
    store.upsert_user(&user).await.unwrap();

    let mut settings = NotificationSettings::new(user_id);
    settings.channel_id = Some(format!("chan-{}", user_id));
    store.set_settings(&settings).await.unwrap();

    user
}

/// A wired sync pipeline over fakes.
pub struct TestPipeline {
    pub store: Arc<dyn TrackerStore>,
    pub kms: KmsService,
    pub api: Arc<FakeTrophyApi>,
    pub resolver: Arc<RecordingResolver>,
    pub credentials: CredentialManager,
    pub engine: Arc<SyncEngine>,
}

impl TestPipeline {
    pub fn new(store: Arc<dyn TrackerStore>) -> Self {
        Self::with_settings(store, fast_settings())
    }

    pub fn with_settings(store: Arc<dyn TrackerStore>, settings: SyncSettings) -> Self {
        let kms = KmsService::new_mock();
        let api = FakeTrophyApi::new();
        let resolver = RecordingResolver::new();

        let credentials = CredentialManager::new(api.clone(), store.clone(), kms.clone());
        let notifier = NotificationDispatcher::new(store.clone(), resolver.clone());
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            api.clone(),
            credentials.clone(),
            notifier,
            settings,
        ));

        Self {
            store,
            kms,
            api,
            resolver,
            credentials,
            engine,
        }
    }

    pub async fn watermark(&self, user_id: &str) -> DateTime<Utc> {
        self.store
            .get_user(user_id)
            .await
            .unwrap()
            .unwrap()
            .last_checked_at
    }
}

/// Create a test app over an in-memory store.
/// Returns the router, the shared state and the pipeline fakes.
pub fn create_test_app() -> (axum::Router, Arc<AppState>, TestPipeline) {
    create_test_app_with_store(Arc::new(InMemoryStore::new()))
}

/// Like [`create_test_app`], over the given store.
pub fn create_test_app_with_store(
    store: Arc<dyn TrackerStore>,
) -> (axum::Router, Arc<AppState>, TestPipeline) {
    let config = Config::default();
    let pipeline = TestPipeline::new(store);

    let state = Arc::new(AppState {
        config,
        store: pipeline.store.clone(),
        sync_engine: pipeline.engine.clone(),
        access_gate: AccessGate::new(pipeline.store.clone()),
        kms: pipeline.kms.clone(),
    });

    (create_router(state.clone()), state, pipeline)
}
