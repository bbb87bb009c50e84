// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user async locks.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Lazily created per-user mutexes, removed again once idle.
#[derive(Clone, Default)]
pub struct UserLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` while holding the lock for `user_id`.
    pub async fn run<F: Future>(&self, user_id: &str, fut: F) -> F::Output {
        let lock = self
            .locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let output = {
            let _guard = lock.lock().await;
            fut.await
        };
        drop(lock);

        // Only the map still references the mutex: nobody holds or awaits it.
        self.locks
            .remove_if(user_id, |_, lock| Arc::strong_count(lock) == 1);

        output
    }

    /// Users with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
