//! Short-lived cache for rendered landing pages.
//!
//! Entries are keyed by the requested page number and expire after a fixed
//! time-to-live. New posts do not invalidate anything; a cached page can be up
//! to one TTL out of date. The number of entries is bounded and the oldest one
//! is evicted first.

use axum::body::Bytes;
use parking_lot::Mutex;
use quill_common::util::PositiveDuration;
use std::{collections::HashMap, sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Clone, Debug)]
struct CacheEntry {
    body: Bytes,
    inserted_at: Instant,
}

#[derive(Debug)]
pub struct PageCache {
    ttl: PositiveDuration,
    max_entries: usize,
    entries: Mutex<HashMap<i64, CacheEntry>>,
}

impl PageCache {
    /// # Panics
    /// If `max_entries` is zero.
    #[must_use]
    pub fn new(ttl: PositiveDuration, max_entries: usize) -> Self {
        assert!(max_entries > 0, "Page cache must hold at least one entry.");
        Self {
            ttl,
            max_entries,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> PositiveDuration {
        self.ttl
    }

    pub fn get(&self, page: i64) -> Option<Bytes> {
        self.get_at(page, Instant::now())
    }

    pub fn insert(&self, page: i64, body: Bytes) {
        self.insert_at(page, body, Instant::now());
    }

    /// Drops every entry, so the next request renders afresh.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns how many entries were removed.
    pub fn prune_expired(&self) -> usize {
        self.prune_expired_at(Instant::now())
    }

    fn is_fresh(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted_at) < self.ttl.to_std()
    }

    fn get_at(&self, page: i64, now: Instant) -> Option<Bytes> {
        let mut entries = self.entries.lock();
        match entries.get(&page) {
            Some(entry) if self.is_fresh(entry, now) => Some(entry.body.clone()),
            Some(_) => {
                entries.remove(&page);
                None
            }
            None => None,
        }
    }

    fn insert_at(&self, page: i64, body: Bytes, now: Instant) {
        let mut entries = self.entries.lock();
        if !entries.contains_key(&page)
            && entries.len() >= self.max_entries
            && let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(&key, _)| key)
        {
            entries.remove(&oldest);
        }

        entries.insert(
            page,
            CacheEntry {
                body,
                inserted_at: now,
            },
        );
    }

    fn prune_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| self.is_fresh(entry, now));
        before - entries.len()
    }

    /// Prunes expired entries once per TTL until `cancellation_token` fires.
    pub async fn prune_periodically(self: Arc<Self>, cancellation_token: CancellationToken) {
        let mut interval = tokio::time::interval(self.ttl.to_std());
        loop {
            tokio::select! {
                () = cancellation_token.cancelled() => break,
                _ = interval.tick() => {
                    let pruned = self.prune_expired();
                    if pruned > 0 {
                        debug!(pruned, "Pruned expired page cache entries");
                    }
                }
            }
        }
        debug!("Page cache pruning stopped");
    }
}
