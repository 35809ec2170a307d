//! Two-tier expiring cache for derived field data.
//!
//! The primary tier is an in-process map and is always authoritative. The
//! secondary tier is an optional [`SecondaryTier`] mirror; every failure there is
//! logged and the call falls through to the primary tier.

pub mod types;

use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub use types::{CacheStats, FieldData};
use types::Envelope;

use crate::config::CacheConfig;
use crate::store::SecondaryTier;

/// Signatures are truncated to this many characters when building keys.
const SIGNATURE_CHARS: usize = 100;

struct Entry<T> {
    data: T,
    created_at: Instant,
}

pub struct FieldCache<T = FieldData> {
    config: CacheConfig,
    secondary: Option<Arc<dyn SecondaryTier>>,
    primary: Mutex<HashMap<String, Entry<T>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl<T> FieldCache<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig, secondary: Option<Arc<dyn SecondaryTier>>) -> Self {
        Self {
            config,
            secondary,
            primary: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            cleanup_task: Mutex::new(None),
        }
    }

    /// `namespace:subject:signature`, with the signature trimmed, lower-cased,
    /// and cut to its first 100 characters.
    pub fn cache_key(&self, subject_id: &str, signature: &str) -> String {
        let normalized: String = signature
            .trim()
            .to_lowercase()
            .chars()
            .take(SIGNATURE_CHARS)
            .collect();
        format!("{}:{}:{}", self.config.namespace, subject_id, normalized)
    }

    fn subject_prefix(&self, subject_id: &str) -> String {
        format!("{}:{}:", self.config.namespace, subject_id)
    }

    fn namespace_pattern(&self) -> String {
        format!("{}:*", glob_escape(&self.config.namespace))
    }

    /// Cached data for the pair, if present and younger than the TTL.
    pub async fn get(&self, subject_id: &str, signature: &str) -> Option<T> {
        let key = self.cache_key(subject_id, signature);

        if let Some(data) = self.get_secondary(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, tier = "secondary", "field cache hit");
            return Some(data);
        }

        let ttl = self.config.ttl();
        let data = {
            let primary = self.primary.lock();
            primary
                .get(&key)
                .filter(|entry| entry.created_at.elapsed() < ttl)
                .map(|entry| entry.data.clone())
        };

        match data {
            Some(data) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, tier = "primary", "field cache hit");
                Some(data)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, "field cache miss");
                None
            }
        }
    }

    async fn get_secondary(&self, key: &str) -> Option<T> {
        let secondary = self.secondary.as_ref()?;
        let bytes = match secondary.get(key).await {
            Ok(bytes) => bytes?,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "secondary cache read failed");
                return None;
            }
        };
        let envelope: Envelope<T> = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "undecodable secondary cache entry");
                return None;
            }
        };
        let age_ms = Utc::now().timestamp_millis() - envelope.created_at_ms;
        (u128::try_from(age_ms).unwrap_or(0) < self.config.ttl().as_millis()).then_some(envelope.data)
    }

    /// Store `data` for the pair, replacing any previous entry.
    pub async fn set(&self, subject_id: &str, signature: &str, data: T) {
        let key = self.cache_key(subject_id, signature);

        let evicted = {
            let mut primary = self.primary.lock();
            primary.insert(
                key.clone(),
                Entry {
                    data: data.clone(),
                    created_at: Instant::now(),
                },
            );
            if primary.len() > self.config.max_size {
                evict_oldest(&mut primary, (self.config.max_size / 10).max(1))
            } else {
                0
            }
        };
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::debug!(evicted, "field cache over capacity");
        }
        tracing::debug!(key = %key, "field cache set");

        if let Some(secondary) = &self.secondary {
            let envelope = Envelope {
                data,
                created_at_ms: Utc::now().timestamp_millis(),
            };
            let result = match serde_json::to_vec(&envelope) {
                Ok(bytes) => secondary
                    .set_with_expiry(&key, bytes, self.config.ttl_secs)
                    .await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = result {
                tracing::warn!(key = %key, error = %e, "secondary cache write failed");
                // the previous mirror would shadow the new primary entry
                if let Err(e) = secondary.delete(&key).await {
                    tracing::warn!(key = %key, error = %e, "stale secondary cache entry left behind");
                }
            }
        }
    }

    /// Drop every entry belonging to `subject_id` from both tiers.
    pub async fn clear_for_subject(&self, subject_id: &str) {
        let prefix = self.subject_prefix(subject_id);
        let removed: Vec<String> = {
            let mut primary = self.primary.lock();
            let keys: Vec<String> = primary
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();
            for key in &keys {
                primary.remove(key);
            }
            keys
        };

        if let Some(secondary) = &self.secondary {
            let mut keys = removed.clone();
            match secondary
                .keys_matching(&format!("{}*", glob_escape(&prefix)))
                .await {
                Ok(found) => keys.extend(found),
                Err(e) => tracing::warn!(subject_id = %subject_id, error = %e, "secondary cache key scan failed"),
            }
            keys.sort();
            keys.dedup();
            self.delete_secondary(secondary.as_ref(), &keys).await;
        }
        tracing::info!(subject_id = %subject_id, removed = removed.len(), "field cache cleared for subject");
    }

    /// Empty the primary tier and this namespace of the secondary tier.
    pub async fn clear_all(&self) {
        let removed = {
            let mut primary = self.primary.lock();
            let n = primary.len();
            primary.clear();
            n
        };

        if let Some(secondary) = &self.secondary {
            match secondary.keys_matching(&self.namespace_pattern()).await {
                Ok(keys) => self.delete_secondary(secondary.as_ref(), &keys).await,
                Err(e) => tracing::warn!(error = %e, "secondary cache key scan failed"),
            }
        }
        tracing::info!(removed, namespace = %self.config.namespace, "field cache cleared");
    }

    async fn delete_secondary(&self, secondary: &dyn SecondaryTier, keys: &[String]) {
        for key in keys {
            if let Err(e) = secondary.delete(key).await {
                tracing::warn!(key = %key, error = %e, "secondary cache delete failed");
            }
        }
    }

    /// Remove primary entries older than the TTL. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let ttl = self.config.ttl();
        let removed = {
            let mut primary = self.primary.lock();
            let before = primary.len();
            primary.retain(|_, entry| entry.created_at.elapsed() < ttl);
            before - primary.len()
        };
        if removed > 0 {
            tracing::info!(removed, "field cache cleanup");
        }
        removed
    }

    /// Start the periodic cleanup sweep. Replaces any sweep already running.
    pub fn start_cleanup(self: &Arc<Self>) {
        let handle = crate::sweep::spawn_periodic(
            Arc::downgrade(self),
            self.config.cleanup_interval(),
            "field_cache_cleanup",
            |cache: Arc<Self>| async move {
                cache.cleanup();
            },
        );
        if let Some(previous) = self.cleanup_task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the cleanup sweep and empty the primary tier.
    pub fn shutdown(&self) {
        if let Some(handle) = self.cleanup_task.lock().take() {
            handle.abort();
        }
        self.primary.lock().clear();
        tracing::info!(namespace = %self.config.namespace, "field cache shut down");
    }

    /// Entries resident in the primary tier, expired or not.
    pub fn len(&self) -> usize {
        self.primary.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            size: self.len(),
            max_size: self.config.max_size,
            ttl_secs: self.config.ttl_secs,
            secondary_configured: self.secondary.is_some(),
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}

impl<T> Drop for FieldCache<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_task.get_mut().take() {
            handle.abort();
        }
    }
}

/// Escape `*`, `?` and `[` so they match literally in a glob pattern.
fn glob_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '*' | '?' | '[' => {
                escaped.push('[');
                escaped.push(c);
                escaped.push(']');
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Remove the `count` oldest entries by creation time.
fn evict_oldest<T>(primary: &mut HashMap<String, Entry<T>>, count: usize) -> usize {
    let mut by_age: Vec<(Instant, String)> = primary
        .iter()
        .map(|(key, entry)| (entry.created_at, key.clone()))
        .collect();
    by_age.sort();
    by_age.truncate(count);
    for (_, key) in &by_age {
        primary.remove(key);
    }
    by_age.len()
}
