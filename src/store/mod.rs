//! Storage collaborators.
//!
//! The coordination layer talks to durable and secondary storage only through
//! [`PatternStore`], [`WisdomStore`], and [`SecondaryTier`]. [`SqliteStore`]
//! implements all three on one SQLite connection; tests and alternative
//! deployments can substitute their own.

mod field_tier;
mod patterns;
mod wisdom;

use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::bus::types::{AgentLearning, WisdomExchange};
use crate::emergence::types::{Contribution, Observation, Pattern, PatternCriteria, PatternSummary};
use crate::error::Result;

/// Durable home of promoted patterns and their verification history.
#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Persist a new pattern. Returns its id.
    async fn insert_pattern(&self, pattern: &Pattern) -> Result<String>;

    /// Patterns matching `criteria`, strongest first, at most `limit`.
    async fn query_patterns(&self, criteria: &PatternCriteria, limit: usize) -> Result<Vec<Pattern>>;

    async fn get_pattern(&self, id: &str) -> Result<Option<Pattern>>;

    /// Overwrite the mutable fields of a stored pattern.
    async fn update_pattern(&self, id: &str, verification_count: u32, strength: f64) -> Result<()>;

    async fn record_contribution(&self, contribution: &Contribution) -> Result<()>;

    async fn record_observation(&self, observation: &Observation) -> Result<()>;

    /// Aggregate figures across all stored patterns.
    async fn summarize(&self, top_domains: usize) -> Result<PatternSummary>;
}

/// Durable home of wisdom exchanges and agent learning records.
#[async_trait]
pub trait WisdomStore: Send + Sync {
    async fn insert_exchange(&self, exchange: &WisdomExchange) -> Result<()>;

    /// Exchanges addressed to `to_agent` with relevance at or above `min_relevance`,
    /// most relevant first, at most `limit`.
    async fn query_exchanges(
        &self,
        to_agent: &str,
        min_relevance: f64,
        limit: usize,
    ) -> Result<Vec<WisdomExchange>>;

    /// Bump an exchange's applied count. Returns `false` if it does not exist.
    async fn increment_applied(&self, exchange_id: &str) -> Result<bool>;

    async fn insert_learning(&self, learning: &AgentLearning) -> Result<()>;
}

/// Optional shared cache tier. Absence changes performance, never correctness.
#[async_trait]
pub trait SecondaryTier: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set_with_expiry(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Live keys matching a glob pattern such as `namespace:*`.
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>>;
}

/// SQLite-backed implementation of every storage collaborator.
///
/// Statements run on the blocking pool; the connection is shared behind a mutex.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Open (or create) the database file, applying schema and migrations.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = crate::db::open_database(path)?;
        Ok(Self::new(Arc::new(Mutex::new(conn))))
    }

    /// A fresh, fully migrated in-memory database.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = crate::db::open_memory_database()?;
        Ok(Self::new(Arc::new(Mutex::new(conn))))
    }

    /// Shared handle to the underlying connection.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.db)
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> anyhow::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let value = tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            f(&mut conn)
        })
        .await??;
        Ok(value)
    }
}
