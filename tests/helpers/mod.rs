#![allow(dead_code)]

use agora::bus::types::{AgentLearning, WisdomExchange};
use agora::bus::MessageBus;
use agora::config::{AgentSpec, BusConfig};
use agora::emergence::types::{
    Contribution, Interaction, Observation, Pattern, PatternCriteria, PatternSummary,
};
use agora::error::{Error, Result};
use agora::store::{PatternStore, SecondaryTier, SqliteStore, WisdomStore};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A fresh, fully migrated in-memory store.
pub fn test_store() -> SqliteStore {
    SqliteStore::open_in_memory().unwrap()
}

/// Bus with the named agents, no durable wisdom store, and no request delay.
pub fn test_bus(agents: &[&str]) -> MessageBus {
    let config = BusConfig {
        agents: agents.iter().map(|name| AgentSpec::new(*name, None)).collect(),
        request_wisdom_delay_ms: 0,
        ..Default::default()
    };
    MessageBus::new(config, None)
}

/// Interaction that extracts to `["fire", "water"]` in the healing domain.
pub fn healing_interaction(subject: &str, confidence: f64) -> Interaction {
    Interaction::new(
        subject,
        "How do I heal after the breakup?",
        "Let the emotion flow; healing moves at its own pace. The key is staying with what you feel.",
        "fire",
        confidence,
    )
}

fn outage() -> Error {
    Error::StorageUnavailable(anyhow::anyhow!("simulated outage"))
}

/// Collaborator that fails every call and counts how often it was tried.
#[derive(Default)]
pub struct FailingStore {
    pub calls: AtomicUsize,
}

impl FailingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(outage())
    }
}

#[async_trait]
impl PatternStore for FailingStore {
    async fn insert_pattern(&self, _pattern: &Pattern) -> Result<String> {
        self.fail()
    }

    async fn query_patterns(&self, _criteria: &PatternCriteria, _limit: usize) -> Result<Vec<Pattern>> {
        self.fail()
    }

    async fn get_pattern(&self, _id: &str) -> Result<Option<Pattern>> {
        self.fail()
    }

    async fn update_pattern(&self, _id: &str, _verification_count: u32, _strength: f64) -> Result<()> {
        self.fail()
    }

    async fn record_contribution(&self, _contribution: &Contribution) -> Result<()> {
        self.fail()
    }

    async fn record_observation(&self, _observation: &Observation) -> Result<()> {
        self.fail()
    }

    async fn summarize(&self, _top_domains: usize) -> Result<PatternSummary> {
        self.fail()
    }
}

#[async_trait]
impl WisdomStore for FailingStore {
    async fn insert_exchange(&self, _exchange: &WisdomExchange) -> Result<()> {
        self.fail()
    }

    async fn query_exchanges(
        &self,
        _to_agent: &str,
        _min_relevance: f64,
        _limit: usize,
    ) -> Result<Vec<WisdomExchange>> {
        self.fail()
    }

    async fn increment_applied(&self, _exchange_id: &str) -> Result<bool> {
        self.fail()
    }

    async fn insert_learning(&self, _learning: &AgentLearning) -> Result<()> {
        self.fail()
    }
}

#[async_trait]
impl SecondaryTier for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        self.fail()
    }

    async fn set_with_expiry(&self, _key: &str, _value: Vec<u8>, _ttl_secs: u64) -> Result<()> {
        self.fail()
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        self.fail()
    }

    async fn keys_matching(&self, _pattern: &str) -> Result<Vec<String>> {
        self.fail()
    }
}
