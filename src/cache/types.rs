use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Derived context for one (subject, query shape) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldData {
    pub coherence: f64,
    pub accessible: bool,
    /// Named sections of computed context, opaque to the cache.
    pub sections: BTreeMap<String, Value>,
}

impl Default for FieldData {
    fn default() -> Self {
        Self {
            coherence: 0.5,
            accessible: true,
            sections: BTreeMap::new(),
        }
    }
}

impl FieldData {
    pub fn with_section(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.sections.insert(name.to_string(), value.into());
        self
    }
}

/// Secondary-tier record. `created_at_ms` is wall-clock so other processes
/// sharing the tier can judge freshness.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub ttl_secs: u64,
    pub secondary_configured: bool,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}
