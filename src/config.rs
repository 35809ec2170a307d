use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AgoraConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub emergence: EmergenceConfig,
    pub bus: BusConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

/// Field cache knobs. Durations are whole seconds so they read naturally in TOML.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_size: usize,
    pub cleanup_interval_secs: u64,
    /// Key prefix isolating this cache from others sharing the secondary tier.
    pub namespace: String,
    /// Mirror entries into the database-backed secondary tier.
    pub mirror_to_store: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmergenceConfig {
    pub min_occurrences: u32,
    pub min_contributors: usize,
    pub min_average_confidence: f64,
    pub sweep_interval_secs: u64,
    pub candidate_idle_secs: u64,
    pub query_cache_ttl_secs: u64,
    pub page_size: usize,
    /// Name the engine uses as the sender of pattern discoveries.
    pub agent_name: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BusConfig {
    pub agents: Vec<AgentSpec>,
    pub broadcast_capacity: usize,
    pub relevance_threshold: f64,
    pub wisdom_history: usize,
    pub request_wisdom_delay_ms: u64,
}

/// A mailbox owner registered at construction time.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AgentSpec {
    pub name: String,
    #[serde(default)]
    pub element: Option<String>,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, element: Option<&str>) -> Self {
        Self {
            name: name.into(),
            element: element.map(str::to_string),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_agora_dir()
            .join("agora.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 15 * 60,
            max_size: 1000,
            cleanup_interval_secs: 5 * 60,
            namespace: "universal_field".into(),
            mirror_to_store: true,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for EmergenceConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 3,
            min_contributors: 2,
            min_average_confidence: 0.7,
            sweep_interval_secs: 5 * 60,
            candidate_idle_secs: 24 * 60 * 60,
            query_cache_ttl_secs: 60,
            page_size: 10,
            agent_name: "PatternEngine".into(),
        }
    }
}

impl EmergenceConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn candidate_idle(&self) -> Duration {
        Duration::from_secs(self.candidate_idle_secs)
    }

    pub fn query_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.query_cache_ttl_secs)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            agents: default_agents(),
            broadcast_capacity: 100,
            relevance_threshold: 0.75,
            wisdom_history: 500,
            request_wisdom_delay_ms: 100,
        }
    }
}

/// The elemental agents plus the oracle that oversees them.
pub fn default_agents() -> Vec<AgentSpec> {
    vec![
        AgentSpec::new("FireAgent", Some("fire")),
        AgentSpec::new("WaterAgent", Some("water")),
        AgentSpec::new("EarthAgent", Some("earth")),
        AgentSpec::new("AirAgent", Some("air")),
        AgentSpec::new("AetherAgent", Some("aether")),
        AgentSpec::new("ShadowAgent", Some("shadow")),
        AgentSpec::new("MainOracleAgent", None),
    ]
}

/// Returns `~/.agora/`
pub fn default_agora_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".agora")
}

/// Returns the default config file path: `~/.agora/config.toml`
pub fn default_config_path() -> PathBuf {
    default_agora_dir().join("config.toml")
}

impl AgoraConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            AgoraConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (AGORA_DB, AGORA_LOG_LEVEL, AGORA_CACHE_TTL_SECS, AGORA_CACHE_MAX_SIZE).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AGORA_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("AGORA_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("AGORA_CACHE_TTL_SECS") {
            match val.parse() {
                Ok(secs) => self.cache.ttl_secs = secs,
                Err(_) => warn!(value = %val, "ignoring invalid AGORA_CACHE_TTL_SECS"),
            }
        }
        if let Ok(val) = std::env::var("AGORA_CACHE_MAX_SIZE") {
            match val.parse() {
                Ok(size) => self.cache.max_size = size,
                Err(_) => warn!(value = %val, "ignoring invalid AGORA_CACHE_MAX_SIZE"),
            }
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}
