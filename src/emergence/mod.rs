//! Pattern emergence.
//!
//! [`PatternEngine`] folds interaction observations into in-memory
//! [`PatternCandidate`]s keyed by their sorted element set. A candidate that
//! crosses every promotion threshold becomes a durable [`Pattern`], is announced
//! on the [`MessageBus`], and is removed from memory.

pub mod extract;
pub mod types;

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::bus::types::PatternDiscovery;
use crate::bus::MessageBus;
use crate::config::EmergenceConfig;
use crate::error::{Error, Result};
use crate::store::PatternStore;
use types::{
    Contribution, ContributionKind, Interaction, Observation, Pattern, PatternCandidate,
    PatternCriteria, PatternStatistics, SuccessMetrics,
};

/// Minimum confidence for an interaction's wisdom to be collected.
const WISDOM_MIN_CONFIDENCE: f64 = 0.8;

/// Strength change applied by a successful verification.
const VERIFY_SUCCESS_DELTA: f64 = 0.01;

/// Strength change applied by a failed verification.
const VERIFY_FAILURE_DELTA: f64 = -0.005;

const TOP_DOMAINS: usize = 5;

/// Slack for the running average landing a rounding error below the threshold.
const CONFIDENCE_TOLERANCE: f64 = 1e-9;

struct CachedQuery {
    stored_at: Instant,
    patterns: Vec<Pattern>,
}

pub struct PatternEngine {
    config: EmergenceConfig,
    store: Arc<dyn PatternStore>,
    bus: Arc<MessageBus>,
    candidates: Mutex<HashMap<String, PatternCandidate>>,
    query_cache: Mutex<HashMap<String, CachedQuery>>,
}

impl PatternEngine {
    pub fn new(config: EmergenceConfig, store: Arc<dyn PatternStore>, bus: Arc<MessageBus>) -> Self {
        Self {
            config,
            store,
            bus,
            candidates: Mutex::new(HashMap::new()),
            query_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EmergenceConfig {
        &self.config
    }

    // ── Observation ─────────────────────────────────────────────────────────

    /// Process `interaction` in the background. The caller never waits on storage.
    pub fn observe(self: &Arc<Self>, interaction: Interaction) -> JoinHandle<Option<Pattern>> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.process_interaction(interaction).await })
    }

    /// Fold one interaction into its candidate, then check that candidate for
    /// promotion. Returns the promoted pattern, if this observation completed one.
    pub async fn process_interaction(&self, interaction: Interaction) -> Option<Pattern> {
        self.record_observation(&interaction).await;

        let elements = extract::extract_elements(
            &interaction.element,
            &interaction.query,
            &interaction.response,
        );
        let (elements, key) = extract::candidate_key(&elements);
        if elements.len() < 2 {
            tracing::debug!(subject_id = %interaction.subject_id, "single-element interaction, no candidate");
            return None;
        }

        let domain = extract::infer_domain(&interaction.query);
        let wisdom = (interaction.confidence >= WISDOM_MIN_CONFIDENCE)
            .then(|| extract::extract_wisdom(&interaction.response))
            .flatten();

        {
            let mut candidates = self.candidates.lock();
            let candidate = candidates
                .entry(key.clone())
                .or_insert_with(|| PatternCandidate::new(elements));
            candidate.record(&interaction.subject_id, domain, interaction.confidence, wisdom);
            tracing::debug!(
                key = %key,
                occurrences = candidate.occurrences,
                contributors = candidate.contributors.len(),
                average_confidence = candidate.average_confidence,
                "candidate updated"
            );
        }

        self.check_promotion(&key).await
    }

    async fn record_observation(&self, interaction: &Interaction) {
        let observation = Observation {
            subject_id: interaction.subject_id.clone(),
            query_text: interaction.query.clone(),
            query_type: extract::categorize_query(&interaction.query).to_string(),
            primary_element: interaction.element.clone(),
            confidence: interaction.confidence,
            metadata: interaction.metadata.clone(),
        };
        if let Err(e) = self.store.record_observation(&observation).await {
            tracing::warn!(subject_id = %interaction.subject_id, error = %e, "failed to record observation");
        }
    }

    /// Number of candidates still accumulating.
    pub fn candidate_count(&self) -> usize {
        self.candidates.lock().len()
    }

    /// Snapshot of a candidate by its element key.
    pub fn candidate(&self, key: &str) -> Option<PatternCandidate> {
        self.candidates.lock().get(key).cloned()
    }

    // ── Promotion ───────────────────────────────────────────────────────────

    /// Promote the candidate under `key` if it meets every threshold.
    ///
    /// The candidate is removed before it is persisted; if persistence fails it
    /// is not requeued.
    pub async fn check_promotion(&self, key: &str) -> Option<Pattern> {
        let candidate = {
            let mut candidates = self.candidates.lock();
            let ready = candidates
                .get(key)
                .is_some_and(|c| meets_thresholds(&self.config, c));
            if ready {
                candidates.remove(key)
            } else {
                None
            }
        }?;
        self.promote(key, candidate).await
    }

    async fn promote(&self, key: &str, candidate: PatternCandidate) -> Option<Pattern> {
        let mut pattern = Pattern {
            id: uuid::Uuid::now_v7().to_string(),
            elements: candidate.elements.clone(),
            context_domain: candidate.primary_domain(),
            cultural_context: "universal".into(),
            age_demographic: "mixed".into(),
            success_metrics: SuccessMetrics {
                confidence: candidate.average_confidence,
                user_satisfaction: "pending".into(),
                follow_up_success: "pending".into(),
            },
            integration_wisdom: extract::synthesize_wisdom(&candidate.wisdom),
            discovered_by: self.config.agent_name.clone(),
            verification_count: candidate.contributors.len() as u32,
            strength: pattern_strength(&candidate),
            created_at: Utc::now(),
        };

        match self.store.insert_pattern(&pattern).await {
            Ok(id) => pattern.id = id,
            Err(e) => {
                tracing::error!(
                    key = %key,
                    occurrences = candidate.occurrences,
                    error = %e,
                    "failed to persist pattern, candidate dropped"
                );
                return None;
            }
        }
        self.invalidate_queries();

        tracing::info!(
            pattern_id = %pattern.id,
            key = %key,
            domain = %pattern.context_domain,
            strength = pattern.strength,
            "pattern promoted"
        );

        let discovery = PatternDiscovery {
            discovered_by: pattern.discovered_by.clone(),
            pattern_id: pattern.id.clone(),
            elements: pattern.elements.clone(),
            wisdom: pattern.integration_wisdom.clone(),
            strength: pattern.strength,
        };
        if let Err(e) = self.bus.share_pattern_discovery(&discovery).await {
            tracing::warn!(pattern_id = %pattern.id, error = %e, "failed to announce pattern");
        }
        Some(pattern)
    }

    /// Check every candidate for promotion, then drop the ones idle too long.
    pub async fn sweep(&self) -> Vec<Pattern> {
        let keys: Vec<String> = self.candidates.lock().keys().cloned().collect();
        let mut promoted = Vec::new();
        for key in keys {
            if let Some(pattern) = self.check_promotion(&key).await {
                promoted.push(pattern);
            }
        }

        let idle_limit = self.config.candidate_idle();
        let dropped = {
            let mut candidates = self.candidates.lock();
            let before = candidates.len();
            candidates.retain(|_, c| c.last_seen.elapsed() < idle_limit);
            before - candidates.len()
        };

        let query_ttl = self.config.query_cache_ttl();
        self.query_cache
            .lock()
            .retain(|_, q| q.stored_at.elapsed() < query_ttl);

        if !promoted.is_empty() || dropped > 0 {
            tracing::info!(promoted = promoted.len(), dropped, "candidate sweep");
        }
        promoted
    }

    /// Run [`Self::sweep`] every `sweep_interval` for as long as the engine lives.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        crate::sweep::spawn_periodic(
            Arc::downgrade(self),
            self.config.sweep_interval(),
            "candidate_sweep",
            |engine: Arc<Self>| async move {
                engine.sweep().await;
            },
        )
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    /// Stored patterns matching `criteria`, strongest first.
    ///
    /// Answers repeat queries from a short-lived cache. A store outage yields
    /// an empty list; only malformed criteria are an error.
    pub async fn find_relevant(&self, criteria: &PatternCriteria) -> Result<Vec<Pattern>> {
        criteria.validate()?;
        let limit = criteria.limit.unwrap_or(self.config.page_size);
        let cache_key = serde_json::to_string(criteria)?;
        let ttl = self.config.query_cache_ttl();

        let cached = {
            let cache = self.query_cache.lock();
            cache
                .get(&cache_key)
                .filter(|q| q.stored_at.elapsed() < ttl)
                .map(|q| q.patterns.clone())
        };
        if let Some(patterns) = cached {
            tracing::debug!(criteria = %cache_key, "pattern query cache hit");
            return Ok(patterns);
        }

        match self.store.query_patterns(criteria, limit).await {
            Ok(patterns) => {
                self.query_cache.lock().insert(
                    cache_key,
                    CachedQuery {
                        stored_at: Instant::now(),
                        patterns: patterns.clone(),
                    },
                );
                Ok(patterns)
            }
            Err(e) => {
                tracing::warn!(error = %e, "pattern query failed");
                Ok(Vec::new())
            }
        }
    }

    /// Nudge a pattern's strength after someone applied it.
    ///
    /// Returns the updated pattern, or `None` if it does not exist or the store
    /// could not be reached.
    pub async fn verify(
        &self,
        pattern_id: &str,
        contributor_id: &str,
        success: bool,
    ) -> Result<Option<Pattern>> {
        if pattern_id.trim().is_empty() {
            return Err(Error::validation("pattern_id must not be empty"));
        }
        if contributor_id.trim().is_empty() {
            return Err(Error::validation("contributor_id must not be empty"));
        }

        let mut pattern = match self.store.get_pattern(pattern_id).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                tracing::debug!(pattern_id = %pattern_id, "verify on unknown pattern");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(pattern_id = %pattern_id, error = %e, "failed to load pattern for verification");
                return Ok(None);
            }
        };

        let delta = if success {
            VERIFY_SUCCESS_DELTA
        } else {
            VERIFY_FAILURE_DELTA
        };
        pattern.strength = (pattern.strength + delta).clamp(0.0, 1.0);
        pattern.verification_count += 1;

        if let Err(e) = self
            .store
            .update_pattern(pattern_id, pattern.verification_count, pattern.strength)
            .await
        {
            tracing::warn!(pattern_id = %pattern_id, error = %e, "failed to update pattern");
            return Ok(None);
        }

        let contribution = Contribution {
            pattern_id: pattern_id.to_string(),
            contributor_id: contributor_id.to_string(),
            kind: if success {
                ContributionKind::Validation
            } else {
                ContributionKind::Invalidation
            },
        };
        if let Err(e) = self.store.record_contribution(&contribution).await {
            tracing::warn!(pattern_id = %pattern_id, error = %e, "failed to record contribution");
        }
        self.invalidate_queries();

        tracing::info!(
            pattern_id = %pattern_id,
            success,
            strength = pattern.strength,
            verifications = pattern.verification_count,
            "pattern verified"
        );
        Ok(Some(pattern))
    }

    pub async fn statistics(&self) -> PatternStatistics {
        let summary = match self.store.summarize(TOP_DOMAINS).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(error = %e, "failed to summarize patterns");
                Default::default()
            }
        };
        PatternStatistics {
            total_patterns: summary.total_patterns,
            average_strength: summary.average_strength,
            top_domains: summary.top_domains,
            emerging_patterns: self.candidate_count(),
        }
    }

    fn invalidate_queries(&self) {
        self.query_cache.lock().clear();
    }
}

/// Whether `candidate` has crossed every promotion threshold.
pub fn meets_thresholds(config: &EmergenceConfig, candidate: &PatternCandidate) -> bool {
    candidate.occurrences >= config.min_occurrences
        && candidate.contributors.len() >= config.min_contributors
        && candidate.average_confidence + CONFIDENCE_TOLERANCE >= config.min_average_confidence
}

/// Weighted strength in `[0.0, 1.0]`: occurrences (25%, saturating at 10),
/// contributors (25%, saturating at 5), average confidence (30%), and domain
/// diversity (20%, saturating at 3).
pub fn pattern_strength(candidate: &PatternCandidate) -> f64 {
    let occurrences = (f64::from(candidate.occurrences) / 10.0).min(1.0);
    let contributors = (candidate.contributors.len() as f64 / 5.0).min(1.0);
    let diversity = (candidate.domains.len() as f64 / 3.0).min(1.0);
    let strength = occurrences * 0.25
        + contributors * 0.25
        + candidate.average_confidence * 0.3
        + diversity * 0.2;
    strength.clamp(0.0, 1.0)
}
