//! Pattern emergence records.
//!
//! [`Interaction`] is the input observation, [`PatternCandidate`] the in-memory
//! aggregate, and [`Pattern`] the promoted, durable result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tokio::time::Instant;

use crate::error::{Error, Result};

/// One request/response exchange reported by a request handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub subject_id: String,
    pub query: String,
    pub response: String,
    /// Primary element tag chosen for this interaction.
    pub element: String,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Interaction {
    pub fn new(
        subject_id: impl Into<String>,
        query: impl Into<String>,
        response: impl Into<String>,
        element: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            query: query.into(),
            response: response.into(),
            element: element.into(),
            confidence,
            metadata: Map::new(),
        }
    }
}

/// In-memory aggregate of observations sharing one element set. Never persisted.
#[derive(Debug, Clone)]
pub struct PatternCandidate {
    /// Sorted, deduplicated elements.
    pub elements: Vec<String>,
    pub occurrences: u32,
    pub contributors: BTreeSet<String>,
    /// Observed context domains with how often each was seen.
    pub domains: BTreeMap<String, u32>,
    pub average_confidence: f64,
    pub wisdom: Vec<String>,
    pub last_seen: Instant,
}

impl PatternCandidate {
    pub fn new(elements: Vec<String>) -> Self {
        Self {
            elements,
            occurrences: 0,
            contributors: BTreeSet::new(),
            domains: BTreeMap::new(),
            average_confidence: 0.0,
            wisdom: Vec::new(),
            last_seen: Instant::now(),
        }
    }

    /// Fold one observation into the aggregate.
    pub fn record(&mut self, subject_id: &str, domain: &str, confidence: f64, wisdom: Option<String>) {
        self.occurrences += 1;
        self.contributors.insert(subject_id.to_string());
        *self.domains.entry(domain.to_string()).or_insert(0) += 1;
        let n = f64::from(self.occurrences);
        self.average_confidence = (self.average_confidence * (n - 1.0) + confidence) / n;
        if let Some(w) = wisdom {
            self.wisdom.push(w);
        }
        self.last_seen = Instant::now();
    }

    /// Most frequently observed domain; ties go to the alphabetically first.
    pub fn primary_domain(&self) -> String {
        self.domains
            .iter()
            .fold(None::<(&String, u32)>, |best, (domain, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((domain, count)),
            })
            .map(|(domain, _)| domain.clone())
            .unwrap_or_else(|| "general".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessMetrics {
    pub confidence: f64,
    pub user_satisfaction: String,
    pub follow_up_success: String,
}

/// A promoted, durable pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// UUID v7 primary key.
    pub id: String,
    pub elements: Vec<String>,
    pub context_domain: String,
    pub cultural_context: String,
    pub age_demographic: String,
    pub success_metrics: SuccessMetrics,
    pub integration_wisdom: String,
    pub discovered_by: String,
    pub verification_count: u32,
    /// Always within `[0.0, 1.0]`.
    pub strength: f64,
    pub created_at: DateTime<Utc>,
}

impl Pattern {
    /// The candidate key this pattern was promoted from.
    pub fn element_key(&self) -> String {
        self.elements.join("-")
    }
}

/// Query for [`super::PatternEngine::find_relevant`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternCriteria {
    /// Every listed element must be involved in the pattern.
    #[serde(default)]
    pub elements: Vec<String>,
    pub domain: Option<String>,
    pub culture: Option<String>,
    pub min_strength: Option<f64>,
    /// Page size override.
    pub limit: Option<usize>,
}

impl PatternCriteria {
    pub fn validate(&self) -> Result<()> {
        if self.elements.iter().any(|e| e.trim().is_empty()) {
            return Err(Error::validation("elements must not contain empty strings"));
        }
        if let Some(min) = self.min_strength {
            if !(0.0..=1.0).contains(&min) {
                return Err(Error::validation("min_strength must be between 0.0 and 1.0"));
            }
        }
        if self.limit == Some(0) {
            return Err(Error::validation("limit must be at least 1"));
        }
        if matches!(self.domain.as_deref(), Some(d) if d.trim().is_empty()) {
            return Err(Error::validation("domain must not be empty"));
        }
        if matches!(self.culture.as_deref(), Some(c) if c.trim().is_empty()) {
            return Err(Error::validation("culture must not be empty"));
        }
        Ok(())
    }
}

/// Whether a verification confirmed or contradicted a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionKind {
    Validation,
    Invalidation,
}

impl ContributionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Invalidation => "invalidation",
        }
    }

    pub fn impact_score(&self) -> f64 {
        match self {
            Self::Validation => 0.1,
            Self::Invalidation => 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub pattern_id: String,
    pub contributor_id: String,
    pub kind: ContributionKind,
}

/// Raw interaction record kept for offline analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub subject_id: String,
    pub query_text: String,
    pub query_type: String,
    pub primary_element: String,
    pub confidence: f64,
    pub metadata: Map<String, Value>,
}

/// Aggregates over stored patterns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatternSummary {
    pub total_patterns: usize,
    pub average_strength: f64,
    pub top_domains: Vec<String>,
}

/// [`PatternSummary`] plus the live candidate count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatternStatistics {
    pub total_patterns: usize,
    pub average_strength: f64,
    pub top_domains: Vec<String>,
    pub emerging_patterns: usize,
}
