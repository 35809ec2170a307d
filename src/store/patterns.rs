use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{PatternStore, SqliteStore};
use crate::emergence::types::{
    Contribution, Observation, Pattern, PatternCriteria, PatternSummary, SuccessMetrics,
};

const PATTERN_COLUMNS: &str = "id, elements, context_domain, cultural_context, age_demographic, \
     success_metrics, integration_wisdom, discovered_by, verification_count, strength, created_at";

pub(crate) fn insert_pattern(conn: &Connection, pattern: &Pattern) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO patterns (id, elements, element_key, context_domain, cultural_context, \
         age_demographic, success_metrics, integration_wisdom, discovered_by, verification_count, \
         strength, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            pattern.id,
            serde_json::to_string(&pattern.elements)?,
            pattern.element_key(),
            pattern.context_domain,
            pattern.cultural_context,
            pattern.age_demographic,
            serde_json::to_string(&pattern.success_metrics)?,
            pattern.integration_wisdom,
            pattern.discovered_by,
            pattern.verification_count,
            pattern.strength,
            pattern.created_at.to_rfc3339(),
            now,
        ],
    )
    .context("failed to insert pattern")?;
    Ok(())
}

/// Build the filtered query. Element containment uses `json_each` so the
/// limit applies after filtering.
pub(crate) fn query_patterns(
    conn: &Connection,
    criteria: &PatternCriteria,
    limit: usize,
) -> Result<Vec<Pattern>> {
    let mut sql = format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE 1 = 1");
    let mut values: Vec<rusqlite::types::Value> = Vec::new();

    for element in &criteria.elements {
        values.push(element.clone().into());
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM json_each(patterns.elements) WHERE value = ?{})",
            values.len()
        ));
    }
    if let Some(domain) = &criteria.domain {
        values.push(domain.clone().into());
        sql.push_str(&format!(" AND context_domain = ?{}", values.len()));
    }
    if let Some(culture) = &criteria.culture {
        values.push(culture.clone().into());
        sql.push_str(&format!(" AND cultural_context = ?{}", values.len()));
    }
    if let Some(min) = criteria.min_strength {
        values.push(min.into());
        sql.push_str(&format!(" AND strength >= ?{}", values.len()));
    }
    values.push((limit as i64).into());
    sql.push_str(&format!(
        " ORDER BY strength DESC, created_at DESC LIMIT ?{}",
        values.len()
    ));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), read_pattern_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(PatternRow::into_pattern).collect()
}

pub(crate) fn get_pattern(conn: &Connection, id: &str) -> Result<Option<Pattern>> {
    let row = conn
        .query_row(
            &format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE id = ?1"),
            params![id],
            read_pattern_row,
        )
        .optional()?;
    row.map(PatternRow::into_pattern).transpose()
}

pub(crate) fn update_pattern(
    conn: &Connection,
    id: &str,
    verification_count: u32,
    strength: f64,
) -> Result<()> {
    let rows = conn.execute(
        "UPDATE patterns SET verification_count = ?1, strength = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            verification_count,
            strength.clamp(0.0, 1.0),
            Utc::now().to_rfc3339(),
            id
        ],
    )?;
    anyhow::ensure!(rows > 0, "pattern not found: {id}");
    Ok(())
}

pub(crate) fn insert_contribution(conn: &Connection, contribution: &Contribution) -> Result<()> {
    conn.execute(
        "INSERT INTO pattern_contributions (pattern_id, contributor_id, contribution_type, impact_score, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            contribution.pattern_id,
            contribution.contributor_id,
            contribution.kind.as_str(),
            contribution.kind.impact_score(),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_observation(conn: &Connection, observation: &Observation) -> Result<()> {
    let metadata = if observation.metadata.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&observation.metadata)?)
    };
    conn.execute(
        "INSERT INTO observations (subject_id, query_text, query_type, primary_element, confidence, metadata, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            observation.subject_id,
            observation.query_text,
            observation.query_type,
            observation.primary_element,
            observation.confidence,
            metadata,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub(crate) fn summarize(conn: &Connection, top_domains: usize) -> Result<PatternSummary> {
    let (total, average): (i64, Option<f64>) = conn.query_row(
        "SELECT COUNT(*), AVG(strength) FROM patterns",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT context_domain FROM patterns GROUP BY context_domain \
         ORDER BY COUNT(*) DESC, context_domain ASC LIMIT ?1",
    )?;
    let domains = stmt
        .query_map(params![top_domains as i64], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PatternSummary {
        total_patterns: total as usize,
        average_strength: average.unwrap_or(0.0),
        top_domains: domains,
    })
}

/// Raw column values; JSON and timestamp parsing happens outside the row closure.
struct PatternRow {
    id: String,
    elements: String,
    context_domain: String,
    cultural_context: String,
    age_demographic: String,
    success_metrics: String,
    integration_wisdom: String,
    discovered_by: String,
    verification_count: u32,
    strength: f64,
    created_at: String,
}

fn read_pattern_row(row: &Row<'_>) -> rusqlite::Result<PatternRow> {
    Ok(PatternRow {
        id: row.get(0)?,
        elements: row.get(1)?,
        context_domain: row.get(2)?,
        cultural_context: row.get(3)?,
        age_demographic: row.get(4)?,
        success_metrics: row.get(5)?,
        integration_wisdom: row.get(6)?,
        discovered_by: row.get(7)?,
        verification_count: row.get(8)?,
        strength: row.get(9)?,
        created_at: row.get(10)?,
    })
}

impl PatternRow {
    fn into_pattern(self) -> Result<Pattern> {
        let elements: Vec<String> = serde_json::from_str(&self.elements)
            .with_context(|| format!("corrupt elements for pattern {}", self.id))?;
        let success_metrics: SuccessMetrics = serde_json::from_str(&self.success_metrics)
            .with_context(|| format!("corrupt success metrics for pattern {}", self.id))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .with_context(|| format!("corrupt created_at for pattern {}", self.id))?
            .with_timezone(&Utc);
        Ok(Pattern {
            id: self.id,
            elements,
            context_domain: self.context_domain,
            cultural_context: self.cultural_context,
            age_demographic: self.age_demographic,
            success_metrics,
            integration_wisdom: self.integration_wisdom,
            discovered_by: self.discovered_by,
            verification_count: self.verification_count,
            strength: self.strength,
            created_at,
        })
    }
}

#[async_trait]
impl PatternStore for SqliteStore {
    async fn insert_pattern(&self, pattern: &Pattern) -> crate::error::Result<String> {
        let pattern = pattern.clone();
        self.with_conn(move |conn| {
            insert_pattern(conn, &pattern)?;
            Ok(pattern.id)
        })
        .await
    }

    async fn query_patterns(
        &self,
        criteria: &PatternCriteria,
        limit: usize,
    ) -> crate::error::Result<Vec<Pattern>> {
        let criteria = criteria.clone();
        self.with_conn(move |conn| query_patterns(conn, &criteria, limit))
            .await
    }

    async fn get_pattern(&self, id: &str) -> crate::error::Result<Option<Pattern>> {
        let id = id.to_string();
        self.with_conn(move |conn| get_pattern(conn, &id)).await
    }

    async fn update_pattern(
        &self,
        id: &str,
        verification_count: u32,
        strength: f64,
    ) -> crate::error::Result<()> {
        let id = id.to_string();
        self.with_conn(move |conn| update_pattern(conn, &id, verification_count, strength))
            .await
    }

    async fn record_contribution(&self, contribution: &Contribution) -> crate::error::Result<()> {
        let contribution = contribution.clone();
        self.with_conn(move |conn| insert_contribution(conn, &contribution))
            .await
    }

    async fn record_observation(&self, observation: &Observation) -> crate::error::Result<()> {
        let observation = observation.clone();
        self.with_conn(move |conn| insert_observation(conn, &observation))
            .await
    }

    async fn summarize(&self, top_domains: usize) -> crate::error::Result<PatternSummary> {
        self.with_conn(move |conn| summarize(conn, top_domains)).await
    }
}
