//! SQL DDL for the durable collaborator tables.
//!
//! Defines `patterns`, `pattern_contributions`, `observations`,
//! `wisdom_exchanges`, `agent_learning_log`, and `schema_meta`. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization. The `field_cache` table
//! arrives with migration v2.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Promoted patterns
CREATE TABLE IF NOT EXISTS patterns (
    id TEXT PRIMARY KEY,
    elements TEXT NOT NULL,
    element_key TEXT NOT NULL,
    context_domain TEXT NOT NULL,
    cultural_context TEXT NOT NULL,
    age_demographic TEXT NOT NULL,
    success_metrics TEXT NOT NULL,
    integration_wisdom TEXT NOT NULL,
    discovered_by TEXT NOT NULL,
    verification_count INTEGER NOT NULL DEFAULT 0,
    strength REAL NOT NULL CHECK(strength >= 0.0 AND strength <= 1.0),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patterns_strength ON patterns(strength);
CREATE INDEX IF NOT EXISTS idx_patterns_domain ON patterns(context_domain);
CREATE INDEX IF NOT EXISTS idx_patterns_key ON patterns(element_key);

-- Verification history
CREATE TABLE IF NOT EXISTS pattern_contributions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern_id TEXT NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
    contributor_id TEXT NOT NULL,
    contribution_type TEXT NOT NULL CHECK(contribution_type IN ('validation','invalidation')),
    impact_score REAL NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_contributions_pattern ON pattern_contributions(pattern_id);

-- Raw interaction observations
CREATE TABLE IF NOT EXISTS observations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id TEXT NOT NULL,
    query_text TEXT NOT NULL,
    query_type TEXT NOT NULL,
    primary_element TEXT NOT NULL,
    confidence REAL NOT NULL,
    metadata TEXT,
    created_at TEXT NOT NULL
);

-- Wisdom exchanged between agents
CREATE TABLE IF NOT EXISTS wisdom_exchanges (
    id TEXT PRIMARY KEY,
    from_agent TEXT NOT NULL,
    to_agent TEXT NOT NULL,
    content TEXT NOT NULL,
    context TEXT NOT NULL,
    kind TEXT NOT NULL CHECK(kind IN ('wisdom','pattern')),
    relevance REAL NOT NULL CHECK(relevance >= 0.0 AND relevance <= 1.0),
    applied_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_wisdom_recipient ON wisdom_exchanges(to_agent, relevance);

-- Agent learning history
CREATE TABLE IF NOT EXISTS agent_learning_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_name TEXT NOT NULL,
    learning_type TEXT NOT NULL CHECK(learning_type IN ('pattern_recognition','wisdom_integration','user_feedback','collective_insight')),
    content TEXT NOT NULL,
    integration_successful INTEGER NOT NULL,
    impact_metrics TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "patterns",
            "pattern_contributions",
            "observations",
            "wisdom_exchanges",
            "agent_learning_log",
            "schema_meta",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
        assert!(!tables.contains(&"field_cache".to_string()));
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // second call should not error
    }

    #[test]
    fn strength_is_constrained_to_unit_interval() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO patterns (id, elements, element_key, context_domain, cultural_context, \
             age_demographic, success_metrics, integration_wisdom, discovered_by, strength, \
             created_at, updated_at) \
             VALUES ('p1', '[]', '', 'general', 'universal', 'mixed', '{}', '', 'test', 1.5, 'now', 'now')",
            [],
        );
        assert!(result.is_err());
    }
}
