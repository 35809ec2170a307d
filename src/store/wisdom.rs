use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{SqliteStore, WisdomStore};
use crate::bus::types::{AgentLearning, MessageKind, WisdomExchange};

pub(crate) fn insert_exchange(conn: &Connection, exchange: &WisdomExchange) -> Result<()> {
    conn.execute(
        "INSERT INTO wisdom_exchanges (id, from_agent, to_agent, content, context, kind, relevance, applied_count, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            exchange.id,
            exchange.from_agent,
            exchange.to_agent,
            exchange.content,
            serde_json::to_string(&exchange.context)?,
            exchange.kind.as_str(),
            exchange.relevance,
            exchange.applied_count,
            exchange.created_at.to_rfc3339(),
        ],
    )
    .context("failed to insert wisdom exchange")?;
    Ok(())
}

pub(crate) fn query_exchanges(
    conn: &Connection,
    to_agent: &str,
    min_relevance: f64,
    limit: usize,
) -> Result<Vec<WisdomExchange>> {
    let mut stmt = conn.prepare(
        "SELECT id, from_agent, to_agent, content, context, kind, relevance, applied_count, created_at \
         FROM wisdom_exchanges WHERE to_agent = ?1 AND relevance >= ?2 \
         ORDER BY relevance DESC, created_at DESC LIMIT ?3",
    )?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = stmt
        .query_map(params![to_agent, min_relevance, limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, f64>(6)?,
                row.get::<_, u32>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(id, from_agent, to_agent, content, context, kind, relevance, applied_count, created_at)| {
                let kind: MessageKind = kind.parse().map_err(anyhow::Error::msg)?;
                Ok(WisdomExchange {
                    context: serde_json::from_str(&context)
                        .with_context(|| format!("corrupt context for exchange {id}"))?,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .with_context(|| format!("corrupt created_at for exchange {id}"))?
                        .with_timezone(&Utc),
                    id,
                    from_agent,
                    to_agent,
                    content,
                    kind,
                    relevance,
                    applied_count,
                })
            },
        )
        .collect()
}

pub(crate) fn increment_applied(conn: &Connection, exchange_id: &str) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE wisdom_exchanges SET applied_count = applied_count + 1 WHERE id = ?1",
        params![exchange_id],
    )?;
    Ok(rows > 0)
}

pub(crate) fn insert_learning(conn: &Connection, learning: &AgentLearning) -> Result<()> {
    conn.execute(
        "INSERT INTO agent_learning_log (agent_name, learning_type, content, integration_successful, impact_metrics, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            learning.agent_name,
            learning.kind.as_str(),
            learning.content,
            learning.integration_successful,
            serde_json::to_string(&learning.impact)?,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

#[async_trait]
impl WisdomStore for SqliteStore {
    async fn insert_exchange(&self, exchange: &WisdomExchange) -> crate::error::Result<()> {
        let exchange = exchange.clone();
        self.with_conn(move |conn| insert_exchange(conn, &exchange)).await
    }

    async fn query_exchanges(
        &self,
        to_agent: &str,
        min_relevance: f64,
        limit: usize,
    ) -> crate::error::Result<Vec<WisdomExchange>> {
        let to_agent = to_agent.to_string();
        self.with_conn(move |conn| query_exchanges(conn, &to_agent, min_relevance, limit))
            .await
    }

    async fn increment_applied(&self, exchange_id: &str) -> crate::error::Result<bool> {
        let exchange_id = exchange_id.to_string();
        self.with_conn(move |conn| increment_applied(conn, &exchange_id))
            .await
    }

    async fn insert_learning(&self, learning: &AgentLearning) -> crate::error::Result<()> {
        let learning = learning.clone();
        self.with_conn(move |conn| insert_learning(conn, &learning)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::types::{LearningImpact, LearningKind, MessageContext};
    use serde_json::json;

    fn exchange(id: &str, to: &str, relevance: f64) -> WisdomExchange {
        let mut context = MessageContext::new();
        context.insert("element".into(), json!("water"));
        WisdomExchange {
            id: id.to_string(),
            from_agent: "FireAgent".into(),
            to_agent: to.to_string(),
            content: "the key is letting it move".into(),
            context,
            kind: MessageKind::Wisdom,
            relevance,
            applied_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn query_filters_recipient_and_threshold() {
        let conn = crate::db::open_memory_database().unwrap();
        insert_exchange(&conn, &exchange("a", "WaterAgent", 0.9)).unwrap();
        insert_exchange(&conn, &exchange("b", "WaterAgent", 0.6)).unwrap();
        insert_exchange(&conn, &exchange("c", "WaterAgent", 0.8)).unwrap();
        insert_exchange(&conn, &exchange("d", "EarthAgent", 0.95)).unwrap();

        let found = query_exchanges(&conn, "WaterAgent", 0.75, 10).unwrap();
        let ids: Vec<&str> = found.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(found[0].context_str("element"), Some("water"));
    }

    #[test]
    fn query_is_capped_at_limit() {
        let conn = crate::db::open_memory_database().unwrap();
        for (i, relevance) in [0.5, 0.9, 0.7, 0.8].into_iter().enumerate() {
            insert_exchange(&conn, &exchange(&format!("e{i}"), "WaterAgent", relevance)).unwrap();
        }

        let found = query_exchanges(&conn, "WaterAgent", 0.0, 2).unwrap();
        let ids: Vec<&str> = found.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e3"]);
    }

    #[test]
    fn increment_applied_reports_missing_rows() {
        let conn = crate::db::open_memory_database().unwrap();
        insert_exchange(&conn, &exchange("a", "WaterAgent", 0.9)).unwrap();

        assert!(increment_applied(&conn, "a").unwrap());
        assert!(increment_applied(&conn, "a").unwrap());
        assert!(!increment_applied(&conn, "missing").unwrap());

        let found = query_exchanges(&conn, "WaterAgent", 0.0, 10).unwrap();
        assert_eq!(found[0].applied_count, 2);
    }

    #[test]
    fn learning_rows_are_recorded() {
        let conn = crate::db::open_memory_database().unwrap();
        insert_learning(
            &conn,
            &AgentLearning {
                agent_name: "WaterAgent".into(),
                kind: LearningKind::WisdomIntegration,
                content: "integrated fire-water pattern".into(),
                integration_successful: true,
                impact: LearningImpact {
                    pattern_strength: Some(0.6),
                    ..Default::default()
                },
            },
        )
        .unwrap();

        let (kind, impact): (String, String) = conn
            .query_row(
                "SELECT learning_type, impact_metrics FROM agent_learning_log",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(kind, "wisdom_integration");
        assert_eq!(impact, r#"{"pattern_strength":0.6}"#);
    }
}
