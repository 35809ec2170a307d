use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{SecondaryTier, SqliteStore};

fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Expired rows read as absent; they are physically removed on the next write.
pub(crate) fn get(conn: &Connection, key: &str) -> Result<Option<Vec<u8>>> {
    let value = conn
        .query_row(
            "SELECT value FROM field_cache WHERE key = ?1 AND expires_at > ?2",
            params![key, now_secs()],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()?;
    Ok(value)
}

pub(crate) fn set_with_expiry(conn: &Connection, key: &str, value: &[u8], ttl_secs: u64) -> Result<()> {
    let now = now_secs();
    let expires_at = now.saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX));
    conn.execute("DELETE FROM field_cache WHERE expires_at <= ?1", params![now])?;
    conn.execute(
        "INSERT OR REPLACE INTO field_cache (key, value, expires_at) VALUES (?1, ?2, ?3)",
        params![key, value, expires_at],
    )?;
    Ok(())
}

pub(crate) fn delete(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM field_cache WHERE key = ?1", params![key])?;
    Ok(())
}

/// `pattern` uses SQLite GLOB syntax, which matches the `*` convention of key-value stores.
pub(crate) fn keys_matching(conn: &Connection, pattern: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT key FROM field_cache WHERE key GLOB ?1 AND expires_at > ?2 ORDER BY key")?;
    let keys = stmt
        .query_map(params![pattern, now_secs()], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(keys)
}

#[async_trait]
impl SecondaryTier for SqliteStore {
    async fn get(&self, key: &str) -> crate::error::Result<Option<Vec<u8>>> {
        let key = key.to_string();
        self.with_conn(move |conn| get(conn, &key)).await
    }

    async fn set_with_expiry(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> crate::error::Result<()> {
        let key = key.to_string();
        self.with_conn(move |conn| set_with_expiry(conn, &key, &value, ttl_secs))
            .await
    }

    async fn delete(&self, key: &str) -> crate::error::Result<()> {
        let key = key.to_string();
        self.with_conn(move |conn| delete(conn, &key)).await
    }

    async fn keys_matching(&self, pattern: &str) -> crate::error::Result<Vec<String>> {
        let pattern = pattern.to_string();
        self.with_conn(move |conn| keys_matching(conn, &pattern)).await
    }
}
