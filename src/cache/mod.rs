use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::{GatewayError, Result};

const DEFAULT_HISTORY_WINDOW_HOURS: i64 = 24;
const DEFAULT_HISTORY_LIMIT: i64 = 24;

/// One row read back out of a history table: when it was recorded and the
/// JSON payload that was appended.
#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

/// `rusqlite`-backed key/value response cache plus append-only history
/// tables (spec §4.7/§6). `rusqlite::Connection` is not `Sync`, so all
/// access goes through a blocking-pool-confined mutex and every public
/// method is an async wrapper around `spawn_blocking`, mirroring the
/// teacher's own pattern of wrapping a synchronous store
/// (`BlockchainFileSystem` over `sled`) behind an async service type.
#[derive(Clone)]
pub struct Cache {
    conn: Arc<StdMutex<Connection>>,
}

impl Cache {
    /// Opens (creating if absent) the sqlite file at `path`, enables WAL
    /// mode and `synchronous=NORMAL`, and creates the schema if missing.
    pub async fn open(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = Connection::open(&path)
                .map_err(|e| GatewayError::Retryable(format!("opening cache db {path}: {e}")))?;
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| GatewayError::Retryable(format!("setting WAL mode: {e}")))?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(|e| GatewayError::Retryable(format!("setting synchronous=NORMAL: {e}")))?;
            create_schema(&conn)
                .map_err(|e| GatewayError::Retryable(format!("creating cache schema: {e}")))?;
            Ok(conn)
        })
        .await
        .map_err(|e| GatewayError::Retryable(format!("cache open task panicked: {e}")))??;

        Ok(Self {
            conn: Arc::new(StdMutex::new(conn)),
        })
    }

    /// Returns the stored payload for `key`/`params` only if it was
    /// written within `max_age_seconds`. `None` means "unknown, fetch
    /// upstream" — it is never an authoritative negative answer.
    pub async fn get(&self, key: &str, params: &str, max_age_seconds: u64) -> Result<Option<Value>> {
        let conn = self.conn.clone();
        let key = key.to_string();
        let params_key = params.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Value>> {
            let conn = conn.lock().expect("cache connection poisoned");
            let row: Option<(String, String, i64)> = conn
                .query_row(
                    "SELECT data, timestamp, ttl FROM cache WHERE endpoint = ?1 AND params = ?2",
                    params![key, params_key],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )
                .optional()
                .map_err(|e| GatewayError::Retryable(format!("cache get: {e}")))?;

            let Some((data, timestamp, _ttl)) = row else {
                return Ok(None);
            };
            let stored_at: DateTime<Utc> = timestamp
                .parse()
                .map_err(|e| GatewayError::Retryable(format!("cache timestamp parse: {e}")))?;
            let age = Utc::now() - stored_at;
            if age > ChronoDuration::seconds(max_age_seconds as i64) {
                return Ok(None);
            }
            let value: Value = serde_json::from_str(&data)
                .map_err(|e| GatewayError::Retryable(format!("cache payload decode: {e}")))?;
            Ok(Some(value))
        })
        .await
        .map_err(|e| GatewayError::Retryable(format!("cache get task panicked: {e}")))?
    }

    /// Upserts `payload` for `key`/`params`, overwriting any existing
    /// entry atomically.
    pub async fn put(&self, key: &str, payload: &Value, params: &str, ttl_seconds: u64) -> Result<()> {
        let conn = self.conn.clone();
        let key = key.to_string();
        let params_key = params.to_string();
        let data = serde_json::to_string(payload)
            .map_err(|e| GatewayError::Retryable(format!("cache payload encode: {e}")))?;
        let timestamp = Utc::now().to_rfc3339();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn.lock().expect("cache connection poisoned");
            conn.execute(
                "INSERT INTO cache (endpoint, data, params, timestamp, ttl) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(endpoint, params) DO UPDATE SET data = excluded.data,
                    timestamp = excluded.timestamp, ttl = excluded.ttl",
                params![key, data, params_key, timestamp, ttl_seconds as i64],
            )
            .map_err(|e| GatewayError::Retryable(format!("cache put: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| GatewayError::Retryable(format!("cache put task panicked: {e}")))?
    }

    pub async fn append_network_status(&self, data: &Value) -> Result<()> {
        self.append_history("network_status_history", data, None).await
    }

    /// `block_count` is the natural filter column for mint-analytics rows:
    /// callers diffing `mints/new` read the most recent row by this column.
    pub async fn append_mint_analytics(&self, data: &Value, block_count: u32) -> Result<()> {
        self.append_history(
            "mint_analytics_history",
            data,
            Some(("block_count", block_count.to_string())),
        )
        .await
    }

    pub async fn append_pump_tokens(&self, data: &Value) -> Result<()> {
        self.append_history("pump_tokens_history", data, None).await
    }

    pub async fn append_rpc_nodes(&self, data: &Value) -> Result<()> {
        self.append_history("rpc_nodes_history", data, None).await
    }

    pub async fn append_performance_metrics(&self, data: &Value) -> Result<()> {
        self.append_history("performance_metrics_history", data, None).await
    }

    pub async fn append_token_performance(&self, data: &Value, mint: &str) -> Result<()> {
        self.append_history(
            "token_performance_history",
            data,
            Some(("mint", mint.to_string())),
        )
        .await
    }

    async fn append_history(
        &self,
        table: &'static str,
        data: &Value,
        filter: Option<(&'static str, String)>,
    ) -> Result<()> {
        let conn = self.conn.clone();
        let data = serde_json::to_string(data)
            .map_err(|e| GatewayError::Retryable(format!("history payload encode: {e}")))?;
        let timestamp = Utc::now().to_rfc3339();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn.lock().expect("cache connection poisoned");
            match filter {
                Some((column, value)) => {
                    let sql = format!(
                        "INSERT INTO {table} (timestamp, data, {column}) VALUES (?1, ?2, ?3)"
                    );
                    conn.execute(&sql, params![timestamp, data, value])
                }
                None => {
                    let sql = format!("INSERT INTO {table} (timestamp, data) VALUES (?1, ?2)");
                    conn.execute(&sql, params![timestamp, data])
                }
            }
            .map_err(|e| GatewayError::Retryable(format!("history append into {table}: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| GatewayError::Retryable(format!("history append task panicked: {e}")))?
    }

    /// Reads rows from `table` newer than `window_hours` ago (default 24h),
    /// most recent first, capped at `limit` (default 24). `filter` narrows
    /// to rows matching a specific filter-column value (e.g. a mint).
    pub async fn read_history(
        &self,
        table: &'static str,
        window_hours: Option<i64>,
        limit: Option<i64>,
        filter: Option<(&'static str, String)>,
    ) -> Result<Vec<HistoryRow>> {
        let conn = self.conn.clone();
        let window_hours = window_hours.unwrap_or(DEFAULT_HISTORY_WINDOW_HOURS);
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        let cutoff = (Utc::now() - ChronoDuration::hours(window_hours)).to_rfc3339();

        tokio::task::spawn_blocking(move || -> Result<Vec<HistoryRow>> {
            let conn = conn.lock().expect("cache connection poisoned");
            let sql = match &filter {
                Some((column, _)) => format!(
                    "SELECT timestamp, data FROM {table} WHERE timestamp >= ?1 AND {column} = ?2 \
                     ORDER BY timestamp DESC LIMIT ?3"
                ),
                None => format!(
                    "SELECT timestamp, data FROM {table} WHERE timestamp >= ?1 \
                     ORDER BY timestamp DESC LIMIT ?2"
                ),
            };
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| GatewayError::Retryable(format!("history read prepare for {table}: {e}")))?;

            let rows: rusqlite::Result<Vec<(String, String)>> = match &filter {
                Some((_, value)) => stmt
                    .query_map(params![cutoff, value, limit], |r| Ok((r.get(0)?, r.get(1)?)))
                    .and_then(Iterator::collect),
                None => stmt
                    .query_map(params![cutoff, limit], |r| Ok((r.get(0)?, r.get(1)?)))
                    .and_then(Iterator::collect),
            };
            let rows = rows.map_err(|e| GatewayError::Retryable(format!("history read for {table}: {e}")))?;

            rows.into_iter()
                .map(|(timestamp, data)| {
                    let timestamp = timestamp
                        .parse()
                        .map_err(|e| GatewayError::Retryable(format!("history timestamp parse: {e}")))?;
                    let data = serde_json::from_str(&data)
                        .map_err(|e| GatewayError::Retryable(format!("history payload decode: {e}")))?;
                    Ok(HistoryRow { timestamp, data })
                })
                .collect()
        })
        .await
        .map_err(|e| GatewayError::Retryable(format!("history read task panicked: {e}")))?
    }
}

fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cache (
            endpoint TEXT NOT NULL,
            data TEXT NOT NULL,
            params TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            ttl INTEGER NOT NULL,
            PRIMARY KEY (endpoint, params)
         );
         CREATE TABLE IF NOT EXISTS network_status_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            data TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS mint_analytics_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            data TEXT NOT NULL,
            block_count INTEGER
         );
         CREATE TABLE IF NOT EXISTS pump_tokens_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            data TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS rpc_nodes_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            data TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS performance_metrics_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            data TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS token_performance_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            data TEXT NOT NULL,
            mint TEXT
         );
         CREATE INDEX IF NOT EXISTS idx_mint_analytics_block_count ON mint_analytics_history(block_count);
         CREATE INDEX IF NOT EXISTS idx_token_performance_mint ON token_performance_history(mint);
        ",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn temp_cache() -> (Cache, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let cache = Cache::open(path.to_string_lossy().to_string()).await.unwrap();
        (cache, dir)
    }

    #[tokio::test]
    async fn put_then_get_within_ttl_returns_value() {
        let (cache, _dir) = temp_cache().await;
        cache.put("NETWORK_STATUS", &json!({"status": "healthy"}), "{}", 300).await.unwrap();
        let value = cache.get("NETWORK_STATUS", "{}", 300).await.unwrap();
        assert_eq!(value, Some(json!({"status": "healthy"})));
    }

    #[tokio::test]
    async fn get_beyond_max_age_returns_none() {
        let (cache, _dir) = temp_cache().await;
        cache.put("SHORT", &json!({"v": 1}), "{}", 60).await.unwrap();
        let value = cache.get("SHORT", "{}", 0).await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn put_overwrites_existing_entry() {
        let (cache, _dir) = temp_cache().await;
        cache.put("KEY", &json!({"v": 1}), "{}", 300).await.unwrap();
        cache.put("KEY", &json!({"v": 2}), "{}", 300).await.unwrap();
        let value = cache.get("KEY", "{}", 300).await.unwrap();
        assert_eq!(value, Some(json!({"v": 2})));
    }

    #[tokio::test]
    async fn history_append_and_read_window() {
        let (cache, _dir) = temp_cache().await;
        cache.append_network_status(&json!({"node_count": 10})).await.unwrap();
        cache.append_network_status(&json!({"node_count": 12})).await.unwrap();
        let rows = cache
            .read_history("network_status_history", None, None, None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].data, json!({"node_count": 12}));
    }

    #[tokio::test]
    async fn mint_analytics_history_filters_by_block_count() {
        let (cache, _dir) = temp_cache().await;
        cache.append_mint_analytics(&json!({"mints": 3}), 50).await.unwrap();
        cache.append_mint_analytics(&json!({"mints": 7}), 100).await.unwrap();
        let rows = cache
            .read_history(
                "mint_analytics_history",
                None,
                None,
                Some(("block_count", "100".to_string())),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].data, json!({"mints": 7}));
    }
}
