use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::db::Store;

/// Job extraction goes stale quickly (the page may change between
/// invocations); research is expensive and stable, so it keeps for hours.
pub const JOB_TTL: Duration = Duration::from_secs(30);

pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub total_bytes: usize,
}

/// TTL'd cache over the store. Expired entries are evicted lazily on read.
pub struct CacheManager<'a> {
    store: &'a Store,
    default_ttl: Duration,
}

impl<'a> CacheManager<'a> {
    pub fn new(store: &'a Store, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    /// Request fingerprint: prefix plus normalized parameters.
    pub fn generate_key(prefix: &str, params: &[&str]) -> String {
        let sanitized: Vec<String> = params
            .iter()
            .filter(|p| !p.trim().is_empty())
            .map(|p| {
                p.to_lowercase()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join("_")
            })
            .collect();
        format!("cache_{}_{}", prefix, sanitized.join("_"))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let (raw, stored_at, ttl_ms) = match self.store.cache_row(key) {
            Ok(Some(row)) => row,
            Ok(None) => return None,
            Err(e) => {
                debug!(key, error = %e, "cache read failed");
                return None;
            }
        };

        let age_ms = chrono::Utc::now().timestamp_millis() - stored_at;
        if age_ms > ttl_ms {
            debug!(key, age_ms, ttl_ms, "cache entry expired, evicting");
            let _ = self.store.remove_cache_row(key);
            return None;
        }

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key, "cache hit");
                Some(value)
            }
            Err(e) => {
                debug!(key, error = %e, "cache entry corrupt, evicting");
                let _ = self.store.remove_cache_row(key);
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.store.put_cache_row(
            key,
            &raw,
            chrono::Utc::now().timestamp_millis(),
            ttl.as_millis() as i64,
        )
    }

    pub fn clear_all(&self) -> Result<usize> {
        self.store.clear_cache()
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let rows = self.store.cache_rows()?;
        let now = chrono::Utc::now().timestamp_millis();

        let mut stats = CacheStats {
            total_entries: rows.len(),
            valid_entries: 0,
            expired_entries: 0,
            total_bytes: 0,
        };
        for (_, value, stored_at, ttl_ms) in rows {
            stats.total_bytes += value.len();
            if now - stored_at > ttl_ms {
                stats.expired_entries += 1;
            } else {
                stats.valid_entries += 1;
            }
        }
        Ok(stats)
    }
}
