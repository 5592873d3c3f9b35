use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;

use crate::models::{PlayerProgress, Settings};

const SETTINGS_KEY: &str = "settings";
const PLAYER_KEY: &str = "playerStats";
const LAST_RUN_KEY: &str = "lastRun";

/// Local persistence: a record table for wholesale JSON documents and a
/// cache table with per-entry TTLs.
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    pub fn open() -> Result<Self> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        Ok(Self { conn, path })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn,
            path: PathBuf::from(":memory:"),
        };
        store.init()?;
        Ok(store)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn default_path() -> Result<PathBuf> {
        // XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "scout") {
            Ok(proj_dirs.data_dir().join("scout.db"))
        } else {
            Ok(PathBuf::from("scout.db"))
        }
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                stored_at INTEGER NOT NULL,
                ttl_ms INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='records'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!("Store not initialized. Run 'scout init' first."));
        }
        Ok(())
    }

    // --- Wholesale records ---

    pub fn get_record<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT value FROM records WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        match raw {
            Some(raw) => {
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("Corrupt '{key}' record"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn put_record<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.conn.execute(
            "INSERT INTO records (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                           updated_at = datetime('now')",
            params![key, raw],
        )?;
        Ok(())
    }

    pub fn load_settings(&self) -> Result<Settings> {
        Ok(self.get_record(SETTINGS_KEY)?.unwrap_or_default())
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.put_record(SETTINGS_KEY, settings)
    }

    pub fn load_progress(&self) -> Result<Option<PlayerProgress>> {
        self.get_record(PLAYER_KEY)
    }

    pub fn save_progress(&self, progress: &PlayerProgress) -> Result<()> {
        self.put_record(PLAYER_KEY, progress)
    }

    pub fn load_last_run(&self) -> Result<Option<crate::models::LastRun>> {
        self.get_record(LAST_RUN_KEY)
    }

    pub fn save_last_run(&self, last_run: &crate::models::LastRun) -> Result<()> {
        self.put_record(LAST_RUN_KEY, last_run)
    }

    // --- Cache rows (TTL handling lives in cache.rs) ---

    pub fn cache_row(&self, key: &str) -> Result<Option<(String, i64, i64)>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value, stored_at, ttl_ms FROM cache WHERE key = ?1",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?)
    }

    pub fn put_cache_row(&self, key: &str, value: &str, stored_at: i64, ttl_ms: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO cache (key, value, stored_at, ttl_ms) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                           stored_at = excluded.stored_at,
                                           ttl_ms = excluded.ttl_ms",
            params![key, value, stored_at, ttl_ms],
        )?;
        Ok(())
    }

    pub fn remove_cache_row(&self, key: &str) -> Result<()> {
        self.conn.execute("DELETE FROM cache WHERE key = ?1", [key])?;
        Ok(())
    }

    pub fn clear_cache(&self) -> Result<usize> {
        let removed = self.conn.execute("DELETE FROM cache", [])?;
        Ok(removed)
    }

    pub fn cache_rows(&self) -> Result<Vec<(String, String, i64, i64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value, stored_at, ttl_ms FROM cache")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list cache rows")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_round_trip_wholesale() {
        let store = Store::open_in_memory().unwrap();

        // Defaults before anything is saved.
        let settings = store.load_settings().unwrap();
        assert!(settings.enable_cache);
        assert_eq!(settings.model, "gpt-4o");

        let mut settings = settings;
        settings.api_key = "sk-test".to_string();
        settings.auto_research = true;
        store.save_settings(&settings).unwrap();

        let loaded = store.load_settings().unwrap();
        assert_eq!(loaded.api_key, "sk-test");
        assert!(loaded.auto_research);
    }

    #[test]
    fn test_progress_round_trip() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.load_progress().unwrap().is_none());

        let mut progress = PlayerProgress::new("HERO_DEV");
        progress.available_points = 3;
        store.save_progress(&progress).unwrap();

        let loaded = store.load_progress().unwrap().unwrap();
        assert_eq!(loaded.name, "HERO_DEV");
        assert_eq!(loaded.available_points, 3);
        assert_eq!(loaded.skills.len(), crate::progress::SKILLS.len());
    }

    #[test]
    fn test_record_overwrite() {
        let store = Store::open_in_memory().unwrap();
        store.put_record("k", &serde_json::json!({"v": 1})).unwrap();
        store.put_record("k", &serde_json::json!({"v": 2})).unwrap();
        let value: serde_json::Value = store.get_record("k").unwrap().unwrap();
        assert_eq!(value["v"], 2);
    }

    #[test]
    fn test_cache_rows_round_trip() {
        let store = Store::open_in_memory().unwrap();
        store.put_cache_row("cache_a", "{}", 100, 5000).unwrap();
        let (value, stored_at, ttl) = store.cache_row("cache_a").unwrap().unwrap();
        assert_eq!(value, "{}");
        assert_eq!(stored_at, 100);
        assert_eq!(ttl, 5000);

        store.remove_cache_row("cache_a").unwrap();
        assert!(store.cache_row("cache_a").unwrap().is_none());
    }

    #[test]
    fn test_clear_cache_leaves_records() {
        let store = Store::open_in_memory().unwrap();
        store.put_record("keep", &serde_json::json!(1)).unwrap();
        store.put_cache_row("cache_a", "{}", 0, 0).unwrap();
        store.put_cache_row("cache_b", "{}", 0, 0).unwrap();

        assert_eq!(store.clear_cache().unwrap(), 2);
        let kept: Option<serde_json::Value> = store.get_record("keep").unwrap();
        assert!(kept.is_some());
    }
}
