//! Durable key/value store on SQLite, holding the registry snapshot and the
//! server seed.

use std::{str::FromStr, sync::Arc};

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};
use tracing::{debug, warn};

use gamblesim_core::{derive_hash_hex, Clock, GameConfig, Registry};

pub const STATE_KEY: &str = "gamblesim_data";
pub const SERVER_SEED_KEY: &str = "server_seed";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("could not encode state: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and run migrations.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // every connection to an in-memory database gets its own database
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    pub async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let ts = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(ts)
        .execute(&self.pool)
        .await?;
        debug!(key, bytes = value.len(), "stored");
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let done = sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    /// Load the persisted registry. A read failure is not fatal: the caller
    /// gets a fresh registry and the problem is logged.
    pub async fn load_registry(&self, config: GameConfig, clock: Arc<dyn Clock>) -> Registry {
        let stored = match self.get(STATE_KEY).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(error = %err, "could not read stored state");
                None
            }
        };
        Registry::restore_or_default(stored.as_deref(), config, clock)
    }

    pub async fn save_registry(&self, registry: &Registry) -> Result<(), StoreError> {
        let json = registry.to_json()?;
        self.put(STATE_KEY, &json).await
    }

    /// The stored server seed, or `fallback()` stored as the new one.
    pub async fn server_seed_or_init(
        &self,
        fallback: impl FnOnce() -> String,
    ) -> Result<String, StoreError> {
        if let Some(seed) = self.get(SERVER_SEED_KEY).await? {
            return Ok(seed);
        }
        let seed = fallback();
        self.put(SERVER_SEED_KEY, &seed).await?;
        Ok(seed)
    }

    /// Replace the server seed. Returns the hash to publish.
    pub async fn rotate_server_seed(&self, seed: &str) -> Result<String, StoreError> {
        self.put(SERVER_SEED_KEY, seed).await?;
        Ok(derive_hash_hex(seed.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamblesim_core::ManualClock;

    async fn memory() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn put_overwrites_and_remove_reports() {
        let store = memory().await;
        assert_eq!(store.get("k").await.unwrap(), None);
        store.put("k", "one").await.unwrap();
        store.put("k", "two").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));
        assert!(store.remove("k").await.unwrap());
        assert!(!store.remove("k").await.unwrap());
    }

    #[tokio::test]
    async fn registry_survives_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("state.db").display());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(5_000));

        let store = SqliteStore::connect(&url).await.unwrap();
        let mut reg = store.load_registry(GameConfig::default(), clock.clone()).await;
        let sid = reg.current_session_id().to_string();
        let pid = reg.add_player(&sid).unwrap();
        store.save_registry(&reg).await.unwrap();
        drop(store);

        let reopened = SqliteStore::connect(&url).await.unwrap();
        let back = reopened.load_registry(GameConfig::default(), clock).await;
        assert_eq!(back.current_session_id(), sid);
        assert!(back.player(&sid, &pid).is_ok());
    }

    #[tokio::test]
    async fn unreadable_state_starts_fresh() {
        let store = memory().await;
        store.put(STATE_KEY, "{broken").await.unwrap();
        let reg = store
            .load_registry(GameConfig::default(), Arc::new(ManualClock::new(0)))
            .await;
        assert_eq!(reg.sessions().count(), 1);
    }

    #[tokio::test]
    async fn server_seed_is_created_once() {
        let store = memory().await;
        let first = store.server_seed_or_init(|| "alpha".into()).await.unwrap();
        let second = store.server_seed_or_init(|| "beta".into()).await.unwrap();
        assert_eq!(first, "alpha");
        assert_eq!(second, "alpha");
        let hash = store.rotate_server_seed("gamma").await.unwrap();
        assert_eq!(hash, derive_hash_hex(b"gamma"));
        assert_eq!(store.get(SERVER_SEED_KEY).await.unwrap().as_deref(), Some("gamma"));
    }
}
