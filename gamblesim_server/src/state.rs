use std::{path::PathBuf, sync::Arc};

use tokio::sync::{Mutex, MutexGuard};
use tracing::error;
use url::Url;

use gamblesim_core::{derive_hash_hex, Registry};
use gamblesim_shared::SqliteStore;

use crate::auth::AdminAuth;

pub struct AppState {
    registry: Mutex<Registry>,
    pub store: SqliteStore,
    pub server_seed: String,
    pub server_seed_hash: String,
    pub auth: Arc<dyn AdminAuth>,
    pub assets_dir: PathBuf,
    pub public_url: Url,
}

impl AppState {
    pub fn new(
        registry: Registry,
        store: SqliteStore,
        server_seed: String,
        auth: Arc<dyn AdminAuth>,
        assets_dir: PathBuf,
        public_url: Url,
    ) -> Self {
        let server_seed_hash = derive_hash_hex(server_seed.as_bytes());
        Self {
            registry: Mutex::new(registry),
            store,
            server_seed,
            server_seed_hash,
            auth,
            assets_dir,
            public_url,
        }
    }

    /// Exclusive access to the registry. Hold the guard until the change has
    /// been persisted so snapshots reach the store in mutation order.
    pub async fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().await
    }

    /// Write a snapshot. Failures are logged; the in-memory registry stays
    /// authoritative.
    pub async fn persist(&self, registry: &Registry) {
        if let Err(err) = self.store.save_registry(registry).await {
            error!(error = %err, "failed to persist registry");
        }
    }
}
