use std::sync::Arc;

use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gamblesim_core::{generate_server_seed, SystemClock};
use gamblesim_shared::SqliteStore;

mod assets;
mod auth;
mod config;
mod routes;
mod state;

use crate::{auth::ApiKeyAuth, config::ServerConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    let store = SqliteStore::connect(&config.database_url).await?;

    let server_seed = match &config.server_seed {
        Some(seed) => {
            store.rotate_server_seed(seed).await?;
            seed.clone()
        }
        None => store.server_seed_or_init(generate_server_seed).await?,
    };

    let registry = store
        .load_registry(config.game.clone(), Arc::new(SystemClock))
        .await;
    info!(
        sessions = registry.sessions().count(),
        current = %registry.current_session_id(),
        "registry loaded"
    );

    let state = Arc::new(AppState::new(
        registry,
        store,
        server_seed,
        Arc::new(ApiKeyAuth::new(config.api_key.clone())),
        config.assets_dir.clone(),
        config.public_url.clone(),
    ));
    info!(server_seed_hash = %state.server_seed_hash, "server seed ready");

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("listening on {}", config.bind);
    axum::serve(listener, app).await?;
    Ok(())
}
