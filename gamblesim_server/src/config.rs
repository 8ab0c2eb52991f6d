use std::path::PathBuf;

use anyhow::Context;
use url::Url;

use gamblesim_core::GameConfig;

/// Server settings, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub api_key: String,
    pub bind: String,
    pub assets_dir: PathBuf,
    /// Fixed server seed; a stored or freshly generated one is used otherwise.
    pub server_seed: Option<String>,
    /// Base of the join links handed out by the admin API.
    pub public_url: Url,
    pub game: GameConfig,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind = var("BIND").unwrap_or_else(|| {
            let port = var("PORT").unwrap_or_else(|| "3000".into());
            format!("127.0.0.1:{port}")
        });
        let public_url = var("PUBLIC_URL").unwrap_or_else(|| format!("http://{bind}/"));
        let public_url = Url::parse(&public_url)
            .with_context(|| format!("PUBLIC_URL is not a valid url: {public_url}"))?;

        let game = match var("GAME_CONFIG") {
            Some(path) => {
                let json = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading GAME_CONFIG {path}"))?;
                GameConfig::from_json(&json).with_context(|| format!("parsing GAME_CONFIG {path}"))?
            }
            None => GameConfig::default(),
        };

        Ok(Self {
            database_url: var("DATABASE_URL").unwrap_or_else(|| "sqlite://gamblesim.db".into()),
            api_key: var("API_KEY").unwrap_or_else(|| "dev-key".into()),
            bind,
            assets_dir: var("ASSETS_DIR").unwrap_or_else(|| "public".into()).into(),
            server_seed: var("SERVER_SEED").filter(|s| !s.is_empty()),
            public_url,
            game,
        })
    }
}
