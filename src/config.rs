use std::env;
use std::path::PathBuf;

use anyhow::{Result, anyhow};

use crate::backend::{Backend, RestBackend};
use crate::deck::{DEFAULT_POINT_CAP, snap_point_cap};
use crate::demo::{DEFAULT_DEMO_COOLDOWN_SECS, DemoBackend};
use crate::faction::FactionTable;
use crate::http_client::DEFAULT_TIMEOUT_SECS;
use crate::recommend::{DEFAULT_RESERVE_MARGIN, RecommendConfig};
use crate::store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Demo,
    Rest,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendKind,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub default_cap: u32,
    pub recommend: RecommendConfig,
    pub factions_file: Option<PathBuf>,
    pub demo_db: Option<PathBuf>,
    pub demo_cooldown_secs: u64,
    pub http_timeout_secs: u64,
}

impl AppConfig {
    /// Reads `DECK_*` variables. Call after the dotenv files are loaded.
    pub fn from_env() -> Self {
        let backend = match env::var("DECK_BACKEND")
            .unwrap_or_else(|_| "demo".to_string())
            .trim()
            .to_lowercase()
            .as_str()
        {
            "rest" | "remote" => BackendKind::Rest,
            _ => BackendKind::Demo,
        };
        let default_cap = snap_point_cap(
            env::var("DECK_DEFAULT_CAP")
                .ok()
                .and_then(|val| val.trim().parse::<u32>().ok())
                .unwrap_or(DEFAULT_POINT_CAP),
        );
        let reserve_margin = env::var("DECK_RESERVE_MARGIN")
            .ok()
            .and_then(|val| val.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_RESERVE_MARGIN)
            .min(50);
        let demo_cooldown_secs = env::var("DECK_DEMO_COOLDOWN_SECS")
            .ok()
            .and_then(|val| val.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_DEMO_COOLDOWN_SECS)
            .min(3600);
        let http_timeout_secs = env::var("DECK_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|val| val.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .clamp(1, 120);

        Self {
            backend,
            api_url: opt_env("DECK_API_URL"),
            api_key: opt_env("DECK_API_KEY"),
            default_cap,
            recommend: RecommendConfig { reserve_margin },
            factions_file: opt_env("DECK_FACTIONS_FILE").map(PathBuf::from),
            demo_db: opt_env("DECK_DEMO_DB")
                .map(PathBuf::from)
                .or_else(store::default_db_path),
            demo_cooldown_secs,
            http_timeout_secs,
        }
    }

    pub fn make_backend(&self) -> Result<Box<dyn Backend>> {
        match self.backend {
            BackendKind::Rest => {
                let url = self
                    .api_url
                    .as_deref()
                    .ok_or_else(|| anyhow!("DECK_API_URL is required for the rest backend"))?;
                let key = self.api_key.as_deref().unwrap_or_default();
                Ok(Box::new(RestBackend::new(url, key, self.http_timeout_secs)))
            }
            BackendKind::Demo => Ok(Box::new(DemoBackend::new(
                self.demo_db.as_deref(),
                self.demo_cooldown_secs,
            )?)),
        }
    }

    /// Built-in nation table unless a file is configured. A bad file falls back with an error.
    pub fn faction_table(&self) -> Result<FactionTable> {
        match &self.factions_file {
            Some(path) => FactionTable::load(path),
            None => Ok(FactionTable::default()),
        }
    }
}

fn opt_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}
