// src/config.rs
//! Daemon configuration: environment variables (loaded through `dotenvy` in
//! `main`) plus an optional TOML seed-channel list.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const ENV_SEED_PATH: &str = "SCAMWATCH_SEED_CHANNELS_PATH";
const DEFAULT_SEED_PATH: &str = "config/seed_channels.toml";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub gateway_url: String,
    pub gateway_token: Option<String>,
    pub classifier: ClassifierConfig,
    /// Seconds between scheduled crawl cycles.
    pub crawl_interval_secs: u64,
    /// Seconds between classification sweeps.
    pub check_interval_secs: u64,
    /// Per-channel cap for the scheduled latest-posts crawl.
    pub posts_per_channel: u32,
    pub check_batch_size: u32,
    pub seed_channels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env_or("DATABASE_URL", "sqlite://scamwatch.db"),
            gateway_url: env_or("SCAMWATCH_GATEWAY_URL", "http://127.0.0.1:8081"),
            gateway_token: std::env::var("SCAMWATCH_GATEWAY_TOKEN").ok(),
            classifier: ClassifierConfig {
                endpoint: env_or(
                    "SCAMWATCH_AI_ENDPOINT",
                    "https://api.openai.com/v1/chat/completions",
                ),
                api_key: env_or("SCAMWATCH_AI_KEY", ""),
                model: env_or("SCAMWATCH_AI_MODEL", "gpt-4o-mini"),
                timeout_secs: env_u64("SCAMWATCH_AI_TIMEOUT_SECS", 30),
            },
            crawl_interval_secs: env_u64("SCAMWATCH_CRAWL_INTERVAL_SECS", 3600),
            check_interval_secs: env_u64("SCAMWATCH_CHECK_INTERVAL_SECS", 300),
            posts_per_channel: env_u64("SCAMWATCH_POSTS_PER_CHANNEL", 50) as u32,
            check_batch_size: env_u64("SCAMWATCH_CHECK_BATCH_SIZE", 10) as u32,
            seed_channels: load_seed_channels_default()?,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Seed list resolution: `$SCAMWATCH_SEED_CHANNELS_PATH`, then the default
/// path, then an empty list. A missing file is not an error; a present but
/// unparsable one is.
pub fn load_seed_channels_default() -> Result<Vec<String>> {
    if let Ok(p) = std::env::var(ENV_SEED_PATH) {
        return load_seed_channels(&PathBuf::from(p));
    }
    let default = Path::new(DEFAULT_SEED_PATH);
    if default.exists() {
        return load_seed_channels(default);
    }
    Ok(Vec::new())
}

pub fn load_seed_channels(path: &Path) -> Result<Vec<String>> {
    #[derive(Deserialize)]
    struct SeedFile {
        channels: Vec<String>,
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading seed channels from {}", path.display()))?;
    let parsed: SeedFile = toml::from_str(&content)
        .with_context(|| format!("parsing seed channels from {}", path.display()))?;
    Ok(parsed
        .channels
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect())
}
