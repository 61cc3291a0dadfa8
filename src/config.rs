use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::Error;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Endpoints and browser-identity headers of the scraped marketplace.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub graphql_url: String,
    pub signin_url: String,
    pub refresh_url: String,
    /// Sent as both `Origin` and `Referer`; the identity provider rejects
    /// requests without them.
    pub origin: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScrapeConfig {
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_page_size() -> i64 {
    30
}
fn default_max_pages() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
}

/// Sign-in identity, read from the environment rather than the config
/// file so credentials stay out of version control.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    /// Reads `HARVESTER_EMAIL` / `HARVESTER_PASSWORD`. Missing values are
    /// fatal at process start, not per call.
    pub fn from_env() -> Result<Self, Error> {
        let email = std::env::var("HARVESTER_EMAIL")
            .map_err(|_| Error::Config("HARVESTER_EMAIL not set".into()))?;
        let password = std::env::var("HARVESTER_PASSWORD")
            .map_err(|_| Error::Config("HARVESTER_PASSWORD not set".into()))?;
        if email.is_empty() || password.is_empty() {
            return Err(Error::Config(
                "HARVESTER_EMAIL and HARVESTER_PASSWORD must be non-empty".into(),
            ));
        }
        Ok(Self { email, password })
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.scrape.page_size < 1 {
        anyhow::bail!("scrape.page_size must be >= 1");
    }
    if config.scrape.max_pages == 0 {
        anyhow::bail!("scrape.max_pages must be >= 1");
    }
    for (name, url) in [
        ("source.graphql_url", &config.source.graphql_url),
        ("source.signin_url", &config.source.signin_url),
        ("source.refresh_url", &config.source.refresh_url),
    ] {
        if url.is_empty() {
            anyhow::bail!("{} must not be empty", name);
        }
    }

    Ok(config)
}
