use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";

/// Env var taking precedence over the config file, mainly for tests and
/// one-off invocations.
pub const BASE_URL_ENV: &str = "AFAIRE_API_URL";

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Base path of the task service, e.g. `http://localhost:3000/api`.
    pub base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Config {
    fn path() -> Option<PathBuf> {
        if let Some(proj) = ProjectDirs::from("org", "afaire", "afaire") {
            return Some(proj.config_dir().join("config.toml"));
        }
        None
    }

    /// Resolution order: env var, then config file, then defaults.
    pub fn load() -> Result<Self> {
        if let Ok(url) = env::var(BASE_URL_ENV) {
            return Ok(Self { base_url: url });
        }

        if let Some(path) = Self::path()
            && path.exists()
        {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config = toml::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;
            return Ok(config);
        }

        Ok(Self::default())
    }
}
