use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::engine::model::Sort;

const ENV_FILE: &str = ".env";
const API_KEY_VAR: &str = "MICROBLOG_API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout() -> u64 { 10_000 }

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default)]
    pub default_sort: Sort,
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    /// Page sizes the UI cycles through.
    #[serde(default = "default_limit_choices")]
    pub limit_choices: Vec<u32>,
    /// How many likers the UI shows next to a post.
    #[serde(default = "default_likers_preview")]
    pub likers_preview: usize,
}

fn default_limit() -> u32 { 10 }
fn default_limit_choices() -> Vec<u32> { vec![10, 20, 50] }
fn default_likers_preview() -> usize { 6 }

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_sort: Sort::Popular,
            default_limit: default_limit(),
            limit_choices: default_limit_choices(),
            likers_preview: default_likers_preview(),
        }
    }
}

impl FeedConfig {
    /// Next page size after `current`, wrapping around.
    pub fn next_limit(&self, current: u32) -> u32 {
        if self.limit_choices.is_empty() {
            return current;
        }
        match self.limit_choices.iter().position(|&l| l == current) {
            Some(idx) => self.limit_choices[(idx + 1) % self.limit_choices.len()],
            None => self.limit_choices[0],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,
}

fn default_key_file() -> PathBuf {
    PathBuf::from(".microblog-key")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            key_file: default_key_file(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .with_context(|| "Failed to parse config TOML")?;
        if config.feed.default_limit == 0 {
            anyhow::bail!("feed.default_limit must be > 0");
        }
        Ok(config)
    }

    /// Load .env file into process environment. Real env vars take precedence.
    pub fn load_env_file() {
        let path = Path::new(ENV_FILE);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return,
        };
        // Strip BOM if present (common on Windows-created files)
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
        for line in content.lines() {
            let line = line.trim().trim_matches('\r');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"').trim_matches('\'');
                if std::env::var(key).is_err() {
                    std::env::set_var(key, value);
                }
            }
        }
    }

    /// API key from the environment, if one is set. Overrides the stored key.
    pub fn api_key_override() -> Option<String> {
        match std::env::var(API_KEY_VAR) {
            Ok(key) => {
                let key = sanitize_key(&key);
                (!key.is_empty()).then_some(key)
            }
            Err(_) => None,
        }
    }
}

/// Strip carriage returns, BOM, and other invisible chars from a key value.
pub fn sanitize_key(raw: &str) -> String {
    raw.replace(['\r', '\u{feff}', '\u{200b}'], "")
        .trim()
        .to_string()
}
