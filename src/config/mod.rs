use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::errors::SourceError;
use crate::models::HybridMode;
use crate::pipeline::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub epg: EpgConfig,
    pub merge: MergeConfig,
    pub hybrid: HybridConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
}

/// Descriptor of the live-channel playlist source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub url: String,
    /// How long a cached playlist download stays valid.
    pub cache_ttl_secs: u64,
    pub user_agent: Option<String>,
}

/// Descriptor of the XMLTV program-guide source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpgConfig {
    pub enabled: bool,
    pub url: String,
    /// Cached guide data younger than this is considered fresh enough to
    /// skip a refetch.
    pub stale_threshold_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    pub enabled: bool,
    /// JSON file mapping canonical channel names to alternate spellings.
    pub alias_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridConfig {
    pub mode: HybridMode,
    /// JSON file mapping channel names to browser-rendered stream URLs.
    pub table_file: Option<PathBuf>,
}

/// Retry constants shared by the channel and EPG fetch steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig {
                url: "https://iptv-org.github.io/iptv/index.m3u".to_string(),
                cache_ttl_secs: 3600,
                user_agent: None,
            },
            epg: EpgConfig {
                enabled: false,
                url: String::new(),
                stale_threshold_secs: 4 * 3600,
            },
            merge: MergeConfig {
                enabled: true,
                alias_file: None,
            },
            hybrid: HybridConfig {
                mode: HybridMode::Disable,
                table_file: None,
            },
            retry: RetryConfig {
                max_attempts: 10,
                interval_secs: 3,
            },
            cache: CacheConfig {
                dir: PathBuf::from("./data/cache"),
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(&config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::create_dir_all(&default_config.cache.dir)?;
            std::fs::write(&config_file, contents)?;
            Ok(default_config)
        }
    }

    /// Check the source descriptors and retry constants. Violations are
    /// terminal on the first attempt; the pipeline never retries them.
    pub fn validate(&self) -> Result<(), SourceError> {
        Url::parse(&self.source.url)
            .map_err(|e| SourceError::invalid_config("source.url", e.to_string()))?;

        if self.epg.enabled {
            Url::parse(&self.epg.url)
                .map_err(|e| SourceError::invalid_config("epg.url", e.to_string()))?;
        }

        if self.retry.max_attempts == 0 {
            return Err(SourceError::invalid_config(
                "retry.max_attempts",
                "must be at least 1",
            ));
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            interval: Duration::from_secs(self.retry.interval_secs),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.source.cache_ttl_secs)
    }

    pub fn epg_stale_threshold(&self) -> Duration {
        Duration::from_secs(self.epg.stale_threshold_secs)
    }
}
