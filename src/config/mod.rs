//! Configuration management.
//!
//! Defaults come from environment variables; an optional TOML file can
//! override any section.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API keys for upstream services
    #[serde(default)]
    pub api_keys: ApiKeys,

    /// OpenAlex polite-pool settings
    #[serde(default)]
    pub openalex: OpenAlexConfig,

    /// Circuit breaker settings shared by all sources
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Search pipeline settings
    #[serde(default)]
    pub search: SearchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_keys: ApiKeys::default(),
            openalex: OpenAlexConfig::default(),
            breaker: BreakerConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

/// API keys for external services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeys {
    /// NCBI API keys, rotated round-robin across requests.
    /// `PUBMED_API_KEYS` takes a comma-separated list.
    #[serde(default)]
    pub pubmed: Vec<String>,

    /// Semantic Scholar API key (optional, for higher rate limits)
    #[serde(default)]
    pub semantic_scholar: Option<String>,
}

impl Default for ApiKeys {
    fn default() -> Self {
        Self {
            pubmed: std::env::var("PUBMED_API_KEYS")
                .map(|raw| {
                    raw.split(',')
                        .map(|k| k.trim().to_string())
                        .filter(|k| !k.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            semantic_scholar: std::env::var("SEMANTIC_SCHOLAR_API_KEY").ok(),
        }
    }
}

/// OpenAlex identifies polite-pool users by a contact email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAlexConfig {
    #[serde(default)]
    pub mailto: Option<String>,
}

impl Default for OpenAlexConfig {
    fn default() -> Self {
        Self {
            mailto: std::env::var("OPENALEX_MAILTO").ok(),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,

    /// Seconds the circuit stays open before a half-open probe is allowed
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
}

impl BreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
        }
    }
}

fn default_failure_threshold() -> usize {
    5
}

fn default_reset_timeout_secs() -> u64 {
    30
}

/// Search pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Overall deadline for one federated search, in seconds
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

impl SearchConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
        }
    }
}

fn default_deadline_secs() -> u64 {
    25
}

/// Load configuration from a TOML file, with env-derived defaults filling
/// any missing sections.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)?;
    let config = toml::from_str(&raw)?;
    Ok(config)
}

/// Get the default configuration (from env vars or defaults)
pub fn get_config() -> Config {
    Config::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.reset_timeout(), Duration::from_secs(30));
        assert_eq!(config.search.deadline(), Duration::from_secs(25));
    }

    #[test]
    fn test_toml_overrides() {
        let config: Config = toml::from_str(
            r#"
            [api_keys]
            pubmed = ["k1", "k2"]
            semantic_scholar = "s2key"

            [openalex]
            mailto = "team@example.org"

            [breaker]
            failure_threshold = 3
            reset_timeout_secs = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.api_keys.pubmed, vec!["k1", "k2"]);
        assert_eq!(config.api_keys.semantic_scholar.as_deref(), Some("s2key"));
        assert_eq!(config.openalex.mailto.as_deref(), Some("team@example.org"));
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.search.deadline_secs, 25);
    }
}
