use crate::cache::CacheSettings;
use crate::orchestrator::BatchSettings;
use crate::storage::{DEFAULT_CACHE_DIR, DEFAULT_CACHE_FILE};
use crate::sync::SyncSettings;
use crate::types::Language;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// Default value functions for serde
fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

fn default_cache_file() -> String {
    DEFAULT_CACHE_FILE.to_string()
}

fn default_max_age_days() -> i64 {
    7
}

fn default_text_batch_size() -> usize {
    5
}

fn default_entry_batch_size() -> usize {
    2
}

fn default_feed_batch_size() -> usize {
    3
}

fn default_batch_delay_ms() -> u64 {
    1000
}

fn default_languages() -> Vec<Language> {
    Language::ALL.to_vec()
}

fn default_content_max_chars() -> usize {
    1000
}

fn default_max_section_titles() -> usize {
    5
}

fn default_min_interval_secs() -> u64 {
    600
}

fn default_recommended_interval_secs() -> u64 {
    3600
}

fn default_snapshot_ttl_secs() -> u64 {
    1800
}

fn default_items_per_page() -> usize {
    10
}

fn default_max_limit() -> usize {
    100
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// Top-level configuration, loaded from YAML. Every field has a default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_cache_file")]
    pub file_name: String,
    /// Entries older than this are re-translated
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            file_name: default_cache_file(),
            max_age_days: default_max_age_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    /// Concurrent texts per translation batch
    #[serde(default = "default_text_batch_size")]
    pub text_batch_size: usize,
    /// Concurrent entries per sync batch
    #[serde(default = "default_entry_batch_size")]
    pub entry_batch_size: usize,
    /// Concurrent entries per feed translation batch
    #[serde(default = "default_feed_batch_size")]
    pub feed_batch_size: usize,
    /// Pause between consecutive batches
    #[serde(default = "default_batch_delay_ms")]
    pub delay_ms: u64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            text_batch_size: default_text_batch_size(),
            entry_batch_size: default_entry_batch_size(),
            feed_batch_size: default_feed_batch_size(),
            delay_ms: default_batch_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default = "default_languages")]
    pub languages: Vec<Language>,
    /// Entry bodies longer than this are truncated before translation
    #[serde(default = "default_content_max_chars")]
    pub content_max_chars: usize,
    #[serde(default = "default_max_section_titles")]
    pub max_section_titles: usize,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            content_max_chars: default_content_max_chars(),
            max_section_titles: default_max_section_titles(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Unforced syncs closer together than this are skipped
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
    #[serde(default = "default_recommended_interval_secs")]
    pub recommended_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval_secs(),
            recommended_interval_secs: default_recommended_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// How long a fetched snapshot is served without refetching
    #[serde(default = "default_snapshot_ttl_secs")]
    pub snapshot_ttl_secs: u64,
    #[serde(default = "default_items_per_page")]
    pub items_per_page: usize,
    /// Largest accepted `limit`; larger values are ignored
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl_secs: default_snapshot_ttl_secs(),
            items_per_page: default_items_per_page(),
            max_limit: default_max_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load config from file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        let config: AppConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file {path}"))?;
        Ok(config)
    }

    /// Load config with fallback to default
    pub fn load_with_fallback(path: Option<&str>) -> Self {
        match path {
            Some(p) => Self::load_from_file(p).unwrap_or_else(|e| {
                tracing::warn!(path = p, error = %e, "failed to load config, using defaults");
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            max_age: chrono::Duration::days(self.cache.max_age_days),
        }
    }

    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            batch_size: self.batching.text_batch_size.max(1),
            batch_delay: Duration::from_millis(self.batching.delay_ms),
        }
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            languages: self.translation.languages.clone(),
            entry_batch_size: self.batching.entry_batch_size.max(1),
            batch_delay: Duration::from_millis(self.batching.delay_ms),
            min_sync_interval: Duration::from_secs(self.sync.min_interval_secs),
            recommended_sync_interval: Duration::from_secs(self.sync.recommended_interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.cache.dir, PathBuf::from(".translation-cache"));
        assert_eq!(config.cache.file_name, "translations.json");
        assert_eq!(config.batching.text_batch_size, 5);
        assert_eq!(config.batching.entry_batch_size, 2);
        assert_eq!(config.translation.languages.len(), 4);
        assert_eq!(config.openai.model, "gpt-4o-mini");
        assert_eq!(config.cache_settings().max_age, chrono::Duration::days(7));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
cache:
  max_age_days: 2
translation:
  languages: [ko, ja]
batching:
  delay_ms: 0
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.cache.max_age_days, 2);
        assert_eq!(config.cache.file_name, "translations.json");
        assert_eq!(config.translation.languages, vec![Language::Ko, Language::Ja]);
        assert_eq!(config.batch_settings().batch_delay, Duration::ZERO);
        assert_eq!(config.sync_settings().min_sync_interval, Duration::from_secs(600));
    }

    #[test]
    fn test_load_with_fallback_on_missing_file() {
        let config = AppConfig::load_with_fallback(Some("/nonexistent/relnotes.yaml"));
        assert_eq!(config.feed.items_per_page, 10);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relnotes.yaml");
        std::fs::write(&path, "feed:\n  items_per_page: 4\n").unwrap();

        let config = AppConfig::load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.feed.items_per_page, 4);
        assert_eq!(config.feed.max_limit, 100);
    }
}
