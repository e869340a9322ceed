//! Hash-keyed translation cache.
//!
//! Entries are keyed by a truncated SHA-256 of the trimmed source text and
//! persisted as a single JSON document through a [`StoreBackend`].

use crate::error::CacheError;
use crate::storage::StoreBackend;
use crate::types::Translations;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Version constants for cache invalidation
pub mod versions {
    /// Stored documents with any other version are discarded on load
    pub const CACHE_SCHEMA_VERSION: &str = "1.0";
}

/// Length of the hex hash used as the cache key
pub const HASH_LEN: usize = 16;

/// Cache key for a piece of source text
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().as_bytes());
    let mut hash = format!("{:x}", hasher.finalize());
    hash.truncate(HASH_LEN);
    hash
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationCacheEntry {
    /// Trimmed source text
    pub original_text: String,
    pub hash: String,
    pub translations: Translations,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    pub total_entries: usize,
    pub last_updated: DateTime<Utc>,
}

/// Persisted container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationCache {
    pub version: String,
    pub entries: BTreeMap<String, TranslationCacheEntry>,
    pub metadata: CacheMetadata,
}

impl TranslationCache {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            version: versions::CACHE_SCHEMA_VERSION.to_string(),
            entries: BTreeMap::new(),
            metadata: CacheMetadata {
                total_entries: 0,
                last_updated: now,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: usize,
    /// Human-readable size of the persisted document
    pub cache_size: String,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

/// Result of a batch lookup, one per input text
#[derive(Debug, Clone)]
pub struct BatchLookup {
    pub index: usize,
    pub text: String,
    pub cached: Option<TranslationCacheEntry>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Entries older than this (by creation time) are misses
    pub max_age: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_age: Duration::days(7),
        }
    }
}

/// Source of "now" for expiry checks
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct HashKeyStore {
    backend: Box<dyn StoreBackend + Send + Sync>,
    settings: CacheSettings,
    clock: Arc<dyn Clock>,
    hasher: fn(&str) -> String,
}

impl HashKeyStore {
    pub fn new(backend: Box<dyn StoreBackend + Send + Sync>, settings: CacheSettings) -> Self {
        Self {
            backend,
            settings,
            clock: Arc::new(SystemClock),
            hasher: hash_text,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the key function. Only useful to force collisions in tests.
    pub fn with_hasher(mut self, hasher: fn(&str) -> String) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn location(&self) -> PathBuf {
        self.backend.location()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn load(&self) -> TranslationCache {
        let now = self.clock.now();
        let raw = match self.backend.load() {
            Ok(Some(raw)) => raw,
            Ok(None) => return TranslationCache::empty(now),
            Err(e) => {
                tracing::warn!(path = %self.location().display(), error = %e, "failed to read translation cache, starting empty");
                return TranslationCache::empty(now);
            }
        };

        match serde_json::from_str::<TranslationCache>(&raw) {
            Ok(cache) if cache.version == versions::CACHE_SCHEMA_VERSION => cache,
            Ok(cache) => {
                tracing::info!(
                    found = %cache.version,
                    expected = versions::CACHE_SCHEMA_VERSION,
                    "translation cache version mismatch, starting empty"
                );
                TranslationCache::empty(now)
            }
            Err(e) => {
                tracing::warn!(path = %self.location().display(), error = %e, "failed to parse translation cache, starting empty");
                TranslationCache::empty(now)
            }
        }
    }

    fn save(&self, cache: &mut TranslationCache) -> Result<(), CacheError> {
        cache.metadata = CacheMetadata {
            total_entries: cache.entries.len(),
            last_updated: self.clock.now(),
        };
        let json = serde_json::to_string_pretty(cache)?;
        self.backend.save(&json).map_err(|source| CacheError::Write {
            path: self.location(),
            source,
        })
    }

    fn is_expired(&self, entry: &TranslationCacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.created_at > self.settings.max_age
    }

    /// Lookup against an already loaded cache
    fn lookup(&self, cache: &TranslationCache, text: &str) -> Option<TranslationCacheEntry> {
        let trimmed = text.trim();
        let hash = (self.hasher)(trimmed);
        let entry = cache.entries.get(&hash)?;

        if entry.original_text != trimmed {
            tracing::warn!(%hash, "translation cache hash collision, treating as miss");
            return None;
        }
        if self.is_expired(entry, self.clock.now()) {
            return None;
        }
        Some(entry.clone())
    }

    /// Merges into the languages already stored for the same text, so
    /// writers holding an older read do not drop each other's languages.
    /// Colliding or expired translations are replaced.
    fn upsert(&self, cache: &mut TranslationCache, text: &str, translations: &Translations) {
        let trimmed = text.trim();
        let hash = (self.hasher)(trimmed);
        let now = self.clock.now();

        let (created_at, mut merged) = match cache.entries.get(&hash) {
            Some(existing)
                if existing.original_text == trimmed && !self.is_expired(existing, now) =>
            {
                (existing.created_at, existing.translations.clone())
            }
            Some(existing) => (existing.created_at, Translations::new()),
            None => (now, Translations::new()),
        };
        merged.extend(translations.iter().map(|(lang, translated)| (*lang, translated.clone())));

        cache.entries.insert(
            hash.clone(),
            TranslationCacheEntry {
                original_text: trimmed.to_string(),
                hash,
                translations: merged,
                created_at,
                updated_at: now,
            },
        );
    }

    /// Cached entry for `text`, if present, not colliding and not expired
    pub fn get(&self, text: &str) -> Option<TranslationCacheEntry> {
        let cache = self.load();
        self.lookup(&cache, text)
    }

    pub fn set(&self, text: &str, translations: &Translations) -> Result<(), CacheError> {
        let mut cache = self.load();
        self.upsert(&mut cache, text, translations);
        self.save(&mut cache)
    }

    pub fn get_batch(&self, texts: &[String]) -> Vec<BatchLookup> {
        let cache = self.load();
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| BatchLookup {
                index,
                text: text.clone(),
                cached: self.lookup(&cache, text),
            })
            .collect()
    }

    /// Upsert all items with a single rewrite
    pub fn set_batch(&self, items: &[(String, Translations)]) -> Result<(), CacheError> {
        if items.is_empty() {
            return Ok(());
        }
        let mut cache = self.load();
        for (text, translations) in items {
            self.upsert(&mut cache, text, translations);
        }
        self.save(&mut cache)
    }

    /// Remove expired entries, returning how many were dropped
    pub fn clean_expired(&self) -> Result<usize, CacheError> {
        let mut cache = self.load();
        let now = self.clock.now();
        let before = cache.entries.len();
        cache.entries.retain(|_, entry| !self.is_expired(entry, now));
        let removed = before - cache.entries.len();

        if removed > 0 {
            self.save(&mut cache)?;
            tracing::info!(removed, "cleaned expired translation cache entries");
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        self.backend.remove().map_err(|source| CacheError::Remove {
            path: self.location(),
            source,
        })?;
        tracing::info!(path = %self.location().display(), "translation cache cleared");
        Ok(())
    }

    /// Drop the entry for one text. Returns whether anything was removed.
    pub fn remove(&self, text: &str) -> Result<bool, CacheError> {
        let mut cache = self.load();
        let hash = (self.hasher)(text.trim());
        if cache.entries.remove(&hash).is_none() {
            return Ok(false);
        }
        self.save(&mut cache)?;
        Ok(true)
    }

    pub fn stats(&self) -> CacheStats {
        let cache = self.load();
        let created = cache.entries.values().map(|e| e.created_at);
        CacheStats {
            total_entries: cache.entries.len(),
            cache_size: format_size(self.backend.size_bytes()),
            oldest_entry: created.clone().min(),
            newest_entry: created.max(),
        }
    }
}

/// `512 B`, `1.5 KB`, `2.0 MB`
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / MB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use crate::types::{passthrough, Language};
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn store_with_clock() -> (HashKeyStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let store = HashKeyStore::new(Box::new(MemoryBackend::new()), CacheSettings::default())
            .with_clock(clock.clone());
        (store, clock)
    }

    fn ko(text: &str) -> Translations {
        passthrough(text, &[Language::Ko])
    }

    #[test]
    fn test_hash_is_trimmed_and_truncated() {
        let hash = hash_text("  hello ");
        assert_eq!(hash.len(), HASH_LEN);
        assert_eq!(hash, hash_text("hello"));
        assert_ne!(hash, hash_text("hello!"));
        // sha256("hello") = 2cf24dba5fb0a30e...
        assert_eq!(hash, "2cf24dba5fb0a30e");
    }

    #[test]
    fn test_set_then_get() {
        let (store, _) = store_with_clock();
        store.set(" New feature ", &ko("새 기능")).unwrap();

        let entry = store.get("New feature").unwrap();
        assert_eq!(entry.original_text, "New feature");
        assert_eq!(entry.translations[&Language::Ko], "새 기능");
    }

    #[test]
    fn test_set_preserves_created_at() {
        let (store, clock) = store_with_clock();
        store.set("text", &ko("a")).unwrap();
        clock.advance(Duration::hours(2));
        store.set("text", &ko("b")).unwrap();

        let entry = store.get("text").unwrap();
        assert_eq!(entry.created_at, start());
        assert_eq!(entry.updated_at, start() + Duration::hours(2));
        assert_eq!(entry.translations[&Language::Ko], "b");
    }

    #[test]
    fn test_set_batch_merges_with_stored_languages() {
        let (store, _) = store_with_clock();
        // Two writers read the empty store, then write different languages
        store.set_batch(&[("Improvements".to_string(), ko("개선 사항"))]).unwrap();
        let ja = passthrough("改善点", &[Language::Ja]);
        store.set_batch(&[("Improvements".to_string(), ja)]).unwrap();

        let entry = store.get("Improvements").unwrap();
        assert_eq!(entry.translations.len(), 2);
        assert_eq!(entry.translations[&Language::Ko], "개선 사항");
        assert_eq!(entry.translations[&Language::Ja], "改善点");
    }

    #[test]
    fn test_collision_does_not_merge() {
        let (store, _) = store_with_clock();
        let store = store.with_hasher(|_| "deadbeefdeadbeef".to_string());
        store.set("first text", &ko("a")).unwrap();
        store
            .set("second text", &passthrough("b", &[Language::Ja]))
            .unwrap();

        let entry = store.get("second text").unwrap();
        assert_eq!(entry.translations.len(), 1);
        assert_eq!(entry.translations[&Language::Ja], "b");
        assert!(store.get("first text").is_none());
    }

    #[test]
    fn test_expired_entry_is_miss() {
        let (store, clock) = store_with_clock();
        store.set("text", &ko("a")).unwrap();

        clock.advance(Duration::days(7));
        assert!(store.get("text").is_some());

        clock.advance(Duration::seconds(1));
        assert!(store.get("text").is_none());
    }

    #[test]
    fn test_update_does_not_extend_lifetime() {
        let (store, clock) = store_with_clock();
        store.set("text", &ko("a")).unwrap();
        clock.advance(Duration::days(6));
        store.set("text", &ko("b")).unwrap();
        clock.advance(Duration::days(2));
        assert!(store.get("text").is_none());
    }

    #[test]
    fn test_collision_is_miss() {
        let (store, _) = store_with_clock();
        let store = store.with_hasher(|_| "deadbeefdeadbeef".to_string());
        store.set("first text", &ko("a")).unwrap();

        assert!(store.get("first text").is_some());
        assert!(store.get("second text").is_none());
    }

    #[test]
    fn test_clean_expired_counts_removed() {
        let (store, clock) = store_with_clock();
        store.set("old", &ko("a")).unwrap();
        clock.advance(Duration::days(5));
        store.set("new", &ko("b")).unwrap();
        clock.advance(Duration::days(3));

        assert_eq!(store.clean_expired().unwrap(), 1);
        assert_eq!(store.clean_expired().unwrap(), 0);
        assert_eq!(store.stats().total_entries, 1);
    }

    #[test]
    fn test_version_mismatch_starts_empty() {
        let stale = r#"{"version":"0.9","entries":{},"metadata":{"totalEntries":0,"lastUpdated":"2024-01-01T00:00:00Z"}}"#;
        let store = HashKeyStore::new(
            Box::new(MemoryBackend::with_contents(stale)),
            CacheSettings::default(),
        );
        assert_eq!(store.stats().total_entries, 0);

        store.set("x y z", &ko("a")).unwrap();
        assert_eq!(store.stats().total_entries, 1);
    }

    #[test]
    fn test_corrupt_document_starts_empty() {
        let store = HashKeyStore::new(
            Box::new(MemoryBackend::with_contents("{not json")),
            CacheSettings::default(),
        );
        assert!(store.get("anything").is_none());
        assert_eq!(store.stats().total_entries, 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let (store, _) = store_with_clock();
        store.set("one", &ko("a")).unwrap();
        store.set("two", &ko("b")).unwrap();

        assert!(store.remove("one").unwrap());
        assert!(!store.remove("one").unwrap());
        assert_eq!(store.stats().total_entries, 1);

        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.stats().total_entries, 0);
    }

    #[test]
    fn test_stats_oldest_newest() {
        let (store, clock) = store_with_clock();
        assert!(store.stats().oldest_entry.is_none());

        store.set("one", &ko("a")).unwrap();
        clock.advance(Duration::hours(1));
        store.set("two", &ko("b")).unwrap();

        let stats = store.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.oldest_entry, Some(start()));
        assert_eq!(stats.newest_entry, Some(start() + Duration::hours(1)));
        assert!(stats.cache_size.ends_with(" B") || stats.cache_size.ends_with(" KB"));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(2 * 1024 * 1024), "2.0 MB");
    }
}
