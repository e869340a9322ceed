//! Cache-aware batch translation.
//!
//! Texts are looked up in the [`HashKeyStore`] first; misses go to the
//! [`TranslationClient`] in fixed-size concurrent batches with a pause
//! between batches, and every computed result is written back in one
//! store rewrite.

use crate::cache::{CacheStats, HashKeyStore};
use crate::diff::{detect_changes, extract_translatable_texts, Node};
use crate::error::CacheError;
use crate::translator::TranslationClient;
use crate::types::{passthrough, Language, Translations};
use futures::future::join_all;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Texts translated concurrently per batch
    pub batch_size: usize,
    /// Pause between consecutive batches (not after the last one)
    pub batch_delay: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HitStats {
    pub total_requested: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Percentage with one decimal, e.g. `"66.7%"`
    pub hit_rate: String,
}

impl HitStats {
    fn new(hits: usize, misses: usize) -> Self {
        let total = hits + misses;
        let hit_rate = if total > 0 {
            format!("{:.1}%", hits as f64 / total as f64 * 100.0)
        } else {
            "0%".to_string()
        };
        Self {
            total_requested: total,
            cache_hits: hits,
            cache_misses: misses,
            hit_rate,
        }
    }
}

/// A batch whose texts fell back to the source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub batch_index: usize,
    pub texts: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTranslation {
    /// One map per input text, in input order
    pub translations: Vec<Translations>,
    pub stats: HitStats,
    /// Translation batches issued for cache misses
    pub batches: usize,
    pub errors: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleTranslation {
    pub original_text: String,
    pub translations: Translations,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeTranslation {
    /// Translations keyed by changed path, in detection order
    pub translations: Vec<(String, Translations)>,
    pub stats: HitStats,
    pub errors: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    #[serde(flatten)]
    pub stats: CacheStats,
    pub location: PathBuf,
    pub max_age_days: i64,
}

struct Miss {
    index: usize,
    text: String,
    /// Cached translations that did not cover every requested language
    partial: Option<Translations>,
}

pub struct CacheOrchestrator {
    client: TranslationClient,
    store: HashKeyStore,
    settings: BatchSettings,
}

impl CacheOrchestrator {
    pub fn new(client: TranslationClient, store: HashKeyStore, settings: BatchSettings) -> Self {
        Self {
            client,
            store,
            settings,
        }
    }

    pub fn store(&self) -> &HashKeyStore {
        &self.store
    }

    pub fn client(&self) -> &TranslationClient {
        &self.client
    }

    /// Translate many texts, serving what it can from the cache.
    ///
    /// Only a failed store write is an error; failed translation batches fall
    /// back to the source text and are reported in `errors`.
    pub async fn translate_texts(
        &self,
        texts: &[String],
        languages: &[Language],
    ) -> Result<BatchTranslation, CacheError> {
        let mut results: Vec<Option<Translations>> = vec![None; texts.len()];
        let mut misses = Vec::new();

        for lookup in self.store.get_batch(texts) {
            match lookup.cached {
                Some(entry) if covers(&entry.translations, languages) => {
                    tracing::debug!(text = %preview(&lookup.text), "translation cache hit");
                    results[lookup.index] = Some(select(&entry.translations, languages));
                }
                cached => misses.push(Miss {
                    index: lookup.index,
                    text: lookup.text,
                    partial: cached.map(|e| e.translations),
                }),
            }
        }

        let hits = texts.len() - misses.len();
        let stats = HitStats::new(hits, misses.len());
        let mut errors = Vec::new();
        let mut batches = 0;

        if !misses.is_empty() {
            tracing::info!(misses = misses.len(), "translating uncached texts");

            let batch_size = self.settings.batch_size.max(1);
            let batch_count = misses.len().div_ceil(batch_size);
            let mut to_cache = Vec::with_capacity(misses.len());

            for (batch_index, batch) in misses.chunks(batch_size).enumerate() {
                batches += 1;
                let calls = batch
                    .iter()
                    .map(|miss| self.client.try_translate(&miss.text, languages));
                let outcome: Result<Vec<Translations>, _> =
                    join_all(calls).await.into_iter().collect();

                let translated = match outcome {
                    Ok(translated) => translated,
                    Err(e) => {
                        tracing::error!(batch = batch_index, texts = batch.len(), error = %e, "translation batch failed, using source text");
                        errors.push(BatchFailure {
                            batch_index,
                            texts: batch.len(),
                            reason: e.to_string(),
                        });
                        batch
                            .iter()
                            .map(|miss| passthrough(&miss.text, languages))
                            .collect()
                    }
                };

                for (miss, translations) in batch.iter().zip(translated) {
                    let mut merged = miss.partial.clone().unwrap_or_default();
                    merged.extend(translations.clone());
                    to_cache.push((miss.text.clone(), merged));
                    results[miss.index] = Some(translations);
                }

                if batch_index + 1 < batch_count && !self.settings.batch_delay.is_zero() {
                    tokio::time::sleep(self.settings.batch_delay).await;
                }
            }

            self.store.set_batch(&to_cache)?;
            tracing::info!(cached = to_cache.len(), "stored new translations");
        }

        tracing::info!(
            hits = stats.cache_hits,
            misses = stats.cache_misses,
            hit_rate = %stats.hit_rate,
            "batch translation complete"
        );

        Ok(BatchTranslation {
            translations: results.into_iter().map(Option::unwrap_or_default).collect(),
            stats,
            batches,
            errors,
        })
    }

    /// Translate one text, serving it from the cache when possible
    pub async fn translate_single(
        &self,
        text: &str,
        languages: &[Language],
    ) -> Result<SingleTranslation, CacheError> {
        let cached = self.store.get(text);
        if let Some(entry) = &cached {
            if covers(&entry.translations, languages) {
                tracing::debug!(text = %preview(text), "translation cache hit");
                return Ok(SingleTranslation {
                    original_text: text.to_string(),
                    translations: select(&entry.translations, languages),
                    cached: true,
                });
            }
        }

        let translations = self.client.translate(text, languages).await.into_translations();
        let mut merged = cached.map(|e| e.translations).unwrap_or_default();
        merged.extend(translations.clone());
        self.store.set(text, &merged)?;

        Ok(SingleTranslation {
            original_text: text.to_string(),
            translations,
            cached: false,
        })
    }

    /// Translate only what changed between two records
    pub async fn translate_changes(
        &self,
        previous: Option<&Node>,
        current: &Node,
        languages: &[Language],
    ) -> Result<ChangeTranslation, CacheError> {
        self.store.clean_expired()?;

        let changes = detect_changes(current, previous);
        if changes.is_empty() {
            tracing::info!("no changes detected");
            return Ok(ChangeTranslation {
                translations: Vec::new(),
                stats: HitStats::new(0, 0),
                errors: Vec::new(),
            });
        }

        let texts = extract_translatable_texts(&changes);
        if texts.is_empty() {
            tracing::info!(changes = changes.len(), "no translatable text in changes");
            return Ok(ChangeTranslation {
                translations: Vec::new(),
                stats: HitStats::new(0, 0),
                errors: Vec::new(),
            });
        }

        let sources: Vec<String> = texts.iter().map(|(_, text)| text.clone()).collect();
        let batch = self.translate_texts(&sources, languages).await?;

        Ok(ChangeTranslation {
            translations: texts
                .into_iter()
                .map(|(path, _)| path)
                .zip(batch.translations)
                .collect(),
            stats: batch.stats,
            errors: batch.errors,
        })
    }

    pub fn cache_info(&self) -> CacheInfo {
        CacheInfo {
            stats: self.store.stats(),
            location: self.store.location(),
            max_age_days: self.store.settings().max_age.num_days(),
        }
    }
}

fn covers(translations: &Translations, languages: &[Language]) -> bool {
    languages.iter().all(|l| translations.contains_key(l))
}

fn select(translations: &Translations, languages: &[Language]) -> Translations {
    translations
        .iter()
        .filter(|(lang, _)| languages.contains(lang))
        .map(|(lang, text)| (*lang, text.clone()))
        .collect()
}

fn preview(text: &str) -> String {
    text.chars().take(30).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheSettings;
    use crate::error::TranslateError;
    use crate::storage::MemoryBackend;
    use crate::translator::TranslationService;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct EchoService {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TranslationService for EchoService {
        async fn translate(
            &self,
            text: &str,
            languages: &[Language],
        ) -> Result<Translations, TranslateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("fail") {
                return Err(TranslateError::Service("upstream 500".into()));
            }
            Ok(languages.iter().map(|l| (*l, format!("{l}:{text}"))).collect())
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn orchestrator(batch_size: usize) -> (CacheOrchestrator, Arc<EchoService>) {
        let service = Arc::new(EchoService {
            calls: AtomicUsize::new(0),
        });
        let store = HashKeyStore::new(Box::new(MemoryBackend::new()), CacheSettings::default());
        let orchestrator = CacheOrchestrator::new(
            TranslationClient::new(service.clone()),
            store,
            BatchSettings {
                batch_size,
                batch_delay: Duration::ZERO,
            },
        );
        (orchestrator, service)
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_hit_rate_format() {
        assert_eq!(HitStats::new(0, 0).hit_rate, "0%");
        assert_eq!(HitStats::new(2, 1).hit_rate, "66.7%");
        assert_eq!(HitStats::new(3, 0).hit_rate, "100.0%");
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let (orch, service) = orchestrator(5);
        let input = texts(&["Improved agent", "Faster search"]);

        let first = orch.translate_texts(&input, &[Language::Ko]).await.unwrap();
        assert_eq!(first.stats.cache_misses, 2);
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);

        let second = orch.translate_texts(&input, &[Language::Ko]).await.unwrap();
        assert_eq!(second.stats.cache_hits, 2);
        assert_eq!(second.batches, 0);
        assert_eq!(second.translations, first.translations);
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_partial_language_coverage_is_a_miss() {
        let (orch, service) = orchestrator(5);
        let input = texts(&["Improved agent"]);

        orch.translate_texts(&input, &[Language::Ko]).await.unwrap();
        let wider = orch
            .translate_texts(&input, &[Language::Ko, Language::Ja])
            .await
            .unwrap();
        assert_eq!(wider.stats.cache_misses, 1);
        assert_eq!(wider.translations[0].len(), 2);
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);

        // Merged entry now covers both languages, and narrower requests are filtered
        let narrow = orch.translate_texts(&input, &[Language::Ja]).await.unwrap();
        assert_eq!(narrow.stats.cache_hits, 1);
        assert_eq!(narrow.translations[0].len(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_falls_back_and_is_cached() {
        let (orch, _) = orchestrator(2);
        let input = texts(&["alpha text", "beta text", "this will fail", "delta text"]);

        let result = orch.translate_texts(&input, &[Language::Es]).await.unwrap();

        assert_eq!(result.batches, 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].batch_index, 1);
        assert_eq!(result.translations[0][&Language::Es], "es:alpha text");
        assert_eq!(result.translations[1][&Language::Es], "es:beta text");
        assert_eq!(result.translations[2][&Language::Es], "this will fail");
        assert_eq!(result.translations[3][&Language::Es], "delta text");
        assert_eq!(orch.store().stats().total_entries, 4);
    }

    #[tokio::test]
    async fn test_translate_single() {
        let (orch, service) = orchestrator(5);
        let first = orch.translate_single("Bug fixes", &[Language::Zh]).await.unwrap();
        assert!(!first.cached);
        let second = orch.translate_single("Bug fixes", &[Language::Zh]).await.unwrap();
        assert!(second.cached);
        assert_eq!(first.translations, second.translations);
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_translate_changes() {
        use serde_json::json;
        let (orch, _) = orchestrator(5);
        let node = |v: serde_json::Value| match crate::diff::Value::from(v) {
            crate::diff::Value::Node(n) => n,
            _ => unreachable!(),
        };
        let previous = node(json!({"title": "Old title", "count": 1}));
        let current = node(json!({"title": "New title", "count": 2, "url": "https://a.b"}));

        let result = orch
            .translate_changes(Some(&previous), &current, &[Language::Ko])
            .await
            .unwrap();
        assert_eq!(result.translations.len(), 1);
        assert_eq!(result.translations[0].0, "title");
        assert_eq!(result.stats.total_requested, 1);

        let unchanged = orch
            .translate_changes(Some(&current), &current, &[Language::Ko])
            .await
            .unwrap();
        assert!(unchanged.translations.is_empty());
        assert_eq!(unchanged.stats.hit_rate, "0%");
    }
}
