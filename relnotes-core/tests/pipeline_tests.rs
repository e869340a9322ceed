//! End-to-end tests across the cache, orchestrator, sync engine and feed.
//!
//! Translation and content sources are in-process fakes; the cache runs on
//! a real file in a temp directory where persistence matters.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use relnotes_core::cache::ManualClock;
use relnotes_core::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Fakes
// ============================================================================

/// Prefixes text with the language code. Texts containing "FAIL" error out.
/// Each call sleeps briefly so concurrent calls overlap.
#[derive(Default)]
struct FakeTranslator {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeTranslator {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationService for FakeTranslator {
    async fn translate(
        &self,
        text: &str,
        languages: &[Language],
    ) -> Result<Translations, TranslateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if text.contains("FAIL") {
            return Err(TranslateError::Service("simulated outage".into()));
        }
        Ok(languages.iter().map(|l| (*l, format!("[{l}] {text}"))).collect())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Serves whatever entries it currently holds; `None` simulates an outage.
struct FakeSource {
    entries: Mutex<Option<Vec<ChangelogEntry>>>,
    fetches: AtomicUsize,
}

impl FakeSource {
    fn new(entries: Vec<ChangelogEntry>) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(Some(entries)),
            fetches: AtomicUsize::new(0),
        })
    }

    fn set(&self, entries: Option<Vec<ChangelogEntry>>) {
        *self.entries.lock().unwrap() = entries;
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn fetch(&self, _options: &ParseOptions) -> Result<Vec<ChangelogEntry>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SourceError::Unavailable("connection refused".into()))
    }

    fn describe(&self) -> String {
        "fake".into()
    }
}

fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 1, 9, 0, 0).unwrap()
}

fn entry(id: &str, version: &str, date: &str) -> ChangelogEntry {
    ChangelogEntry::new(id, version, date)
        .with_title(format!("Release {version}"))
        .with_content(format!("Notes for {version}"))
        .with_section(Section::new("Improvements", "Faster", 2))
}

fn orchestrator_with(
    service: Arc<FakeTranslator>,
    store: HashKeyStore,
    batch_size: usize,
) -> Arc<CacheOrchestrator> {
    Arc::new(CacheOrchestrator::new(
        TranslationClient::new(service),
        store,
        BatchSettings {
            batch_size,
            batch_delay: Duration::from_secs(1),
        },
    ))
}

fn memory_store() -> HashKeyStore {
    HashKeyStore::new(Box::new(MemoryBackend::new()), CacheSettings::default())
}

fn texts(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("Changelog line number {i}")).collect()
}

// ============================================================================
// Cache persistence
// ============================================================================

mod cache_persistence {
    use super::*;

    #[tokio::test]
    async fn second_run_hits_file_cache() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(FakeTranslator::default());
        let make_store = || {
            HashKeyStore::new(
                Box::new(FileBackend::new(dir.path().join("cache"), "translations.json")),
                CacheSettings::default(),
            )
        };

        let first = orchestrator_with(service.clone(), make_store(), 5);
        let a = first.translate_texts(&texts(3), &[Language::Ko]).await.unwrap();
        assert_eq!(a.stats.cache_misses, 3);

        // Fresh store instance over the same file
        let second = orchestrator_with(service.clone(), make_store(), 5);
        let b = second.translate_texts(&texts(3), &[Language::Ko]).await.unwrap();
        assert_eq!(b.stats.cache_hits, 3);
        assert_eq!(b.stats.hit_rate, "100.0%");
        assert_eq!(a.translations, b.translations);
        assert_eq!(service.calls(), 3);

        let raw = std::fs::read_to_string(dir.path().join("cache/translations.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["version"], "1.0");
        assert_eq!(json["metadata"]["totalEntries"], 3);
    }

    #[tokio::test]
    async fn expired_entries_are_retranslated() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let service = Arc::new(FakeTranslator::default());
        let store = memory_store().with_clock(clock.clone());
        let orch = orchestrator_with(service.clone(), store, 5);

        orch.translate_texts(&texts(1), &[Language::Ja]).await.unwrap();
        clock.advance(ChronoDuration::days(8));
        let again = orch.translate_texts(&texts(1), &[Language::Ja]).await.unwrap();

        assert_eq!(again.stats.cache_misses, 1);
        assert_eq!(service.calls(), 2);
    }

    #[tokio::test]
    async fn colliding_hash_is_a_miss() {
        let service = Arc::new(FakeTranslator::default());
        let store = memory_store().with_hasher(|_| "0000000000000000".to_string());
        let orch = orchestrator_with(service.clone(), store, 5);

        orch.translate_texts(&["First distinct text".to_string()], &[Language::Es])
            .await
            .unwrap();
        let other = orch
            .translate_texts(&["Second distinct text".to_string()], &[Language::Es])
            .await
            .unwrap();

        assert_eq!(other.stats.cache_misses, 1);
        assert_eq!(
            other.translations[0][&Language::Es],
            "[es] Second distinct text"
        );
    }

    #[test]
    fn clean_expired_persists_removal() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(start_time()));
        let store = HashKeyStore::new(
            Box::new(FileBackend::new(dir.path(), "t.json")),
            CacheSettings {
                max_age: ChronoDuration::days(1),
            },
        )
        .with_clock(clock.clone());

        store.set("kept for now", &passthrough("x", &[Language::Ko])).unwrap();
        clock.advance(ChronoDuration::days(2));
        assert_eq!(store.clean_expired().unwrap(), 1);

        let reopened = HashKeyStore::new(
            Box::new(FileBackend::new(dir.path(), "t.json")),
            CacheSettings::default(),
        );
        assert_eq!(reopened.stats().total_entries, 0);
    }
}

// ============================================================================
// Batching and fallback
// ============================================================================

mod batching {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn misses_split_into_fixed_batches() {
        let service = Arc::new(FakeTranslator::default());
        let orch = orchestrator_with(service.clone(), memory_store(), 2);
        let input = texts(5);

        let started = tokio::time::Instant::now();
        let result = orch.translate_texts(&input, &[Language::Ko]).await.unwrap();

        assert_eq!(result.batches, 3);
        assert_eq!(service.max_in_flight.load(Ordering::SeqCst), 2);
        // Two inter-batch pauses, none after the last batch
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));

        for (i, translations) in result.translations.iter().enumerate() {
            assert_eq!(translations[&Language::Ko], format!("[ko] {}", input[i]));
        }
        assert_eq!(orch.store().stats().total_entries, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_batch_is_isolated() {
        let service = Arc::new(FakeTranslator::default());
        let orch = orchestrator_with(service.clone(), memory_store(), 2);
        let input: Vec<String> = vec![
            "First good line".into(),
            "Second good line".into(),
            "Third line will FAIL".into(),
            "Fourth line, same batch".into(),
            "Fifth good line".into(),
        ];

        let result = orch
            .translate_texts(&input, &[Language::Ko, Language::Zh])
            .await
            .unwrap();

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].batch_index, 1);
        assert_eq!(result.translations[0][&Language::Zh], "[zh] First good line");
        assert_eq!(result.translations[2][&Language::Ko], "Third line will FAIL");
        assert_eq!(result.translations[3][&Language::Ko], "Fourth line, same batch");
        assert_eq!(result.translations[4][&Language::Ko], "[ko] Fifth good line");

        // Fallbacks are cached too
        let again = orch
            .translate_texts(&input, &[Language::Ko, Language::Zh])
            .await
            .unwrap();
        assert_eq!(again.stats.cache_hits, 5);
    }

    #[tokio::test]
    async fn hits_and_misses_keep_input_order() {
        let service = Arc::new(FakeTranslator::default());
        let orch = orchestrator_with(service.clone(), memory_store(), 5);

        orch.translate_texts(&["Cached middle line".to_string()], &[Language::Ja])
            .await
            .unwrap();
        let input: Vec<String> = vec![
            "Fresh first line".into(),
            "Cached middle line".into(),
            "https://cursor.com/changelog".into(),
        ];
        let result = orch.translate_texts(&input, &[Language::Ja]).await.unwrap();

        assert_eq!(result.stats.cache_hits, 1);
        assert_eq!(result.stats.cache_misses, 2);
        assert_eq!(result.stats.hit_rate, "33.3%");
        assert_eq!(result.translations[0][&Language::Ja], "[ja] Fresh first line");
        assert_eq!(result.translations[1][&Language::Ja], "[ja] Cached middle line");
        assert_eq!(
            result.translations[2][&Language::Ja],
            "https://cursor.com/changelog"
        );
        // The URL never reached the service
        assert_eq!(service.calls(), 2);
    }
}

// ============================================================================
// Sync engine
// ============================================================================

mod sync_engine {
    use super::*;
    use relnotes_core::sync::EngineState;

    fn engine(source: Arc<FakeSource>, clock: Arc<ManualClock>) -> SyncEngine {
        let service = Arc::new(FakeTranslator::default());
        let orch = orchestrator_with(service, memory_store(), 5);
        let translator = Arc::new(EntryTranslator::new(orch, EntryTranslatorSettings::default()));
        SyncEngine::new(
            source,
            translator,
            SyncSettings {
                batch_delay: Duration::ZERO,
                ..Default::default()
            },
        )
        .with_clock(clock)
    }

    fn completed(outcome: SyncOutcome) -> relnotes_core::sync::SyncReport {
        match outcome {
            SyncOutcome::Completed(report) => report,
            SyncOutcome::Skipped(s) => panic!("unexpected skip: {s:?}"),
        }
    }

    #[tokio::test]
    async fn first_sync_translates_everything() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let source = FakeSource::new(vec![entry("a", "1.0", "2024-08-01"), entry("b", "1.1", "2024-08-15")]);
        let engine = engine(source, clock);

        let report = completed(
            engine
                .sync(SyncRequest {
                    languages: Some(vec!["ko".into(), "xx".into()]),
                    force: false,
                })
                .await
                .unwrap(),
        );

        assert!(report.success);
        assert_eq!(report.new_entries, 2);
        assert_eq!(report.translated_languages, vec![Language::Ko]);
        assert_eq!(report.translated_counts[&Language::Ko], 2);

        let translated = engine.translated_entry("b", Language::Ko).await.unwrap();
        assert_eq!(translated.title, "[ko] Release 1.1");
        assert_eq!(translated.sections[0].title, "[ko] Improvements");

        let status = engine.status().await;
        assert_eq!(status.total_entries, 2);
        assert_eq!(status.translated_entries, 2);
        assert_eq!(status.state, EngineState::Ready);
        assert_eq!(
            status.next_recommended_sync,
            Some(start_time() + ChronoDuration::hours(1))
        );
    }

    #[tokio::test]
    async fn rejects_requests_without_valid_languages() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let engine = engine(FakeSource::new(vec![]), clock);
        let err = engine
            .sync(SyncRequest {
                languages: Some(vec!["fr".into()]),
                force: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NoLanguages));
    }

    #[tokio::test]
    async fn recent_sync_is_skipped_unless_forced() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let source = FakeSource::new(vec![entry("a", "1.0", "2024-08-01")]);
        let engine = engine(source.clone(), clock.clone());

        completed(engine.sync(SyncRequest::default()).await.unwrap());
        clock.advance(ChronoDuration::minutes(5));

        match engine.sync(SyncRequest::default()).await.unwrap() {
            SyncOutcome::Skipped(skip) => {
                assert_eq!(skip.seconds_since_last_sync, 300);
                assert_eq!(skip.next_allowed_sync, start_time() + ChronoDuration::minutes(10));
            }
            other => panic!("expected skip, got {other:?}"),
        }
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        let forced = completed(
            engine
                .sync(SyncRequest {
                    force: true,
                    ..Default::default()
                })
                .await
                .unwrap(),
        );
        assert!(forced.success);
        assert_eq!(forced.new_entries, 0);

        clock.advance(ChronoDuration::minutes(11));
        completed(engine.sync(SyncRequest::default()).await.unwrap());
    }

    #[tokio::test]
    async fn updates_and_deletions_follow_the_diff() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let source = FakeSource::new(vec![entry("a", "1.0", "2024-08-01"), entry("b", "1.1", "2024-08-15")]);
        let engine = engine(source.clone(), clock);
        completed(engine.sync(SyncRequest::default()).await.unwrap());

        let mut b = entry("b", "1.1", "2024-08-15");
        b.title = "Release 1.1 with agent".into();
        source.set(Some(vec![b, entry("c", "1.2", "2024-09-01")]));

        let report = completed(
            engine
                .sync(SyncRequest {
                    force: true,
                    ..Default::default()
                })
                .await
                .unwrap(),
        );
        assert_eq!(report.new_entries, 1);
        assert_eq!(report.updated_entries, 1);
        assert_eq!(report.deleted_entries, 1);
        assert!(engine.translations_for("a", Language::Ko).await.is_none());
        assert_eq!(
            engine
                .translations_for("b", Language::Ja)
                .await
                .and_then(|f| f.title),
            Some("[ja] Release 1.1 with agent".to_string())
        );
    }

    #[tokio::test]
    async fn source_outage_keeps_previous_snapshot() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let source = FakeSource::new(vec![entry("a", "1.0", "2024-08-01")]);
        let engine = engine(source.clone(), clock);

        source.set(None);
        let err = engine.sync(SyncRequest::default()).await.unwrap_err();
        assert!(matches!(err, SyncError::SourceUnavailable(_)));

        source.set(Some(vec![entry("a", "1.0", "2024-08-01")]));
        completed(engine.sync(SyncRequest::default()).await.unwrap());

        source.set(None);
        let report = completed(
            engine
                .sync(SyncRequest {
                    force: true,
                    ..Default::default()
                })
                .await
                .unwrap(),
        );
        assert!(!report.success);
        assert_eq!(report.total_entries, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(engine.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn seeded_baseline_only_translates_changes() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let source = FakeSource::new(vec![entry("a", "1.0", "2024-08-01"), entry("b", "1.1", "2024-08-15")]);
        let engine = engine(source, clock);
        engine.seed(vec![entry("a", "1.0", "2024-08-01")]).await;

        let report = completed(engine.sync(SyncRequest::default()).await.unwrap());
        assert_eq!(report.new_entries, 1);
        assert_eq!(engine.status().await.translated_entries, 1);
    }
}

// ============================================================================
// Feed queries
// ============================================================================

mod feed_queries {
    use super::*;

    fn feed(source: Arc<FakeSource>, clock: Arc<ManualClock>) -> ChangelogFeed {
        let service = Arc::new(FakeTranslator::default());
        let orch = orchestrator_with(service, memory_store(), 5);
        let translator = Arc::new(EntryTranslator::new(orch, EntryTranslatorSettings::default()));
        ChangelogFeed::new(source, translator, FeedSettings::default()).with_clock(clock)
    }

    fn many_dates(n: usize) -> Vec<ChangelogEntry> {
        (0..n)
            .map(|i| {
                let date = (chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64))
                .format("%Y-%m-%d")
                .to_string();
                entry(&format!("e{i}"), &format!("0.{i}"), &date)
            })
            .collect()
    }

    #[tokio::test]
    async fn filters_by_version_and_limit() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let f = feed(FakeSource::new(many_dates(12)), clock);

        let page = f
            .entries(EntryQuery {
                version: Some("0.3".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.original_total, 12);
        assert_eq!(page.metadata.language, "en");

        let err = f
            .entries(EntryQuery {
                version: Some("9.9".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::VersionNotFound(v) if v == "9.9"));

        let limited = f
            .entries(EntryQuery {
                limit: Some(4),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.total, 4);

        // Out-of-range limits are ignored
        let unlimited = f
            .entries(EntryQuery {
                limit: Some(500),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(unlimited.total, 12);
    }

    #[tokio::test]
    async fn translates_when_language_given() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let f = feed(FakeSource::new(many_dates(2)), clock);

        let page = f
            .entries(EntryQuery {
                language: Some(Language::Es),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.metadata.language, "es");
        assert!(page.entries.iter().all(|e| e.title.starts_with("[es] ")));
    }

    #[tokio::test]
    async fn paginates_dates_newest_first() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let f = feed(FakeSource::new(many_dates(23)), clock);

        let first = f.date_page(0, None).await.unwrap();
        assert_eq!(first.dates.len(), 10);
        assert_eq!(first.dates[0].date, "2024-01-23");
        assert_eq!(first.dates[0].count, 1);
        assert_eq!(first.pagination.total_pages, 3);
        assert_eq!(first.pagination.total_dates, 23);
        assert!(first.pagination.has_next);
        assert!(!first.pagination.has_prev);

        let last = f.date_page(2, None).await.unwrap();
        assert_eq!(last.dates.len(), 3);
        assert!(!last.pagination.has_next);
        assert!(last.pagination.has_prev);
    }

    #[tokio::test]
    async fn out_of_range_date_page_is_empty() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let f = feed(FakeSource::new(many_dates(1)), clock);

        for page in [1, usize::MAX / 2, usize::MAX] {
            let result = f.date_page(page, None).await.unwrap();
            assert!(result.dates.is_empty());
            assert_eq!(result.pagination.current_page, page);
            assert_eq!(result.pagination.total_pages, 1);
            assert!(!result.pagination.has_next);
            assert!(result.pagination.has_prev);
        }
    }

    #[tokio::test]
    async fn date_navigation() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let mut entries = many_dates(3);
        entries.push(entry("extra", "0.9", "2024-01-02"));
        let f = feed(FakeSource::new(entries), clock);

        let middle = f.entries_for_date("2024-01-02", None).await.unwrap();
        assert_eq!(middle.entries.len(), 2);
        assert_eq!(middle.navigation.current_date_index, Some(1));
        assert_eq!(middle.navigation.next_date.as_deref(), Some("2024-01-03"));
        assert_eq!(middle.navigation.prev_date.as_deref(), Some("2024-01-01"));

        let newest = f.entries_for_date("2024-01-03", None).await.unwrap();
        assert!(!newest.navigation.has_next);
        assert!(newest.navigation.has_prev);

        let unknown = f.entries_for_date("1999-01-01", None).await.unwrap();
        assert!(unknown.entries.is_empty());
        assert!(!unknown.navigation.has_next && !unknown.navigation.has_prev);
        assert_eq!(unknown.navigation.total_dates, 3);
    }

    #[tokio::test]
    async fn snapshot_cached_and_stale_on_outage() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let source = FakeSource::new(many_dates(2));
        let f = feed(source.clone(), clock.clone());

        f.entries(EntryQuery::default()).await.unwrap();
        clock.advance(ChronoDuration::minutes(10));
        let cached = f.entries(EntryQuery::default()).await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(cached.metadata.cache_age_ms, 10 * 60 * 1000);

        clock.advance(ChronoDuration::minutes(30));
        source.set(None);
        let stale = f.entries(EntryQuery::default()).await.unwrap();
        assert_eq!(stale.total, 2);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn outage_without_snapshot_is_an_error() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let source = FakeSource::new(vec![]);
        source.set(None);
        let f = feed(source, clock);
        assert!(matches!(
            f.date_page(0, None).await,
            Err(FeedError::Source(_))
        ));
    }
}
