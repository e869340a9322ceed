//! Changelog synchronization: fetch, diff against the last snapshot,
//! translate what changed and remember the result for the process lifetime.

use crate::cache::{Clock, SystemClock};
use crate::diff::{compare_entries, CompareOptions};
use crate::entry_translator::{apply, EntryTranslator, TranslatedFields};
use crate::error::SyncError;
use crate::source::{ContentSource, ParseOptions};
use crate::types::{ChangelogEntry, Language};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Languages used when a request does not name any
    pub languages: Vec<Language>,
    pub entry_batch_size: usize,
    pub batch_delay: Duration,
    /// Unforced syncs closer together than this are skipped
    pub min_sync_interval: Duration,
    pub recommended_sync_interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            languages: Language::ALL.to_vec(),
            entry_batch_size: 2,
            batch_delay: Duration::from_secs(1),
            min_sync_interval: Duration::from_secs(10 * 60),
            recommended_sync_interval: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncRequest {
    /// Language codes; unknown codes are dropped. `None` uses the defaults.
    pub languages: Option<Vec<String>>,
    /// Ignore the minimum interval
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub run_id: Uuid,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub new_entries: usize,
    pub updated_entries: usize,
    pub deleted_entries: usize,
    pub total_entries: usize,
    pub translated_languages: Vec<Language>,
    /// Entries translated per language in this run
    pub translated_counts: BTreeMap<Language, usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSkipped {
    pub last_sync: DateTime<Utc>,
    pub next_allowed_sync: DateTime<Utc>,
    pub seconds_since_last_sync: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SyncOutcome {
    Completed(SyncReport),
    Skipped(SyncSkipped),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Ready,
    Syncing,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub last_sync: Option<DateTime<Utc>>,
    pub seconds_since_last_sync: Option<i64>,
    pub next_recommended_sync: Option<DateTime<Utc>>,
    pub total_entries: usize,
    pub translated_entries: usize,
    pub supported_languages: Vec<Language>,
    pub state: EngineState,
}

#[derive(Default)]
struct SyncCache {
    snapshot: Option<Vec<ChangelogEntry>>,
    translations: HashMap<String, BTreeMap<Language, TranslatedFields>>,
    last_sync: Option<DateTime<Utc>>,
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(365))
}

pub struct SyncEngine {
    source: Arc<dyn ContentSource>,
    translator: Arc<EntryTranslator>,
    settings: SyncSettings,
    clock: Arc<dyn Clock>,
    state: RwLock<SyncCache>,
    run_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn ContentSource>,
        translator: Arc<EntryTranslator>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            source,
            translator,
            settings,
            clock: Arc::new(SystemClock),
            state: RwLock::new(SyncCache::default()),
            run_lock: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Install a known snapshot without translating it
    pub async fn seed(&self, entries: Vec<ChangelogEntry>) {
        let mut state = self.state.write().await;
        tracing::info!(entries = entries.len(), "seeded sync snapshot");
        state.snapshot = Some(entries);
    }

    fn resolve_languages(&self, request: &SyncRequest) -> Result<Vec<Language>, SyncError> {
        let languages = match &request.languages {
            Some(codes) => Language::parse_list(codes.iter().map(String::as_str)),
            None => self.settings.languages.clone(),
        };
        if languages.is_empty() {
            return Err(SyncError::NoLanguages);
        }
        Ok(languages)
    }

    pub async fn sync(&self, request: SyncRequest) -> Result<SyncOutcome, SyncError> {
        let languages = self.resolve_languages(&request)?;
        let _running = self.run_lock.lock().await;

        let now = self.clock.now();
        let previous = {
            let state = self.state.read().await;
            if let (false, Some(last)) = (request.force, state.last_sync) {
                let since = now - last;
                let min_interval = to_chrono(self.settings.min_sync_interval);
                if since < min_interval {
                    tracing::info!(seconds_since = since.num_seconds(), "sync skipped, too recent");
                    return Ok(SyncOutcome::Skipped(SyncSkipped {
                        last_sync: last,
                        next_allowed_sync: last + min_interval,
                        seconds_since_last_sync: since.num_seconds(),
                    }));
                }
            }
            state.snapshot.clone()
        };

        let run_id = Uuid::new_v4();
        let started = Instant::now();
        tracing::info!(%run_id, source = %self.source.describe(), "changelog sync started");

        let fetched = match self.source.fetch(&ParseOptions::default()).await {
            Ok(entries) => entries,
            Err(e) => {
                let Some(previous) = previous else {
                    return Err(SyncError::SourceUnavailable(e));
                };
                tracing::warn!(%run_id, error = %e, "content source unavailable, keeping previous snapshot");
                return Ok(SyncOutcome::Completed(SyncReport {
                    run_id,
                    success: false,
                    timestamp: self.clock.now(),
                    new_entries: 0,
                    updated_entries: 0,
                    deleted_entries: 0,
                    total_entries: previous.len(),
                    translated_languages: languages,
                    translated_counts: BTreeMap::new(),
                    errors: vec![format!("sync failed: {e}")],
                    duration_ms: started.elapsed().as_millis() as u64,
                }));
            }
        };

        let comparison = compare_entries(
            previous.as_deref().unwrap_or_default(),
            &fetched,
            &CompareOptions::default(),
        );
        let to_translate: Vec<ChangelogEntry> =
            comparison.changed_entries().into_iter().cloned().collect();

        let report = if to_translate.is_empty() {
            Default::default()
        } else {
            tracing::info!(entries = to_translate.len(), languages = ?languages, "translating changed entries");
            self.translator
                .translate_entries(
                    &to_translate,
                    &languages,
                    self.settings.entry_batch_size,
                    self.settings.batch_delay,
                )
                .await
        };

        let mut translated_counts: BTreeMap<Language, usize> = BTreeMap::new();
        let total_entries = fetched.len();
        {
            let mut state = self.state.write().await;
            for translated in report.translated {
                for lang in translated.by_language.keys() {
                    *translated_counts.entry(*lang).or_default() += 1;
                }
                state
                    .translations
                    .entry(translated.entry_id)
                    .or_default()
                    .extend(translated.by_language);
            }
            for deleted in &comparison.deleted_entries {
                state.translations.remove(&deleted.id);
            }
            state.snapshot = Some(fetched);
            state.last_sync = Some(self.clock.now());
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            %run_id,
            new = comparison.summary.new_count,
            updated = comparison.summary.updated_count,
            deleted = comparison.summary.deleted_count,
            errors = report.errors.len(),
            duration_ms,
            "changelog sync complete"
        );

        Ok(SyncOutcome::Completed(SyncReport {
            run_id,
            success: true,
            timestamp: self.clock.now(),
            new_entries: comparison.summary.new_count,
            updated_entries: comparison.summary.updated_count,
            deleted_entries: comparison.summary.deleted_count,
            total_entries,
            translated_languages: languages,
            translated_counts,
            errors: report.errors,
            duration_ms,
        }))
    }

    pub async fn status(&self) -> SyncStatus {
        let state = self.state.read().await;
        let now = self.clock.now();
        let recommended = to_chrono(self.settings.recommended_sync_interval);
        let engine_state = if self.run_lock.try_lock().is_ok() {
            EngineState::Ready
        } else {
            EngineState::Syncing
        };

        SyncStatus {
            last_sync: state.last_sync,
            seconds_since_last_sync: state.last_sync.map(|last| (now - last).num_seconds()),
            next_recommended_sync: state.last_sync.map(|last| last + recommended),
            total_entries: state.snapshot.as_ref().map(Vec::len).unwrap_or(0),
            translated_entries: state.translations.len(),
            supported_languages: Language::ALL.to_vec(),
            state: engine_state,
        }
    }

    pub async fn snapshot(&self) -> Vec<ChangelogEntry> {
        self.state.read().await.snapshot.clone().unwrap_or_default()
    }

    pub async fn translations_for(&self, id: &str, language: Language) -> Option<TranslatedFields> {
        let state = self.state.read().await;
        state.translations.get(id)?.get(&language).cloned()
    }

    /// Snapshot entry with its stored translation applied
    pub async fn translated_entry(&self, id: &str, language: Language) -> Option<ChangelogEntry> {
        let state = self.state.read().await;
        let entry = state.snapshot.as_ref()?.iter().find(|e| e.id == id)?;
        let fields = state.translations.get(id)?.get(&language)?;
        Some(apply(entry, fields))
    }
}
