//! Read-side queries over the changelog: filtered entry lists and
//! date-bucketed pagination, optionally translated.

use crate::cache::{Clock, SystemClock};
use crate::entry_translator::{apply, EntryTranslator};
use crate::error::FeedError;
use crate::source::{ContentSource, ParseOptions};
use crate::types::{ChangelogEntry, Language};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// A fetched snapshot is reused for this long
    pub snapshot_ttl: Duration,
    /// Dates per page in [`ChangelogFeed::date_page`]
    pub items_per_page: usize,
    /// Largest honoured `limit`
    pub max_limit: usize,
    /// Entries translated concurrently
    pub translate_batch_size: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            snapshot_ttl: Duration::from_secs(30 * 60),
            items_per_page: 10,
            max_limit: 100,
            translate_batch_size: 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntryQuery {
    pub language: Option<Language>,
    pub version: Option<String>,
    /// Applied only when within `1..=max_limit`
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedMetadata {
    /// Language code, `en` for untranslated output
    pub language: String,
    pub generated_at: DateTime<Utc>,
    /// Age of the snapshot the response was built from
    pub cache_age_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntriesPage {
    pub entries: Vec<ChangelogEntry>,
    pub total: usize,
    /// Snapshot size before filtering
    pub original_total: usize,
    pub version: Option<String>,
    pub limit: Option<usize>,
    pub metadata: FeedMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateBucket {
    pub date: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatePagination {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_dates: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatePage {
    pub dates: Vec<DateBucket>,
    pub pagination: DatePagination,
    pub metadata: FeedMetadata,
}

/// Position of one date among all dates, newest first.
/// "Next" moves toward newer dates, "prev" toward older ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateNavigation {
    pub current_date: String,
    pub current_date_index: Option<usize>,
    pub total_dates: usize,
    pub has_next: bool,
    pub has_prev: bool,
    pub next_date: Option<String>,
    pub prev_date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DateEntries {
    pub entries: Vec<ChangelogEntry>,
    pub navigation: DateNavigation,
    pub metadata: FeedMetadata,
}

struct CachedSnapshot {
    entries: Vec<ChangelogEntry>,
    fetched_at: DateTime<Utc>,
}

pub struct ChangelogFeed {
    source: Arc<dyn ContentSource>,
    translator: Arc<EntryTranslator>,
    settings: FeedSettings,
    clock: Arc<dyn Clock>,
    cached: RwLock<Option<CachedSnapshot>>,
}

impl ChangelogFeed {
    pub fn new(
        source: Arc<dyn ContentSource>,
        translator: Arc<EntryTranslator>,
        settings: FeedSettings,
    ) -> Self {
        Self {
            source,
            translator,
            settings,
            clock: Arc::new(SystemClock),
            cached: RwLock::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current snapshot and its age in milliseconds.
    ///
    /// A failed fetch serves the last snapshot, however old.
    async fn snapshot(&self) -> Result<(Vec<ChangelogEntry>, i64), FeedError> {
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(self.settings.snapshot_ttl)
            .unwrap_or_else(|_| chrono::Duration::days(1));

        {
            let cached = self.cached.read().await;
            if let Some(snapshot) = cached.as_ref() {
                let age = now - snapshot.fetched_at;
                if age < ttl {
                    tracing::debug!(age_ms = age.num_milliseconds(), "serving cached changelog snapshot");
                    return Ok((snapshot.entries.clone(), age.num_milliseconds()));
                }
            }
        }

        match self.source.fetch(&ParseOptions::default()).await {
            Ok(entries) => {
                tracing::info!(entries = entries.len(), "fetched changelog snapshot");
                *self.cached.write().await = Some(CachedSnapshot {
                    entries: entries.clone(),
                    fetched_at: now,
                });
                Ok((entries, 0))
            }
            Err(e) => {
                let cached = self.cached.read().await;
                match cached.as_ref() {
                    Some(snapshot) => {
                        tracing::warn!(error = %e, "changelog fetch failed, serving stale snapshot");
                        Ok((
                            snapshot.entries.clone(),
                            (now - snapshot.fetched_at).num_milliseconds(),
                        ))
                    }
                    None => Err(FeedError::Source(e)),
                }
            }
        }
    }

    fn metadata(&self, language: Option<Language>, cache_age_ms: i64) -> FeedMetadata {
        FeedMetadata {
            language: language.map(|l| l.code().to_string()).unwrap_or_else(|| "en".to_string()),
            generated_at: self.clock.now(),
            cache_age_ms,
        }
    }

    /// Translated copies of `entries`; entries whose batch failed stay as-is.
    async fn localize(&self, entries: Vec<ChangelogEntry>, language: Language) -> Vec<ChangelogEntry> {
        if entries.is_empty() {
            return entries;
        }
        let report = self
            .translator
            .translate_entries(&entries, &[language], self.settings.translate_batch_size, Duration::ZERO)
            .await;
        if !report.errors.is_empty() {
            tracing::warn!(errors = report.errors.len(), "some entries were not translated");
        }

        let by_id: HashMap<String, _> = report
            .translated
            .into_iter()
            .map(|t| (t.entry_id, t.by_language))
            .collect();

        entries
            .into_iter()
            .map(|entry| {
                match by_id.get(&entry.id).and_then(|langs| langs.get(&language)) {
                    Some(fields) => apply(&entry, fields),
                    None => entry,
                }
            })
            .collect()
    }

    pub async fn entries(&self, query: EntryQuery) -> Result<EntriesPage, FeedError> {
        let (all, cache_age_ms) = self.snapshot().await?;
        let original_total = all.len();

        let mut entries = all;
        if let Some(version) = &query.version {
            entries.retain(|e| &e.version == version);
            if entries.is_empty() {
                return Err(FeedError::VersionNotFound(version.clone()));
            }
        }
        if let Some(limit) = query.limit {
            if (1..=self.settings.max_limit).contains(&limit) {
                entries.truncate(limit);
            }
        }
        if let Some(language) = query.language {
            entries = self.localize(entries, language).await;
        }

        Ok(EntriesPage {
            total: entries.len(),
            entries,
            original_total,
            version: query.version,
            limit: query.limit,
            metadata: self.metadata(query.language, cache_age_ms),
        })
    }

    /// Page of dates (newest first) with entry counts. Pages are zero-based.
    pub async fn date_page(
        &self,
        page: usize,
        language: Option<Language>,
    ) -> Result<DatePage, FeedError> {
        let (all, cache_age_ms) = self.snapshot().await?;
        let dates = sorted_dates(&all);
        let per_page = self.settings.items_per_page.max(1);
        let total_pages = dates.len().div_ceil(per_page);

        let buckets = dates
            .iter()
            .skip(page.saturating_mul(per_page))
            .take(per_page)
            .map(|date| DateBucket {
                date: date.clone(),
                count: all.iter().filter(|e| &e.date == date).count(),
            })
            .collect();

        Ok(DatePage {
            dates: buckets,
            pagination: DatePagination {
                current_page: page,
                total_pages,
                total_dates: dates.len(),
                has_next: page.saturating_add(1) < total_pages,
                has_prev: page > 0,
            },
            metadata: self.metadata(language, cache_age_ms),
        })
    }

    /// All entries published on `date`, with links to neighbouring dates.
    /// An unknown date yields an empty result.
    pub async fn entries_for_date(
        &self,
        date: &str,
        language: Option<Language>,
    ) -> Result<DateEntries, FeedError> {
        let (all, cache_age_ms) = self.snapshot().await?;
        let dates = sorted_dates(&all);
        let entries: Vec<ChangelogEntry> = all.into_iter().filter(|e| e.date == date).collect();

        let index = dates.iter().position(|d| d == date).filter(|_| !entries.is_empty());
        let navigation = match index {
            Some(i) => DateNavigation {
                current_date: date.to_string(),
                current_date_index: Some(i),
                total_dates: dates.len(),
                has_next: i > 0,
                has_prev: i + 1 < dates.len(),
                next_date: i.checked_sub(1).map(|n| dates[n].clone()),
                prev_date: dates.get(i + 1).cloned(),
            },
            None => DateNavigation {
                current_date: date.to_string(),
                current_date_index: None,
                total_dates: dates.len(),
                has_next: false,
                has_prev: false,
                next_date: None,
                prev_date: None,
            },
        };

        let entries = match language {
            Some(language) => self.localize(entries, language).await,
            None => entries,
        };

        Ok(DateEntries {
            entries,
            navigation,
            metadata: self.metadata(language, cache_age_ms),
        })
    }
}

/// Distinct dates, newest first. Unparseable dates sort last.
pub fn sorted_dates(entries: &[ChangelogEntry]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut dates: Vec<String> = entries
        .iter()
        .filter(|e| seen.insert(e.date.as_str()))
        .map(|e| e.date.clone())
        .collect();
    dates.sort_by(|a, b| {
        let pa = NaiveDate::parse_from_str(a, "%Y-%m-%d").ok();
        let pb = NaiveDate::parse_from_str(b, "%Y-%m-%d").ok();
        pb.cmp(&pa).then_with(|| b.cmp(a))
    });
    dates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_dates() {
        let entries: Vec<_> = ["2024-03-01", "2024-12-24", "someday", "2024-03-01", "2023-07-15"]
            .iter()
            .enumerate()
            .map(|(i, d)| ChangelogEntry::new(format!("e{i}"), "1.0", *d))
            .collect();
        assert_eq!(
            sorted_dates(&entries),
            vec!["2024-12-24", "2024-03-01", "2023-07-15", "someday"]
        );
    }
}
