use crate::types::{ChangelogEntry, MediaItem};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct CompareOptions {
    /// Compare body text, HTML and sections
    pub include_content_changes: bool,
    /// Compare images and videos
    pub include_media_changes: bool,
    /// Sort new and updated entries by descending numeric version
    pub prioritize_version_order: bool,
    /// Log every per-entry decision at debug level
    pub debug: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            include_content_changes: true,
            include_media_changes: true,
            prioritize_version_order: false,
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryUpdate {
    pub old_entry: ChangelogEntry,
    pub new_entry: ChangelogEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSummary {
    pub total_cached: usize,
    pub total_new: usize,
    pub new_count: usize,
    pub updated_count: usize,
    pub deleted_count: usize,
    pub unchanged_count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub new_entries: Vec<ChangelogEntry>,
    pub updated_entries: Vec<EntryUpdate>,
    pub deleted_entries: Vec<ChangelogEntry>,
    pub unchanged_entries: Vec<ChangelogEntry>,
    pub summary: ComparisonSummary,
}

/// Where a version landed in a comparison
#[derive(Debug, PartialEq)]
pub enum VersionStatus<'a> {
    New(&'a ChangelogEntry),
    Updated {
        old: &'a ChangelogEntry,
        new: &'a ChangelogEntry,
    },
    Deleted(&'a ChangelogEntry),
    Unchanged,
}

/// Classify `new` against `cached` by entry id.
///
/// `new`, `updated` and `unchanged` follow the order of `new`; `deleted`
/// follows the order of `cached`.
pub fn compare_entries(
    cached: &[ChangelogEntry],
    new: &[ChangelogEntry],
    options: &CompareOptions,
) -> ComparisonResult {
    let cached_by_id: HashMap<&str, &ChangelogEntry> =
        cached.iter().map(|e| (e.id.as_str(), e)).collect();
    let new_ids: HashSet<&str> = new.iter().map(|e| e.id.as_str()).collect();

    let mut result = ComparisonResult::default();

    for entry in new {
        match cached_by_id.get(entry.id.as_str()) {
            None => {
                if options.debug {
                    tracing::debug!(version = %entry.version, title = %entry.title, "new entry");
                }
                result.new_entries.push(entry.clone());
            }
            Some(old) if has_content_changed(old, entry, options) => {
                if options.debug {
                    tracing::debug!(version = %entry.version, title = %entry.title, "updated entry");
                }
                result.updated_entries.push(EntryUpdate {
                    old_entry: (*old).clone(),
                    new_entry: entry.clone(),
                });
            }
            Some(_) => {
                if options.debug {
                    tracing::debug!(version = %entry.version, title = %entry.title, "unchanged entry");
                }
                result.unchanged_entries.push(entry.clone());
            }
        }
    }

    for entry in cached {
        if !new_ids.contains(entry.id.as_str()) {
            if options.debug {
                tracing::debug!(version = %entry.version, title = %entry.title, "deleted entry");
            }
            result.deleted_entries.push(entry.clone());
        }
    }

    result.summary = ComparisonSummary {
        total_cached: cached.len(),
        total_new: new.len(),
        new_count: result.new_entries.len(),
        updated_count: result.updated_entries.len(),
        deleted_count: result.deleted_entries.len(),
        unchanged_count: result.unchanged_entries.len(),
    };

    if options.prioritize_version_order {
        result
            .new_entries
            .sort_by(|a, b| version_number(&b.version).total_cmp(&version_number(&a.version)));
        result.updated_entries.sort_by(|a, b| {
            version_number(&b.new_entry.version).total_cmp(&version_number(&a.new_entry.version))
        });
    }

    tracing::info!(
        new = result.summary.new_count,
        updated = result.summary.updated_count,
        deleted = result.summary.deleted_count,
        unchanged = result.summary.unchanged_count,
        "changelog comparison complete"
    );

    result
}

/// Positional comparison: reordering sections or media counts as a change.
pub fn has_content_changed(
    old: &ChangelogEntry,
    new: &ChangelogEntry,
    options: &CompareOptions,
) -> bool {
    if old.version != new.version || old.date != new.date || old.title != new.title {
        return true;
    }

    if options.include_content_changes {
        if old.content != new.content
            || old.html_content != new.html_content
            || old.raw_html != new.raw_html
        {
            return true;
        }
        if old.sections.len() != new.sections.len() {
            return true;
        }
        let sections_differ = old.sections.iter().zip(&new.sections).any(|(a, b)| {
            a.title != b.title || a.content != b.content || a.level != b.level
        });
        if sections_differ {
            return true;
        }
    }

    if options.include_media_changes
        && (media_differs(&old.images, &new.images) || media_differs(&old.videos, &new.videos))
    {
        return true;
    }

    false
}

fn media_differs(old: &[MediaItem], new: &[MediaItem]) -> bool {
    old.len() != new.len()
        || old
            .iter()
            .zip(new)
            .any(|(a, b)| a.src != b.src || a.alt != b.alt || a.caption != b.caption)
}

/// Leading decimal number of a version string; `0` when there is none.
///
/// `"1.2.3"` reads as `1.2`, `"v1"` as `0`.
pub fn version_number(version: &str) -> f64 {
    let s = version.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'-' || bytes[end] == b'+') {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut has_digits = end > int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if frac_end > frac_start {
            has_digits = true;
            end = frac_end;
        } else if has_digits {
            end += 1;
        }
    }
    if !has_digits {
        return 0.0;
    }
    s[..end].parse::<f64>().unwrap_or(0.0)
}

impl ComparisonResult {
    pub fn has_changes(&self) -> bool {
        self.summary.new_count > 0 || self.summary.updated_count > 0 || self.summary.deleted_count > 0
    }

    /// New entries followed by the new side of updated entries
    pub fn changed_entries(&self) -> Vec<&ChangelogEntry> {
        self.new_entries
            .iter()
            .chain(self.updated_entries.iter().map(|u| &u.new_entry))
            .collect()
    }

    pub fn status_for_version(&self, version: &str) -> VersionStatus<'_> {
        if let Some(entry) = self.new_entries.iter().find(|e| e.version == version) {
            return VersionStatus::New(entry);
        }
        if let Some(update) = self
            .updated_entries
            .iter()
            .find(|u| u.new_entry.version == version)
        {
            return VersionStatus::Updated {
                old: &update.old_entry,
                new: &update.new_entry,
            };
        }
        if let Some(entry) = self.deleted_entries.iter().find(|e| e.version == version) {
            return VersionStatus::Deleted(entry);
        }
        VersionStatus::Unchanged
    }

    /// Machine-readable report of the comparison
    pub fn export_json(&self, include_unchanged: bool) -> serde_json::Value {
        let brief = |e: &ChangelogEntry| {
            json!({
                "id": e.id,
                "version": e.version,
                "title": e.title,
                "date": e.date,
            })
        };

        let updated: Vec<_> = self
            .updated_entries
            .iter()
            .map(|u| {
                let mut item = brief(&u.new_entry);
                item["hasContentChange"] = json!(u.old_entry.content != u.new_entry.content);
                item["hasMediaChange"] = json!(
                    u.old_entry.images.len() != u.new_entry.images.len()
                        || u.old_entry.videos.len() != u.new_entry.videos.len()
                );
                item
            })
            .collect();

        let mut changes = json!({
            "new": self.new_entries.iter().map(brief).collect::<Vec<_>>(),
            "updated": updated,
            "deleted": self.deleted_entries.iter().map(brief).collect::<Vec<_>>(),
        });
        if include_unchanged {
            changes["unchanged"] =
                json!(self.unchanged_entries.iter().map(brief).collect::<Vec<_>>());
        }

        json!({
            "timestamp": Utc::now().to_rfc3339(),
            "summary": self.summary,
            "changes": changes,
        })
    }
}
