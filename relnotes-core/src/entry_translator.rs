use crate::error::CacheError;
use crate::orchestrator::{BatchFailure, CacheOrchestrator};
use crate::types::{ChangelogEntry, Language};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EntryTranslatorSettings {
    /// Longer bodies are cut here and suffixed with `...`
    pub content_max_chars: usize,
    /// Only this many leading section titles are translated
    pub max_section_titles: usize,
}

impl Default for EntryTranslatorSettings {
    fn default() -> Self {
        Self {
            content_max_chars: 1000,
            max_section_titles: 5,
        }
    }
}

/// Translated fields of one entry in one language. `None` means the source
/// field was empty and left alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslatedFields {
    pub language: Language,
    pub title: Option<String>,
    pub content: Option<String>,
    /// `(section index, translated title)`
    pub section_titles: Vec<(usize, String)>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryTranslations {
    pub entry_id: String,
    pub by_language: BTreeMap<Language, TranslatedFields>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryBatchReport {
    pub translated: Vec<EntryTranslations>,
    pub batches: usize,
    pub errors: Vec<String>,
}

#[derive(Clone, Copy)]
enum Field {
    Title,
    Content,
    SectionTitle(usize),
}

pub struct EntryTranslator {
    orchestrator: Arc<CacheOrchestrator>,
    settings: EntryTranslatorSettings,
}

impl EntryTranslator {
    pub fn new(orchestrator: Arc<CacheOrchestrator>, settings: EntryTranslatorSettings) -> Self {
        Self {
            orchestrator,
            settings,
        }
    }

    pub fn orchestrator(&self) -> &CacheOrchestrator {
        &self.orchestrator
    }

    fn truncate_content(&self, content: &str) -> String {
        if content.chars().count() > self.settings.content_max_chars {
            let mut cut: String = content.chars().take(self.settings.content_max_chars).collect();
            cut.push_str("...");
            cut
        } else {
            content.to_string()
        }
    }

    /// Translate title, body and leading section titles of one entry
    pub async fn translate_entry(
        &self,
        entry: &ChangelogEntry,
        language: Language,
    ) -> Result<TranslatedFields, CacheError> {
        let mut fields = Vec::new();
        let mut texts = Vec::new();

        if !entry.title.trim().is_empty() {
            fields.push(Field::Title);
            texts.push(entry.title.clone());
        }
        if !entry.content.trim().is_empty() {
            fields.push(Field::Content);
            texts.push(self.truncate_content(&entry.content));
        }
        for (i, section) in entry
            .sections
            .iter()
            .take(self.settings.max_section_titles)
            .enumerate()
        {
            if !section.title.trim().is_empty() {
                fields.push(Field::SectionTitle(i));
                texts.push(section.title.clone());
            }
        }

        let batch = self.orchestrator.translate_texts(&texts, &[language]).await?;

        let mut out = TranslatedFields {
            language,
            title: None,
            content: None,
            section_titles: Vec::new(),
            errors: batch.errors,
        };
        for ((field, source), translations) in fields.iter().zip(&texts).zip(batch.translations) {
            let text = translations
                .get(&language)
                .cloned()
                .unwrap_or_else(|| source.clone());
            match field {
                Field::Title => out.title = Some(text),
                Field::Content => out.content = Some(text),
                Field::SectionTitle(i) => out.section_titles.push((*i, text)),
            }
        }
        Ok(out)
    }

    pub async fn translate_entry_all(
        &self,
        entry: &ChangelogEntry,
        languages: &[Language],
    ) -> Result<EntryTranslations, CacheError> {
        let mut by_language = BTreeMap::new();
        for lang in languages {
            by_language.insert(*lang, self.translate_entry(entry, *lang).await?);
        }
        Ok(EntryTranslations {
            entry_id: entry.id.clone(),
            by_language,
        })
    }

    /// Translate many entries in small concurrent batches.
    ///
    /// A batch that fails is recorded in `errors` and skipped; later batches
    /// still run.
    pub async fn translate_entries(
        &self,
        entries: &[ChangelogEntry],
        languages: &[Language],
        batch_size: usize,
        delay: Duration,
    ) -> EntryBatchReport {
        let mut report = EntryBatchReport::default();
        let batch_size = batch_size.max(1);
        let batch_count = entries.len().div_ceil(batch_size);

        for (batch_index, batch) in entries.chunks(batch_size).enumerate() {
            report.batches += 1;
            let calls = batch
                .iter()
                .map(|entry| self.translate_entry_all(entry, languages));
            let results: Result<Vec<_>, _> = join_all(calls).await.into_iter().collect();

            match results {
                Ok(translated) => {
                    for t in &translated {
                        for fields in t.by_language.values() {
                            for failure in &fields.errors {
                                report.errors.push(format!(
                                    "entry {} ({}): {}",
                                    t.entry_id, fields.language, failure.reason
                                ));
                            }
                        }
                    }
                    tracing::info!(
                        batch = batch_index + 1,
                        of = batch_count,
                        entries = translated.len(),
                        "entry batch translated"
                    );
                    report.translated.extend(translated);
                }
                Err(e) => {
                    let message = format!("batch {} failed: {e}", batch_index + 1);
                    tracing::error!(batch = batch_index + 1, error = %e, "entry batch failed");
                    report.errors.push(message);
                }
            }

            if batch_index + 1 < batch_count && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        report
    }
}

/// Copy of `entry` with translated fields applied
pub fn apply(entry: &ChangelogEntry, fields: &TranslatedFields) -> ChangelogEntry {
    let mut translated = entry.clone();
    if let Some(title) = &fields.title {
        translated.title = title.clone();
    }
    if let Some(content) = &fields.content {
        translated.content = content.clone();
    }
    for (i, title) in &fields.section_titles {
        if let Some(section) = translated.sections.get_mut(*i) {
            section.title = title.clone();
        }
    }
    translated
}
