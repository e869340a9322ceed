//! Single-text translation with graceful degradation.

use crate::error::TranslateError;
use crate::types::{passthrough, Language, Translations};
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};

static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^https?://").unwrap());
static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());
static NUMBER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?$").unwrap());

/// External translation capability: one text into several languages.
///
/// Implementations return whatever languages they managed to produce;
/// missing ones are filled in by [`TranslationClient`].
#[async_trait]
pub trait TranslationService: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        languages: &[Language],
    ) -> Result<Translations, TranslateError>;

    fn name(&self) -> &str;
}

/// Why a text is or isn't sent to the translation service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translatability {
    Translatable,
    Empty,
    Url,
    Email,
    Number,
    TooShort,
}

pub fn classify(text: &str) -> Translatability {
    if text.trim().is_empty() {
        Translatability::Empty
    } else if URL_REGEX.is_match(text) {
        Translatability::Url
    } else if EMAIL_REGEX.is_match(text) {
        Translatability::Email
    } else if NUMBER_REGEX.is_match(text) {
        Translatability::Number
    } else if text.chars().count() <= 2 {
        Translatability::TooShort
    } else {
        Translatability::Translatable
    }
}

pub fn needs_translation(text: &str) -> bool {
    classify(text) == Translatability::Translatable
}

#[derive(Debug, Clone, PartialEq)]
pub enum TranslationOutcome {
    Translated(Translations),
    /// Text was not worth translating; every language maps to the input
    Passthrough(Translations),
    /// The service failed; every language maps to the input
    Fallback {
        translations: Translations,
        reason: String,
    },
}

impl TranslationOutcome {
    pub fn translations(&self) -> &Translations {
        match self {
            TranslationOutcome::Translated(t) | TranslationOutcome::Passthrough(t) => t,
            TranslationOutcome::Fallback { translations, .. } => translations,
        }
    }

    pub fn into_translations(self) -> Translations {
        match self {
            TranslationOutcome::Translated(t) | TranslationOutcome::Passthrough(t) => t,
            TranslationOutcome::Fallback { translations, .. } => translations,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, TranslationOutcome::Fallback { .. })
    }
}

#[derive(Clone)]
pub struct TranslationClient {
    service: Arc<dyn TranslationService>,
}

impl TranslationClient {
    pub fn new(service: Arc<dyn TranslationService>) -> Self {
        Self { service }
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    /// Translate, returning the service error instead of degrading.
    ///
    /// Non-translatable text never reaches the service.
    pub async fn try_translate(
        &self,
        text: &str,
        languages: &[Language],
    ) -> Result<Translations, TranslateError> {
        if !needs_translation(text) {
            return Ok(passthrough(text, languages));
        }

        let response = self.service.translate(text, languages).await?;
        Ok(languages
            .iter()
            .map(|lang| {
                let translated = response
                    .get(lang)
                    .filter(|t| !t.is_empty())
                    .cloned()
                    .unwrap_or_else(|| text.to_string());
                (*lang, translated)
            })
            .collect())
    }

    /// Translate one text. Never fails: service errors fall back to the
    /// source text for every language.
    pub async fn translate(&self, text: &str, languages: &[Language]) -> TranslationOutcome {
        if !needs_translation(text) {
            return TranslationOutcome::Passthrough(passthrough(text, languages));
        }

        match self.try_translate(text, languages).await {
            Ok(translations) => TranslationOutcome::Translated(translations),
            Err(e) => {
                tracing::error!(service = self.service.name(), error = %e, "translation failed, using source text");
                TranslationOutcome::Fallback {
                    translations: passthrough(text, languages),
                    reason: e.to_string(),
                }
            }
        }
    }
}
