use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A single release in the changelog, as produced by a content source.
///
/// Two entries describe the same release iff their `id`s match; every other
/// field may change between crawls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangelogEntry {
    pub id: String,
    pub version: String,
    /// ISO-normalized date string (`YYYY-MM-DD`)
    pub date: String,
    pub title: String,
    /// Plain-text body
    pub content: String,
    #[serde(default)]
    pub html_content: String,
    #[serde(default)]
    pub images: Vec<MediaItem>,
    #[serde(default)]
    pub videos: Vec<MediaItem>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub raw_html: String,
}

impl ChangelogEntry {
    pub fn new(id: impl Into<String>, version: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            date: date.into(),
            title: String::new(),
            content: String::new(),
            html_content: String::new(),
            images: Vec::new(),
            videos: Vec::new(),
            sections: Vec::new(),
            raw_html: String::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    pub fn with_image(mut self, image: MediaItem) -> Self {
        self.images.push(image);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl MediaItem {
    pub fn image(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            alt: None,
            kind: MediaKind::Image,
            caption: None,
        }
    }

    pub fn video(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            alt: None,
            kind: MediaKind::Video,
            caption: None,
        }
    }
}

/// Heading-delimited chunk of an entry. Order within an entry is meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub content: String,
    pub level: u32,
}

impl Section {
    pub fn new(title: impl Into<String>, content: impl Into<String>, level: u32) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            level,
        }
    }
}

/// Target languages the pipeline can translate into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ko,
    Ja,
    Zh,
    Es,
}

impl Language {
    pub const ALL: [Language; 4] = [Language::Ko, Language::Ja, Language::Zh, Language::Es];

    pub fn code(&self) -> &'static str {
        match self {
            Language::Ko => "ko",
            Language::Ja => "ja",
            Language::Zh => "zh",
            Language::Es => "es",
        }
    }

    /// English display name, used in translation prompts
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Ko => "Korean",
            Language::Ja => "Japanese",
            Language::Zh => "Chinese",
            Language::Es => "Spanish",
        }
    }

    /// Parse a list of codes, silently dropping unknown ones.
    pub fn parse_list<'a, I>(codes: I) -> Vec<Language>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut langs = Vec::new();
        for lang in codes.into_iter().filter_map(|c| c.parse::<Language>().ok()) {
            if !langs.contains(&lang) {
                langs.push(lang);
            }
        }
        langs
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ko" => Ok(Language::Ko),
            "ja" => Ok(Language::Ja),
            "zh" => Ok(Language::Zh),
            "es" => Ok(Language::Es),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// Translated text per target language
pub type Translations = BTreeMap<Language, String>;

/// Every requested language mapped to the untranslated source text.
pub fn passthrough(text: &str, languages: &[Language]) -> Translations {
    languages.iter().map(|l| (*l, text.to_string())).collect()
}
