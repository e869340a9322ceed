use crate::error::SourceError;
use crate::types::ChangelogEntry;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

fn default_true() -> bool {
    true
}

/// What a source should include in the entries it returns
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ParseOptions {
    #[serde(default = "default_true")]
    pub include_images: bool,
    #[serde(default = "default_true")]
    pub include_videos: bool,
    #[serde(default = "default_true")]
    pub generate_detailed_sections: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            include_images: true,
            include_videos: true,
            generate_detailed_sections: true,
        }
    }
}

impl ParseOptions {
    /// Drop whatever the options exclude
    pub fn apply(&self, entries: &mut [ChangelogEntry]) {
        for entry in entries {
            if !self.include_images {
                entry.images.clear();
            }
            if !self.include_videos {
                entry.videos.clear();
            }
            if !self.generate_detailed_sections {
                entry.sections.clear();
            }
        }
    }
}

/// Producer of structured changelog entries, e.g. a scraper of the vendor
/// changelog page.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, options: &ParseOptions) -> Result<Vec<ChangelogEntry>, SourceError>;

    fn describe(&self) -> String;
}

/// Reads a JSON array of entries written by a crawler or a previous run.
/// The file is re-read on every fetch.
pub struct SnapshotFileSource {
    path: PathBuf,
}

impl SnapshotFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ContentSource for SnapshotFileSource {
    async fn fetch(&self, options: &ParseOptions) -> Result<Vec<ChangelogEntry>, SourceError> {
        let mut entries = load_snapshot(&self.path)?;
        options.apply(&mut entries);
        tracing::info!(path = %self.path.display(), entries = entries.len(), "loaded changelog snapshot");
        Ok(entries)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

pub fn load_snapshot(path: &Path) -> Result<Vec<ChangelogEntry>, SourceError> {
    let json_str = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&json_str).map_err(|source| SourceError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_snapshot(path: &Path, entries: &[ChangelogEntry]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json_str = serde_json::to_string_pretty(entries)?;
    std::fs::write(path, json_str)?;
    Ok(())
}
