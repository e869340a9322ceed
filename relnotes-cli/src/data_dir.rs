//! Data directory - where the CLI keeps its snapshot and translation cache
//!
//! Defaults to ~/.local/share/relnotes (the local app data dir on Windows)
//! so state is shared across invocations from any working directory.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// File holding the last synced changelog, used as the diff baseline
const SNAPSHOT_FILE: &str = "snapshot.json";

/// Config file looked up when `--config` is not given
const CONFIG_FILE: &str = "relnotes.yaml";

pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Use the default per-user data directory
    pub fn new() -> Result<Self> {
        Ok(Self {
            root: Self::get_data_dir()?,
        })
    }

    /// Use an explicit directory
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn get_data_dir() -> Result<PathBuf> {
        #[cfg(windows)]
        {
            let base = dirs::data_local_dir()
                .ok_or_else(|| anyhow!("Could not determine local data directory"))?;
            Ok(base.join("relnotes"))
        }

        #[cfg(not(windows))]
        {
            let home =
                dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))?;
            Ok(home.join(".local").join("share").join("relnotes"))
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join(SNAPSHOT_FILE)
    }

    /// Cache directories from config are relative to the data directory
    /// unless absolute
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.root).with_context(|| {
            format!("Failed to create data directory: {}", self.root.display())
        })
    }

    /// First existing config file: working directory, then data directory
    pub fn find_config(&self) -> Option<PathBuf> {
        let candidates = [PathBuf::from(CONFIG_FILE), self.root.join(CONFIG_FILE)];
        candidates.into_iter().find(|c| c.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_under_root() {
        let data = DataDir::at("/tmp/relnotes-test");
        assert_eq!(
            data.snapshot_path(),
            PathBuf::from("/tmp/relnotes-test/snapshot.json")
        );
        assert_eq!(
            data.resolve(Path::new(".translation-cache")),
            PathBuf::from("/tmp/relnotes-test/.translation-cache")
        );
        assert_eq!(data.resolve(Path::new("/var/cache")), PathBuf::from("/var/cache"));
    }

    #[test]
    fn test_ensure_and_find_config() {
        let dir = tempfile::tempdir().unwrap();
        let data = DataDir::at(dir.path().join("nested"));
        data.ensure().unwrap();
        assert!(data.root().is_dir());
        assert!(data.find_config().is_none() || Path::new(CONFIG_FILE).is_file());

        fs::write(data.root().join(CONFIG_FILE), "cache:\n  max_age_days: 3\n").unwrap();
        let found = data.find_config().unwrap();
        assert!(found.ends_with(CONFIG_FILE));
    }
}
