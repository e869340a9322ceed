use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Where the serialized translation cache lives.
///
/// Backends move whole documents: the store reads everything on each call
/// and rewrites everything on each mutation.
pub trait StoreBackend {
    /// Raw contents, or `None` when nothing has been persisted yet
    fn load(&self) -> io::Result<Option<String>>;
    fn save(&self, contents: &str) -> io::Result<()>;
    /// Delete the persisted document. Succeeds when there is nothing to delete.
    fn remove(&self) -> io::Result<()>;
    /// Size of the persisted document in bytes (0 when absent)
    fn size_bytes(&self) -> u64;
    fn location(&self) -> PathBuf;
}

/// File-based backend: one JSON document inside a cache directory
pub struct FileBackend {
    cache_dir: PathBuf,
    file_name: String,
}

pub const DEFAULT_CACHE_DIR: &str = ".translation-cache";
pub const DEFAULT_CACHE_FILE: &str = "translations.json";

impl FileBackend {
    pub fn new(cache_dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            file_name: file_name.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.cache_dir.join(&self.file_name)
    }
}

impl Default for FileBackend {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_DIR, DEFAULT_CACHE_FILE)
    }
}

impl StoreBackend for FileBackend {
    fn load(&self) -> io::Result<Option<String>> {
        let path = self.path();
        if Path::new(&path).exists() {
            Ok(Some(fs::read_to_string(path)?))
        } else {
            Ok(None)
        }
    }

    fn save(&self, contents: &str) -> io::Result<()> {
        // Directory may have been removed since construction
        fs::create_dir_all(&self.cache_dir)?;
        fs::write(self.path(), contents)
    }

    fn remove(&self) -> io::Result<()> {
        match fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn size_bytes(&self) -> u64 {
        fs::metadata(self.path()).map(|m| m.len()).unwrap_or(0)
    }

    fn location(&self) -> PathBuf {
        self.path()
    }
}

/// In-memory backend for tests and throwaway runs
#[derive(Default)]
pub struct MemoryBackend {
    contents: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document, e.g. a corrupt or outdated one
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(Some(contents.into())),
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        // A poisoned lock still holds a complete document
        self.contents.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StoreBackend for MemoryBackend {
    fn load(&self) -> io::Result<Option<String>> {
        Ok(self.lock().clone())
    }

    fn save(&self, contents: &str) -> io::Result<()> {
        *self.lock() = Some(contents.to_string());
        Ok(())
    }

    fn remove(&self) -> io::Result<()> {
        *self.lock() = None;
        Ok(())
    }

    fn size_bytes(&self) -> u64 {
        self.lock().as_ref().map(|c| c.len() as u64).unwrap_or(0)
    }

    fn location(&self) -> PathBuf {
        PathBuf::from(":memory:")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_backend_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(temp_dir.path().join("nested"), "t.json");

        assert_eq!(backend.load().unwrap(), None);
        backend.save("{}").unwrap();
        assert_eq!(backend.load().unwrap().as_deref(), Some("{}"));
        assert_eq!(backend.size_bytes(), 2);
    }

    #[test]
    fn test_file_backend_remove_is_idempotent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(temp_dir.path(), "t.json");

        backend.remove().unwrap();
        backend.save("x").unwrap();
        backend.remove().unwrap();
        backend.remove().unwrap();
        assert_eq!(backend.load().unwrap(), None);
        assert_eq!(backend.size_bytes(), 0);
    }

    #[test]
    fn test_memory_backend() {
        let backend = MemoryBackend::with_contents("abc");
        assert_eq!(backend.size_bytes(), 3);
        backend.remove().unwrap();
        assert_eq!(backend.contents(), None);
    }
}
