// Relnotes Core Library
//
// Change detection and cached multilingual translation for product
// changelogs. Sources produce entries, the differ finds what changed, and
// the orchestrator translates only that, backed by a hash-keyed cache.

pub mod cache;
pub mod config;
pub mod diff;
pub mod entry_translator;
pub mod error;
pub mod feed;
pub mod orchestrator;
pub mod source;
pub mod storage;
pub mod sync;
pub mod translator;
pub mod types;

#[cfg(feature = "openai")]
pub mod openai;

// Re-export main types for easy use
pub use cache::{hash_text, CacheSettings, HashKeyStore};
pub use config::AppConfig;
pub use diff::{compare_entries, detect_changes, CompareOptions, ComparisonResult};
pub use entry_translator::{EntryTranslator, EntryTranslatorSettings};
pub use error::{CacheError, FeedError, SourceError, SyncError, TranslateError};
pub use feed::{ChangelogFeed, EntryQuery, FeedSettings};
pub use orchestrator::{BatchSettings, CacheOrchestrator};
pub use source::{ContentSource, ParseOptions, SnapshotFileSource};
pub use storage::{FileBackend, MemoryBackend, StoreBackend};
pub use sync::{SyncEngine, SyncOutcome, SyncRequest, SyncSettings};
pub use translator::{TranslationClient, TranslationOutcome, TranslationService};
pub use types::*;

// Re-export the bundled translation service for direct use
#[cfg(feature = "openai")]
pub use openai::OpenAiService;
