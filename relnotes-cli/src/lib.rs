// All translation and diff logic lives in relnotes-core
// This CLI wires it to the local data directory and a translation backend

// CLI-specific modules
pub mod data_dir;

// Re-export core types for convenience
pub use relnotes_core::*;

// Re-export CLI utilities
pub use data_dir::DataDir;

use anyhow::Result;
use std::sync::Arc;

/// Hash-keyed store rooted in the data directory
pub fn open_store(config: &AppConfig, data: &DataDir) -> HashKeyStore {
    let dir = data.resolve(&config.cache.dir);
    HashKeyStore::new(
        Box::new(FileBackend::new(dir, config.cache.file_name.clone())),
        config.cache_settings(),
    )
}

/// Translation service from the compiled-in backend
#[cfg(feature = "openai")]
pub fn create_service(config: &AppConfig) -> Result<Arc<dyn TranslationService>> {
    let service = OpenAiService::from_env(&config.openai)?;
    Ok(Arc::new(service))
}

/// Fallback when no backend is compiled in
#[cfg(not(feature = "openai"))]
pub fn create_service(_config: &AppConfig) -> Result<Arc<dyn TranslationService>> {
    Err(anyhow::anyhow!(
        "No translation backend compiled in!\n\
         Compile with: --features openai"
    ))
}

pub fn create_orchestrator(config: &AppConfig, data: &DataDir) -> Result<Arc<CacheOrchestrator>> {
    let service = create_service(config)?;
    Ok(Arc::new(CacheOrchestrator::new(
        TranslationClient::new(service),
        open_store(config, data),
        config.batch_settings(),
    )))
}

pub fn create_entry_translator(
    config: &AppConfig,
    data: &DataDir,
) -> Result<Arc<EntryTranslator>> {
    Ok(Arc::new(EntryTranslator::new(
        create_orchestrator(config, data)?,
        EntryTranslatorSettings {
            content_max_chars: config.translation.content_max_chars,
            max_section_titles: config.translation.max_section_titles,
        },
    )))
}

pub fn feed_settings(config: &AppConfig) -> FeedSettings {
    FeedSettings {
        snapshot_ttl: std::time::Duration::from_secs(config.feed.snapshot_ttl_secs),
        items_per_page: config.feed.items_per_page,
        max_limit: config.feed.max_limit,
        translate_batch_size: config.batching.feed_batch_size,
    }
}
