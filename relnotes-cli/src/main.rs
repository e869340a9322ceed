use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// Import from relnotes-core
use relnotes_core::diff::{Node, Value};
use relnotes_core::source::{load_snapshot, save_snapshot};
use relnotes_core::sync::SyncReport;
use relnotes_core::{
    compare_entries, AppConfig, ChangelogFeed, CompareOptions, EntryQuery, Language,
    SnapshotFileSource, SyncEngine, SyncOutcome, SyncRequest,
};

// Import CLI utilities
use relnotes::{create_entry_translator, create_orchestrator, feed_settings, open_store, DataDir};

#[derive(Parser)]
#[command(name = "relnotes")]
#[command(about = "Detect changelog changes and keep cached translations in sync")]
struct Args {
    /// Path to custom config file (YAML format)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Data directory for the snapshot and translation cache
    /// (default: ~/.local/share/relnotes)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compare two changelog snapshots
    Diff {
        old: PathBuf,
        new: PathBuf,

        /// Write the full comparison as JSON
        #[arg(short, long)]
        export: Option<PathBuf>,

        /// Include unchanged entries in the export
        #[arg(long)]
        include_unchanged: bool,

        /// Ignore title/body/section changes
        #[arg(long)]
        ignore_content: bool,

        /// Ignore image and video changes
        #[arg(long)]
        ignore_media: bool,

        /// Sort new entries by version number, highest first
        #[arg(long)]
        by_version: bool,
    },

    /// Translate texts through the cache
    Translate {
        #[arg(required = true)]
        texts: Vec<String>,

        /// Comma-separated language codes (default: from config)
        #[arg(short, long, value_delimiter = ',')]
        languages: Vec<String>,
    },

    /// Translate only the text that changed between two JSON documents
    Changes {
        current: PathBuf,

        #[arg(short, long)]
        previous: Option<PathBuf>,

        #[arg(short, long, value_delimiter = ',')]
        languages: Vec<String>,
    },

    /// Fetch the changelog, diff against the last snapshot, translate changes
    Sync {
        /// Changelog snapshot file to sync from
        #[arg(short, long)]
        source: PathBuf,

        #[arg(short, long, value_delimiter = ',')]
        languages: Vec<String>,

        /// Ignore the stored baseline and translate everything
        #[arg(long)]
        no_baseline: bool,

        /// Write the sync report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Sync repeatedly until interrupted
    Watch {
        #[arg(short, long)]
        source: PathBuf,

        /// Seconds between syncs (default: recommended interval from config)
        #[arg(short, long)]
        interval: Option<u64>,

        #[arg(short, long, value_delimiter = ',')]
        languages: Vec<String>,
    },

    /// List changelog entries, optionally translated
    List {
        #[arg(short, long)]
        source: PathBuf,

        #[arg(long)]
        lang: Option<Language>,

        #[arg(long)]
        version: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Browse entries by publication date
    Dates {
        #[arg(short, long)]
        source: PathBuf,

        /// Zero-based page of dates
        #[arg(short, long, default_value_t = 0)]
        page: usize,

        /// Show entries for one date instead of a page of dates
        #[arg(short, long)]
        date: Option<String>,

        #[arg(long)]
        lang: Option<Language>,
    },

    /// Inspect or maintain the translation cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Print the effective configuration and exit
    ShowConfig,
}

#[derive(Subcommand)]
enum CacheAction {
    Stats,
    /// Remove expired entries
    Clean,
    /// Delete the whole cache
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    println!("🦀 Relnotes Changelog Translator");

    let data = match &args.data_dir {
        Some(dir) => DataDir::at(dir),
        None => DataDir::new()?,
    };
    let config_path = args
        .config
        .clone()
        .or_else(|| data.find_config().map(|p| p.display().to_string()));
    let config = AppConfig::load_with_fallback(config_path.as_deref());
    tracing::debug!(data_dir = %data.root().display(), "using data directory");

    if let Some(path) = &config_path {
        println!("📋 Loaded config from: {}", path);
    } else {
        println!("📋 Using default config");
    }

    let result = match args.command {
        Command::Diff {
            old,
            new,
            export,
            include_unchanged,
            ignore_content,
            ignore_media,
            by_version,
        } => {
            let options = CompareOptions {
                include_content_changes: !ignore_content,
                include_media_changes: !ignore_media,
                prioritize_version_order: by_version,
                debug: args.verbose,
            };
            run_diff(&old, &new, &options, export.as_deref(), include_unchanged)
        }
        Command::Translate { texts, languages } => {
            run_translate(&config, &data, &texts, &languages).await
        }
        Command::Changes {
            current,
            previous,
            languages,
        } => run_changes(&config, &data, &current, previous.as_deref(), &languages).await,
        Command::Sync {
            source,
            languages,
            no_baseline,
            output,
        } => run_sync(&config, &data, &source, languages, no_baseline, output.as_deref()).await,
        Command::Watch {
            source,
            interval,
            languages,
        } => {
            let interval = interval.unwrap_or(config.sync.recommended_interval_secs);
            run_watch(&config, &data, &source, languages, Duration::from_secs(interval)).await
        }
        Command::List {
            source,
            lang,
            version,
            limit,
        } => {
            let query = EntryQuery {
                language: lang,
                version,
                limit,
            };
            run_list(&config, &data, &source, query).await
        }
        Command::Dates {
            source,
            page,
            date,
            lang,
        } => run_dates(&config, &data, &source, page, date.as_deref(), lang).await,
        Command::Cache { action } => run_cache(&config, &data, action),
        Command::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    };

    if let Err(e) = &result {
        eprintln!("❌ {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("relnotes={level},relnotes_core={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Requested languages, or the configured defaults when none are given
fn resolve_languages(config: &AppConfig, codes: &[String]) -> Result<Vec<Language>> {
    if codes.is_empty() {
        return Ok(config.translation.languages.clone());
    }
    let languages = Language::parse_list(codes.iter().map(String::as_str));
    if languages.is_empty() {
        bail!(
            "No valid languages in {:?}. Supported: {}",
            codes,
            supported_codes()
        );
    }
    Ok(languages)
}

fn supported_codes() -> String {
    Language::ALL
        .iter()
        .map(|l| l.code())
        .collect::<Vec<_>>()
        .join(", ")
}

fn run_diff(
    old: &Path,
    new: &Path,
    options: &CompareOptions,
    export: Option<&Path>,
    include_unchanged: bool,
) -> Result<()> {
    let previous = load_snapshot(old)?;
    let current = load_snapshot(new)?;
    let result = compare_entries(&previous, &current, options);
    let summary = &result.summary;

    println!("📊 Comparison:");
    println!("   - Previous entries: {}", summary.total_cached);
    println!("   - Current entries:  {}", summary.total_new);
    println!("   - New:       {}", summary.new_count);
    println!("   - Updated:   {}", summary.updated_count);
    println!("   - Deleted:   {}", summary.deleted_count);
    println!("   - Unchanged: {}", summary.unchanged_count);

    for entry in &result.new_entries {
        println!("  ➕ {} ({}) {}", entry.version, entry.date, entry.title);
    }
    for update in &result.updated_entries {
        println!(
            "  🔄 {} ({}) {}",
            update.new_entry.version, update.new_entry.date, update.new_entry.title
        );
    }
    for entry in &result.deleted_entries {
        println!("  ➖ {} ({}) {}", entry.version, entry.date, entry.title);
    }

    if !result.has_changes() {
        println!("✅ No changes");
    }

    if let Some(path) = export {
        let json = serde_json::to_string_pretty(&result.export_json(include_unchanged))?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("💾 Comparison saved to: {}", path.display());
    }
    Ok(())
}

async fn run_translate(
    config: &AppConfig,
    data: &DataDir,
    texts: &[String],
    codes: &[String],
) -> Result<()> {
    let languages = resolve_languages(config, codes)?;
    let orchestrator = create_orchestrator(config, data)?;
    println!("🌐 Translating {} text(s) via {}", texts.len(), orchestrator.client().service_name());

    let result = orchestrator.translate_texts(texts, &languages).await?;
    for (text, translations) in texts.iter().zip(&result.translations) {
        println!("\n📝 {}", text);
        for (lang, translated) in translations {
            println!("   {}: {}", lang, translated);
        }
    }

    println!(
        "\n📊 Cache: {} hit(s), {} miss(es), hit rate {}",
        result.stats.cache_hits, result.stats.cache_misses, result.stats.hit_rate
    );
    for failure in &result.errors {
        println!(
            "⚠️  Batch {} ({} texts) used source text: {}",
            failure.batch_index + 1,
            failure.texts,
            failure.reason
        );
    }
    Ok(())
}

fn load_node(path: &Path) -> Result<Node> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    match Value::from(json) {
        Value::Node(node) => Ok(node),
        _ => bail!("{} must contain a JSON object", path.display()),
    }
}

async fn run_changes(
    config: &AppConfig,
    data: &DataDir,
    current: &Path,
    previous: Option<&Path>,
    codes: &[String],
) -> Result<()> {
    let languages = resolve_languages(config, codes)?;
    let current = load_node(current)?;
    let previous = previous.map(load_node).transpose()?;

    let orchestrator = create_orchestrator(config, data)?;
    let result = orchestrator
        .translate_changes(previous.as_ref(), &current, &languages)
        .await?;

    if result.translations.is_empty() {
        println!("✅ Nothing to translate");
        return Ok(());
    }

    for (path, translations) in &result.translations {
        println!("\n📝 {}", path);
        for (lang, translated) in translations {
            println!("   {}: {}", lang, translated);
        }
    }
    println!(
        "\n📊 Cache: {} hit(s), {} miss(es), hit rate {}",
        result.stats.cache_hits, result.stats.cache_misses, result.stats.hit_rate
    );
    Ok(())
}

fn create_engine(config: &AppConfig, data: &DataDir, source: &Path) -> Result<SyncEngine> {
    Ok(SyncEngine::new(
        Arc::new(SnapshotFileSource::new(source)),
        create_entry_translator(config, data)?,
        config.sync_settings(),
    ))
}

/// Seed the engine with the stored snapshot, if there is one
async fn seed_baseline(engine: &SyncEngine, data: &DataDir) {
    let path = data.snapshot_path();
    if !path.exists() {
        return;
    }
    match load_snapshot(&path) {
        Ok(entries) => {
            println!("📋 Baseline: {} entries from {}", entries.len(), path.display());
            engine.seed(entries).await;
        }
        Err(e) => println!("⚠️  Ignoring unreadable baseline: {e}"),
    }
}

fn print_report(report: &SyncReport) {
    let icon = if report.success { "✅" } else { "⚠️ " };
    println!("{} Sync {} finished in {} ms", icon, report.run_id, report.duration_ms);
    println!("   - Total entries: {}", report.total_entries);
    println!("   - New:     {}", report.new_entries);
    println!("   - Updated: {}", report.updated_entries);
    println!("   - Deleted: {}", report.deleted_entries);
    for (lang, count) in &report.translated_counts {
        println!("   - {} ({}): {} translated", lang.display_name(), lang, count);
    }
    for error in &report.errors {
        println!("⚠️  {}", error);
    }
}

async fn run_sync(
    config: &AppConfig,
    data: &DataDir,
    source: &Path,
    languages: Vec<String>,
    no_baseline: bool,
    output: Option<&Path>,
) -> Result<()> {
    let engine = create_engine(config, data, source)?;
    if !no_baseline {
        seed_baseline(&engine, data).await;
    }

    let request = SyncRequest {
        languages: (!languages.is_empty()).then_some(languages),
        force: true,
    };
    println!("🔄 Syncing from {}", source.display());

    let outcome = engine.sync(request).await?;
    if let SyncOutcome::Completed(report) = &outcome {
        print_report(report);
        if report.success {
            data.ensure()?;
            save_snapshot(&data.snapshot_path(), &engine.snapshot().await)?;
            println!("💾 Baseline saved to: {}", data.snapshot_path().display());
        }
    }

    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&outcome)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("💾 Report saved to: {}", path.display());
    }
    Ok(())
}

async fn run_watch(
    config: &AppConfig,
    data: &DataDir,
    source: &Path,
    languages: Vec<String>,
    interval: Duration,
) -> Result<()> {
    let engine = create_engine(config, data, source)?;
    seed_baseline(&engine, data).await;
    let languages = (!languages.is_empty()).then_some(languages);

    println!("👀 Watching {} every {}s (Ctrl-C to stop)", source.display(), interval.as_secs());

    loop {
        println!("\n🕐 {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
        let request = SyncRequest {
            languages: languages.clone(),
            force: false,
        };
        match engine.sync(request).await {
            Ok(SyncOutcome::Completed(report)) => {
                print_report(&report);
                if report.success {
                    data.ensure()?;
                    save_snapshot(&data.snapshot_path(), &engine.snapshot().await)?;
                }
            }
            Ok(SyncOutcome::Skipped(skip)) => {
                println!("⏭️  Skipped, next sync allowed at {}", skip.next_allowed_sync);
            }
            Err(e) => println!("❌ Sync failed: {e}"),
        }

        let status = engine.status().await;
        println!(
            "📊 {} entries, {} translated, next recommended sync: {}",
            status.total_entries,
            status.translated_entries,
            status
                .next_recommended_sync
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "now".to_string())
        );

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("\n👋 Stopping");
                return Ok(());
            }
        }
    }
}

fn create_feed(config: &AppConfig, data: &DataDir, source: &Path) -> Result<ChangelogFeed> {
    Ok(ChangelogFeed::new(
        Arc::new(SnapshotFileSource::new(source)),
        create_entry_translator(config, data)?,
        feed_settings(config),
    ))
}

async fn run_list(
    config: &AppConfig,
    data: &DataDir,
    source: &Path,
    query: EntryQuery,
) -> Result<()> {
    let feed = create_feed(config, data, source)?;
    let page = feed.entries(query).await?;

    println!(
        "📋 {} of {} entries (language: {})",
        page.total, page.original_total, page.metadata.language
    );
    for entry in &page.entries {
        println!("\n🏷️  {} - {} ({})", entry.version, entry.title, entry.date);
        for section in &entry.sections {
            println!("   • {}", section.title);
        }
    }
    Ok(())
}

async fn run_dates(
    config: &AppConfig,
    data: &DataDir,
    source: &Path,
    page: usize,
    date: Option<&str>,
    lang: Option<Language>,
) -> Result<()> {
    let feed = create_feed(config, data, source)?;

    if let Some(date) = date {
        let result = feed.entries_for_date(date, lang).await?;
        let nav = &result.navigation;
        println!("📅 {} ({} entries)", nav.current_date, result.entries.len());
        for entry in &result.entries {
            println!("   🏷️  {} - {}", entry.version, entry.title);
        }
        if let Some(newer) = &nav.next_date {
            println!("   ⬆️  Newer: {}", newer);
        }
        if let Some(older) = &nav.prev_date {
            println!("   ⬇️  Older: {}", older);
        }
        return Ok(());
    }

    let result = feed.date_page(page, lang).await?;
    let p = &result.pagination;
    println!(
        "📅 Page {} of {} ({} dates)",
        p.current_page + 1,
        p.total_pages.max(1),
        p.total_dates
    );
    for bucket in &result.dates {
        println!("   {}  {} entr{}", bucket.date, bucket.count, if bucket.count == 1 { "y" } else { "ies" });
    }
    Ok(())
}

fn run_cache(config: &AppConfig, data: &DataDir, action: CacheAction) -> Result<()> {
    let store = open_store(config, data);
    match action {
        CacheAction::Stats => {
            let stats = store.stats();
            println!("💾 Cache at {}", store.location().display());
            println!("   - Entries: {}", stats.total_entries);
            println!("   - Size:    {}", stats.cache_size);
            println!("   - Max age: {} days", config.cache.max_age_days);
            if let (Some(oldest), Some(newest)) = (stats.oldest_entry, stats.newest_entry) {
                println!("   - Oldest:  {}", oldest.to_rfc3339());
                println!("   - Newest:  {}", newest.to_rfc3339());
            }
        }
        CacheAction::Clean => {
            let removed = store.clean_expired()?;
            println!("🧹 Removed {} expired entr{}", removed, if removed == 1 { "y" } else { "ies" });
        }
        CacheAction::Clear => {
            store.clear()?;
            println!("🗑️  Cache cleared");
        }
    }
    Ok(())
}
