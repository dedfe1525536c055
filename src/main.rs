//! contentflow CLI
//!
//! Runs the SLA sweep against a JSON store snapshot and exposes the content
//! tools (validation, link encoding, rendering, duplicate checks).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use contentflow_rs::config::PipelineConfig;
use contentflow_rs::content::{
    ContentValidator, DecodeOptions, DuplicateCorpus, DuplicateDetector, EncodeOptions,
    ShortcodeCodec,
};
use contentflow_rs::lifecycle::{Article, ArticleStore, LifecycleEngine, MemoryArticleStore};
use contentflow_rs::logging::{init_logging, LogConfig};
use contentflow_rs::publish::WordPressPublisher;

/// Content lifecycle and validation pipeline
#[derive(Parser)]
#[command(name = "contentflow")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./contentflow.toml when present)
    #[arg(short, long, global = true, env = "CONTENTFLOW_CONFIG")]
    config: Option<String>,

    /// Log level or filter directive, overrides the configuration
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Auto-decide overdue reviews and retry pending publications
    Sweep {
        /// JSON store snapshot, updated in place
        #[arg(long)]
        store: PathBuf,

        /// Evaluate deadlines as of this RFC 3339 instant instead of now
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },
    /// Validate an article body and print the report as JSON
    Validate {
        /// File containing the article body (HTML or shortcodes)
        file: PathBuf,

        #[arg(long, default_value = "")]
        title: String,

        /// Comma-separated target keywords
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,

        #[arg(long)]
        meta_description: Option<String>,

        #[arg(long, default_value = "article")]
        content_type: String,
    },
    /// Convert raw links into classified shortcodes
    Links {
        file: PathBuf,

        /// Leave existing shortcodes untouched instead of re-classifying them
        #[arg(long)]
        preserve_existing: bool,
    },
    /// Render shortcodes into HTML anchors
    Render { file: PathBuf },
    /// Check a candidate title and keywords against a corpus
    Duplicate {
        #[arg(long)]
        title: String,

        /// Comma-separated keywords
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,

        /// JSON file with `{"titles": [...], "keywords": [...]}`
        #[arg(long)]
        corpus: PathBuf,
    },
    /// Probe the configured WordPress site
    Health,
    /// Write an annotated sample configuration
    InitConfig {
        #[arg(short, long, default_value = "contentflow.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { output } = &cli.command {
        PipelineConfig::generate_sample_config(output)?;
        println!("Sample configuration written to {}", output.display());
        return Ok(());
    }

    let config = PipelineConfig::load(cli.config.as_deref())?;
    let mut log_config = LogConfig::from_settings(&config.logging);
    if let Some(level) = &cli.log_level {
        log_config = log_config.with_level(level.clone());
    }
    let _guard = init_logging(&log_config)?;

    match cli.command {
        Commands::Sweep { store, now } => run_sweep(&config, store, now).await,
        Commands::Validate {
            file,
            title,
            keywords,
            meta_description,
            content_type,
        } => {
            let body = read_file(&file).await?;
            let mut article = Article::new(title, body).with_keywords(keywords);
            article.meta_description = meta_description;
            article.content_type = content_type;

            let report = ContentValidator::new(config.validation.clone()).validate(&article);
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.valid {
                std::process::exit(2);
            }
            Ok(())
        }
        Commands::Links {
            file,
            preserve_existing,
        } => {
            let html = read_file(&file).await?;
            let codec = ShortcodeCodec::from_config(&config.links);
            let (encoded, stats) = codec.encode(&html, &EncodeOptions { preserve_existing });
            println!("{}", encoded);
            eprintln!("{}", serde_json::to_string(&stats)?);
            Ok(())
        }
        Commands::Render { file } => {
            let content = read_file(&file).await?;
            let options = DecodeOptions {
                new_tab: config.links.new_tab,
                nofollow: config.links.nofollow,
            };
            println!("{}", ShortcodeCodec::decode(&content, &options));
            Ok(())
        }
        Commands::Duplicate {
            title,
            keywords,
            corpus,
        } => {
            let raw = read_file(&corpus).await?;
            let corpus: DuplicateCorpus =
                serde_json::from_str(&raw).context("Failed to parse corpus JSON")?;
            let keywords: BTreeSet<String> = keywords.into_iter().collect();
            let verdict =
                DuplicateDetector::new(config.duplicates.clone()).check(&title, &keywords, &corpus);
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            Ok(())
        }
        Commands::Health => {
            let target = config
                .publish_target()
                .context("No [wordpress] section configured")?;
            let codec = ShortcodeCodec::from_config(&config.links);
            let publisher = WordPressPublisher::new(target, codec)?;
            let health = publisher.health_check().await;
            println!("{}", serde_json::to_string_pretty(&health)?);
            if !health.is_healthy() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::InitConfig { .. } => Ok(()),
    }
}

async fn run_sweep(
    config: &PipelineConfig,
    store_path: PathBuf,
    now: Option<DateTime<Utc>>,
) -> Result<()> {
    let store = if store_path.exists() {
        MemoryArticleStore::load(&store_path)
            .await
            .with_context(|| format!("Failed to load store {}", store_path.display()))?
    } else {
        warn!(path = %store_path.display(), "store snapshot not found, starting empty");
        MemoryArticleStore::new()
    };
    let shared: Arc<dyn ArticleStore> = Arc::new(store.clone());

    let mut engine = LifecycleEngine::new(shared, config);
    if let Some(target) = config.publish_target() {
        let codec = ShortcodeCodec::from_config(&config.links);
        let publisher = WordPressPublisher::new(target, codec)?;
        info!(url = %publisher.base_url(), "publishing enabled");
        engine = engine.with_publisher(Arc::new(publisher));
    }

    let report = engine.run_sla_sweep(now.unwrap_or_else(Utc::now)).await?;
    store
        .save(&store_path)
        .await
        .with_context(|| format!("Failed to save store {}", store_path.display()))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn read_file(path: &PathBuf) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}
