//! Ingestor CLI
//!
//! Local trigger entry point: one invocation runs the selected sources once.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use ingestor::{
    error::{AppError, Result},
    models::{Config, DocType},
    pipeline::Ingestor,
    sources::Credentials,
    storage::{DocumentSink, LocalStorage},
    utils::{http, log as report},
};

/// Pulls posts, articles, videos and weather into a deduplicated store
#[derive(Parser, Debug)]
#[command(name = "ingest", version, about = "Incremental multi-source ingestion")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "ingest.toml")]
    config: PathBuf,

    /// Storage directory (overrides `storage.root` from the config)
    #[arg(short, long)]
    storage_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run sources once (all enabled sources when none are named)
    Run {
        /// Source id to run (repeatable)
        #[arg(long = "source", value_name = "ID")]
        sources: Vec<String>,
    },

    /// List configured sources
    List,

    /// Validate the configuration file
    Validate,

    /// Print a stored document
    Show {
        /// Document type, e.g. `news` or `music_video`
        #[arg(long = "type", value_name = "TYPE")]
        doc_type: DocType,

        /// Natural key (URL, or `date|lat|lon` for weather)
        #[arg(long)]
        key: String,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
    report::init(level);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load_or_default(&cli.config);
    if let Some(dir) = cli.storage_dir {
        config.storage.root = dir;
    }
    log::info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Run { sources } => {
            config.validate()?;

            let creds = Credentials::from_lookup(|k| std::env::var(k).ok());
            let client = http::create_async_client(&config.ingest)?;
            let sink: Arc<dyn DocumentSink> = Arc::new(LocalStorage::new(&config.storage.root));
            let ingestor = Ingestor::from_config(&config, &client, &creds, sink)?;

            let cancel = ingestor.cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupted, stopping after the current item...");
                    cancel.cancel();
                }
            });

            let now = Utc::now();
            let summaries = if sources.is_empty() {
                ingestor.run_all(now).await
            } else {
                ingestor.run_selected(&sources, now).await
            };
            report::run_report(&summaries);

            let failed = summaries.iter().filter(|s| !s.is_success()).count();
            if failed > 0 {
                log::error!("{} of {} sources failed", failed, summaries.len());
                std::process::exit(1);
            }
        }

        Command::List => {
            for source in &config.sources {
                report::sub_item(&format!(
                    "{:<20} {:<18} {}",
                    source.id,
                    source.kind.name(),
                    if source.enabled { "enabled" } else { "disabled" }
                ));
            }
            if config.sources.is_empty() {
                log::warn!("No sources configured in {}", cli.config.display());
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!(
                "✓ Config OK ({} sources, {} enabled)",
                config.sources.len(),
                config.enabled_sources().count()
            );
        }

        Command::Show { doc_type, key } => {
            let storage = LocalStorage::new(&config.storage.root);
            match storage.find(doc_type, &key).await? {
                Some(doc) => println!("{}", serde_json::to_string_pretty(&doc)?),
                None => {
                    return Err(AppError::validation(format!(
                        "no {doc_type} document with key '{key}'"
                    )));
                }
            }
        }
    }

    Ok(())
}
