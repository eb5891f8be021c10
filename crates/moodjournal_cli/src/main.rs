//! Command-line front end for a local mood journal.
//!
//! # Responsibility
//! - Map subcommands onto `moodjournal_core::Store` operations.
//! - Keep output line-oriented so it can be piped.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use moodjournal_core::codec::parse_iso8601;
use moodjournal_core::store::DEFAULT_STORE_NAME;
use moodjournal_core::{
    init_logging, AppConfig, EntryContent, ExportBundle, LoggingConfig, Mood, OpenLock, Store,
    StoreConfig, StoreOptions,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "moodjournal")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding the store files
    #[arg(short, long, default_value = "./journal-data")]
    root: PathBuf,

    /// JSON config file; its store root replaces `--root`
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Name of the store inside the root directory
    #[arg(short, long, default_value = DEFAULT_STORE_NAME)]
    store: String,

    /// Directory for rolling log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Log at debug level; logs go to `<root>/logs` unless a log directory
    /// is configured
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a new entry
    Add {
        /// Mood level from 0 (very bad) to 4 (very good)
        #[arg(short, long)]
        mood: u8,

        /// Free text of the entry
        #[arg(short, long, default_value = "")]
        text: String,

        /// ISO-8601 timestamp; defaults to now
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Print every entry
    List,

    /// Delete every entry, keeping the client identity
    Clear,

    /// Write an export bundle as JSON
    Export {
        /// Output file; stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Rebuild a store from an export bundle
    Import {
        /// Bundle file produced by `export`
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (store_config, logging) = resolve_config(&cli)?;
    if let Some(logging) = logging {
        init_logging(&logging).context("failed to start logging")?;
    }

    let lock = OpenLock::new();
    match cli.command {
        Commands::Add { mood, text, date } => {
            let store = open_store(&store_config, &lock, &cli.store).await?;
            let mood = Mood::try_from(mood)?;
            let date = parse_date(date.as_deref())?;
            let id = store.add(date, EntryContent::new(mood, text)).await?;
            println!("{id}");
            store.close();
        }
        Commands::List => {
            let store = open_store(&store_config, &lock, &cli.store).await?;
            for entry in store.retrieve_all().await?.iter() {
                println!(
                    "{}\t{}\t{}\t{}",
                    entry.id(),
                    moodjournal_core::iso8601(&entry.date()),
                    entry.mood().label(),
                    entry.text()
                );
            }
            store.close();
        }
        Commands::Clear => {
            let store = open_store(&store_config, &lock, &cli.store).await?;
            store.clear().await?;
            store.close();
        }
        Commands::Export { out } => {
            let store = open_store(&store_config, &lock, &cli.store).await?;
            let json = store.export().await?.to_json()?;
            store.close();
            match out {
                Some(path) => std::fs::write(&path, json)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => println!("{json}"),
            }
        }
        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let bundle = ExportBundle::from_json(&text)?;
            let store = Store::from_export(&store_config, &lock, &bundle).await?;
            println!(
                "imported {} entries into {}",
                store.retrieve_all().await?.len(),
                store.name()
            );
            store.close();
        }
    }

    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<(StoreConfig, Option<LoggingConfig>)> {
    let (store, mut logging) = match &cli.config {
        Some(path) => {
            let config = AppConfig::from_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?;
            (config.store, config.logging)
        }
        None => (StoreConfig::new(&cli.root), None),
    };

    if let Some(log_dir) = &cli.log_dir {
        logging = Some(LoggingConfig::new(absolute(log_dir)?));
    }
    if cli.verbose {
        let config = match logging.take() {
            Some(config) => config,
            None => LoggingConfig::new(absolute(&store.root_dir.join("logs"))?),
        };
        logging = Some(config.with_level("debug"));
    }
    Ok((store, logging))
}

/// Log directories must be absolute; relative ones resolve against the
/// working directory.
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to read working directory")?;
    Ok(cwd.join(path))
}

async fn open_store(config: &StoreConfig, lock: &OpenLock, name: &str) -> Result<Store> {
    Store::open(config, lock, StoreOptions::named(name))
        .await
        .with_context(|| format!("failed to open store `{name}`"))
}

fn parse_date(value: Option<&str>) -> Result<DateTime<Utc>> {
    match value {
        Some(text) => parse_iso8601(text).with_context(|| format!("invalid date `{text}`")),
        None => Ok(Utc::now()),
    }
}
