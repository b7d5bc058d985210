//! Command-line front end.
//!
//! ```bash
//! # serve the TLS gateway in front of the local model
//! filename-translator gateway
//!
//! # translate a whole tree into translations.json, resuming earlier runs
//! filename-translator generate ~/Pictures --output translations.json
//!
//! # translate a few names through the batching queue
//! filename-translator translate 写真.jpg 夏休み.png
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use filename_translator_core::{
    list_directory, open_default, open_with, run_gateway, BatchScheduler, BulkGenerator,
    GenerateOptions, ProviderKind, Settings,
};
use futures::future::join_all;
use log::{debug, info};
use serde::Serialize;
use std::path::PathBuf;

/// Translate Japanese file names for display
#[derive(Parser, Debug)]
#[command(name = "filename-translator")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON settings file; environment options still override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Translation backend used by `generate`, `translate` and `list`
    #[arg(long, global = true)]
    provider: Option<Provider>,

    /// Target language code
    #[arg(long, global = true)]
    target: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the TLS gateway in front of the generation backend
    Gateway,
    /// Translate every file under a directory into a resumable database
    Generate {
        /// Directory to walk
        input: PathBuf,

        /// Database file to create or resume
        #[arg(short, long, default_value = "translations.json")]
        output: PathBuf,

        /// Remove entries for files that no longer exist
        #[arg(long)]
        prune: bool,
    },
    /// Translate file names through the batching queue
    Translate {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// List a directory, with translated display names
    List {
        dir: PathBuf,

        /// Skip translation and list raw names only
        #[arg(long)]
        raw: bool,
    },
    /// Open a file with the default handler or a given program
    Open {
        path: PathBuf,

        /// Program to launch instead of the default handler
        #[arg(long = "with")]
        program: Option<String>,

        /// Extra arguments passed before the path
        #[arg(last = true)]
        args: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Provider {
    /// Cloud translation API
    Cloud,
    /// Model server behind the gateway
    Proxy,
}

impl From<Provider> for ProviderKind {
    fn from(provider: Provider) -> Self {
        match provider {
            Provider::Cloud => ProviderKind::Cloud,
            Provider::Proxy => ProviderKind::Proxy,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NameReport {
    name: String,
    display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListedEntry {
    name: String,
    display_name: String,
    is_directory: bool,
    full_path: PathBuf,
}

fn init_logging(settings: &Settings) {
    env_logger::Builder::new()
        .filter_level(settings.log_level.to_level_filter())
        .parse_default_env()
        .init();
}

/// File settings (when given), then environment options, then flags.
fn load_settings(cli: &Cli) -> Result<Settings> {
    load_settings_with(cli, |key| std::env::var(key).ok())
}

fn load_settings_with<F>(cli: &Cli, lookup: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let base = match &cli.config {
        Some(path) => Settings::from_json_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    let mut settings = base
        .with_overrides(lookup)
        .context("invalid environment option")?;

    if let Some(provider) = cli.provider {
        settings.provider.kind = provider.into();
    }
    if let Some(target) = &cli.target {
        settings.provider.target_lang = target.clone();
    }
    Ok(settings)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn scheduler_for(settings: &Settings) -> Result<BatchScheduler> {
    let provider = settings
        .provider
        .kind
        .build(&settings.provider)
        .context("failed to set up translation provider")?;
    debug!("using {} provider", provider.name());
    Ok(BatchScheduler::new(
        provider,
        settings.batch,
        settings.provider.target_lang.clone(),
    ))
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    init_logging(&settings);

    match cli.command {
        Commands::Gateway => {
            run_gateway(&settings.gateway).await?;
        }
        Commands::Generate {
            input,
            output,
            prune,
        } => {
            let provider = settings
                .provider
                .kind
                .build(&settings.provider)
                .context("failed to set up translation provider")?;
            let generator = BulkGenerator::new(
                provider,
                settings.batch,
                settings.provider.target_lang.clone(),
            );
            let report = generator
                .run(&input, &output, GenerateOptions { prune_missing: prune })
                .await?;
            print_json(&report)?;
        }
        Commands::Translate { names } => {
            let scheduler = scheduler_for(&settings)?;
            let pending: Vec<_> = names.iter().map(|name| scheduler.submit(name)).collect();
            let outcomes = join_all(pending).await;
            let reports: Vec<NameReport> = names
                .into_iter()
                .zip(outcomes)
                .map(|(name, outcome)| NameReport {
                    display_name: outcome.display_or(&name).to_string(),
                    error: outcome.error,
                    name,
                })
                .collect();
            print_json(&reports)?;
        }
        Commands::List { dir, raw } => {
            let entries = list_directory(&dir)
                .with_context(|| format!("failed to list {}", dir.display()))?;
            let names: Vec<String> = if raw {
                entries.iter().map(|entry| entry.name.clone()).collect()
            } else {
                let scheduler = scheduler_for(&settings)?;
                let pending: Vec<_> = entries
                    .iter()
                    .map(|entry| scheduler.submit(&entry.name))
                    .collect();
                join_all(pending)
                    .await
                    .iter()
                    .zip(&entries)
                    .map(|(outcome, entry)| outcome.display_or(&entry.name).to_string())
                    .collect()
            };
            let listed: Vec<ListedEntry> = entries
                .into_iter()
                .zip(names)
                .map(|(entry, display_name)| ListedEntry {
                    name: entry.name,
                    display_name,
                    is_directory: entry.is_directory,
                    full_path: entry.full_path,
                })
                .collect();
            print_json(&listed)?;
        }
        Commands::Open {
            path,
            program,
            args,
        } => match program {
            Some(program) => {
                let pid = open_with(&program, &args, &path)?;
                info!("started {program} (pid {pid})");
            }
            None => open_default(&path)?,
        },
    }

    Ok(())
}
