mod browser;
mod catalog;
mod config;
mod harvest;
mod models;
mod notify;
mod parser;
mod pricing;
mod storage;
mod utils;

use anyhow::{bail, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::browser::{load_cookie_jar, SnapshotBrowser};
use crate::catalog::Catalog;
use crate::config::{AppConfig, TelegramEnv};
use crate::harvest::{dispatch, Harvester};
use crate::notify::{LogNotifier, Notifier, TelegramNotifier};
use crate::parser::corrections::CorrectionsAid;
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "mercado-scout", about = "Marketplace used-car harvester & qualifier", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Run one harvest pass over the catalog (cron mode)
    Harvest {
        /// Directory of saved result pages to replay instead of a live browser
        #[arg(long)]
        snapshots: Option<PathBuf>,

        /// Log messages instead of sending them
        #[arg(long)]
        dry_run: bool,

        /// Restrict the pass to these catalog models
        #[arg(long)]
        models: Vec<String>,

        /// Skip models whose 30-day yield ratio is below this threshold
        #[arg(long)]
        skip_low_yield: Option<f64>,

        /// CSV of manual (text,year) corrections for the parser
        #[arg(long)]
        corrections: Option<PathBuf>,
    },

    /// Show database statistics
    Stats,

    /// List the model catalog with default reference prices
    Models,

    /// Per-model yield ratios over the last N days
    Yield {
        #[arg(short, long, default_value_t = 30)]
        days: i64,
    },

    /// Apply schema migrations without scraping
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "mercado_scout=info,warn",
        1 => "mercado_scout=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;
    let catalog = Catalog::builtin();

    match cli.command {
        Command::Harvest { snapshots, dry_run, models, skip_low_yield, corrections } => {
            let _t = config::debug_timing_enabled().then(|| utils::Timer::start("Harvest pass"));

            let repo = Repository::open(&config.storage.db_path)?;
            if config.storage.run_migrations {
                repo.run_migrations()?;
            }

            let notifier: Box<dyn Notifier> = if dry_run {
                Box::new(LogNotifier)
            } else {
                let creds = TelegramEnv::from_env()?;
                Box::new(TelegramNotifier::new(creds.bot_token, creds.chat_id))
            };

            let mut targets = if models.is_empty() {
                catalog.model_names()
            } else {
                for m in &models {
                    if !catalog.contains(m) {
                        bail!("'{}' is not a catalog model (see `mercado-scout models`)", m);
                    }
                }
                models
            };

            if let Some(threshold) = skip_low_yield {
                let low = repo.low_yield_models(threshold, 30)?;
                if !low.is_empty() {
                    info!("Skipping low-yield models: {}", low.join(", "));
                    targets.retain(|m| !low.contains(m));
                }
            }

            let corrections_path = corrections.or(config.harvester.corrections_path.clone());
            let aid = match corrections_path {
                Some(path) => Some(CorrectionsAid::load_csv(&path, &catalog)?),
                None => None,
            };

            let Some(snapshot_dir) = snapshots else {
                bail!(
                    "no browser driver available: pass --snapshots <dir> with saved result pages"
                );
            };
            let jar = load_cookie_jar(&config.harvester.cookies_path)?;
            let browser = SnapshotBrowser::new(snapshot_dir, jar);

            let mut harvester = Harvester::new(&config.harvester, &catalog, &repo, browser);
            if let Some(aid) = aid.as_ref() {
                harvester = harvester.with_corrections(aid);
            }

            let outcome = harvester.run(&targets).await?;
            dispatch(notifier.as_ref(), &repo, &outcome, Local::now()).await?;

            info!(
                "Done: {} models, {} saved, {} relevant, {} errors",
                outcome.stats.models_processed,
                outcome.stats.listings_saved,
                outcome.stats.relevant,
                outcome.stats.errors
            );

            repo.close()?;
        }

        Command::Stats => {
            let repo = Repository::open(&config.storage.db_path)?;
            let listings = repo.listing_count()?;
            let relevant = repo.relevant_count()?;
            let cursors = repo.list_progress()?;
            let (min, max) = repo.date_range().unwrap_or((None, None));
            println!("─────────────────────────────────");
            println!("  mercado-scout — Store Stats");
            println!("─────────────────────────────────");
            println!("  Listings : {}", utils::fmt_number(listings));
            println!("  Relevant : {}", utils::fmt_number(relevant));
            println!("  Cursors  : {}", cursors.len());
            println!("  From     : {}", min.map(|d| d.to_string()).unwrap_or("—".into()));
            println!("  To       : {}", max.map(|d| d.to_string()).unwrap_or("—".into()));
            println!("─────────────────────────────────");
        }

        Command::Models => {
            println!("{} catalog models:", catalog.models().len());
            for m in catalog.models() {
                println!("  {:24} Q{}", m.name, utils::fmt_number(m.default_reference_price));
            }
        }

        Command::Yield { days } => {
            let repo = Repository::open(&config.storage.db_path)?;
            println!("Yield over the last {} days:", days);
            for m in catalog.models() {
                let ratio = repo.model_yield(m.name, days)?;
                println!("  {:24} {:.2}", m.name, ratio);
            }
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}
