//! # Vacancy Harvester CLI (`vh`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vh init` | Create the SQLite database and run schema migrations |
//! | `vh scrape` | Run one authenticated scrape and print the summary |
//! | `vh stats` | Print database statistics |
//! | `vh export` | Export stored vacancies as CSV |
//! | `vh get <id>` | Print one stored vacancy with its child rows |
//! | `vh serve` | Start the HTTP front door |
//!
//! Credentials are read from `HARVESTER_EMAIL` / `HARVESTER_PASSWORD`;
//! everything else comes from the TOML config file.

mod auth;
mod config;
mod db;
mod error;
mod export;
mod graphql;
mod migrate;
mod models;
mod notify;
mod pages;
mod reconcile;
mod scrape;
mod server;
mod stats;
mod store;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::auth::AuthSession;
use crate::config::{Config, Credentials};
use crate::graphql::GraphQlClient;
use crate::pages::GraphQlSource;

/// Vacancy Harvester — scrape a GraphQL staffing marketplace into SQLite
/// with change detection.
#[derive(Parser)]
#[command(
    name = "vh",
    about = "Vacancy Harvester — authenticated GraphQL vacancy scraper with change detection",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/harvester.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Run one scrape: fetch all pages, reconcile, record the run.
    Scrape,

    /// Print database statistics.
    Stats,

    /// Export stored vacancies as CSV.
    Export {
        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print one stored vacancy with its schedule, requirement, and
    /// pricing rows.
    Get {
        /// Vacancy id.
        id: String,
    },

    /// Start the HTTP front door.
    Serve,
}

/// Construct the GraphQL-backed source: session, client, paginator. The
/// session is built once here and owned by the caller — there is no
/// process-global client.
fn build_source(cfg: &Config) -> Result<Arc<GraphQlSource>> {
    let credentials = Credentials::from_env()?;
    let session = Arc::new(AuthSession::new(cfg.source.clone(), credentials)?);
    let client = GraphQlClient::new(cfg.source.clone(), session)?;
    Ok(Arc::new(GraphQlSource::new(client, cfg.scrape.page_size)))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
            pool.close().await;
        }
        Commands::Scrape => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            let source = build_source(&cfg)?;
            let sqlite = store::SqliteStore::new(pool.clone());

            let report =
                scrape::run_scrape(source.as_ref(), &sqlite, cfg.scrape.max_pages).await?;

            if let Some(webhook_url) = &cfg.notify.webhook_url {
                notify::send_run_notice(webhook_url, &report).await;
            }

            println!("{}", serde_json::to_string_pretty(&report)?);
            pool.close().await;
        }
        Commands::Stats => {
            let pool = db::connect(&cfg.db.path).await?;
            let report = stats::gather_stats(&pool).await?;
            stats::print_stats(&report);
            pool.close().await;
        }
        Commands::Export { output } => {
            let pool = db::connect(&cfg.db.path).await?;
            export::run_export(&pool, output.as_deref()).await?;
            pool.close().await;
        }
        Commands::Get { id } => {
            let pool = db::connect(&cfg.db.path).await?;
            match store::load_detail(&pool, &id).await? {
                Some(detail) => println!("{}", serde_json::to_string_pretty(&detail)?),
                None => anyhow::bail!("no vacancy with id: {}", id),
            }
            pool.close().await;
        }
        Commands::Serve => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            let source = build_source(&cfg)?;
            server::run_server(&cfg, pool, source).await?;
        }
    }

    Ok(())
}
