use std::path::PathBuf;

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

mod config;
mod db;
mod error;
#[cfg(test)]
mod memory;
mod models;
mod notify;
mod report;
mod rules;
mod store;
mod window;

use crate::config::Settings;
use crate::db::{ImportKind, PgStore};
use crate::rules::RuleSelection;
use crate::store::Store;

#[derive(Parser)]
#[command(name = "timesheet-alarms")]
#[command(about = "Timesheet, workload and rework alarm sweeps", long_about = None)]
struct Cli {
    /// Postgres connection string.
    #[arg(long = "database", env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo tenant
    Seed,
    /// Import timesheets or tasks from a CSV file
    Import {
        #[arg(long, value_enum)]
        kind: ImportKind,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Run one rule, or all of them, over every user in scope
    Run {
        #[arg(value_enum, default_value_t = RuleSelection::All)]
        rule: RuleSelection,
        /// Print summaries as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report of active notifications
    Report {
        #[arg(long)]
        tenant: Option<String>,
        /// Days of rework checks to include
        #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(i64).range(1..=366))]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting tracing default")?;

    let cli = Cli::parse();
    let thresholds = cli.settings.resolve()?;
    let database_url = cli
        .database_url
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool, Utc::now()).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { kind, csv } => {
            let inserted = db::import_csv(&pool, kind, &csv).await?;
            println!("Inserted {inserted} rows from {}.", csv.display());
        }
        Commands::Run { rule, json } => {
            let store = PgStore::new(pool.clone());
            tracing::info!(mode = ?thresholds.mode, ?rule, "starting run");

            let mut failed = 0;
            for rule in rule.rules() {
                let summary = rules::run(&store, rule, &thresholds, Utc::now())
                    .await
                    .with_context(|| format!("{rule} sweep aborted"))?;
                failed += summary.failed;
                if json {
                    println!("{}", serde_json::to_string(&summary)?);
                } else {
                    println!("{summary}");
                }
            }

            if failed > 0 {
                tracing::warn!(failed, "some users could not be evaluated");
            }
        }
        Commands::Report {
            tenant,
            since_days,
            out,
        } => {
            let store = PgStore::new(pool.clone());
            let now = Utc::now();
            let notifications = store.active_notifications(tenant.as_deref()).await?;
            let mut checks = store
                .recent_rework_checks(now - Duration::days(since_days))
                .await?;
            if let Some(tenant) = tenant.as_deref() {
                checks.retain(|check| check.tenant_id == tenant);
            }
            let report = report::build_report(tenant.as_deref(), now, &notifications, &checks);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
