use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

mod db;
mod metrics;
mod models;
mod report;
mod windows;

#[derive(Parser)]
#[command(name = "patent-usage-metrics")]
#[command(about = "User and project activity reporting for AxonPatent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import project action history from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Generate the user metrics CSV report
    Report {
        /// Roster JSON exported from the application database
        #[arg(long)]
        roster: PathBuf,
        #[arg(long, default_value = "metrics.csv")]
        out: PathBuf,
        /// Reference instant for the analysis windows (RFC 3339); defaults to now
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to the project document store")?;

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
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} actions from {}.", csv.display());
        }
        Commands::Report { roster, out, as_of } => {
            let data = std::fs::read_to_string(&roster)
                .with_context(|| format!("failed to read roster {}", roster.display()))?;
            let users: Vec<models::User> =
                serde_json::from_str(&data).context("roster JSON is malformed")?;

            let documents = db::fetch_projects(&pool).await?;
            let now = as_of.unwrap_or_else(Utc::now);

            let table = metrics::build_metrics_table(&users, &documents, now);
            report::write_csv(&out, &table)?;
            println!(
                "Report written to {} ({} users, {} projects).",
                out.display(),
                users.len(),
                documents.len()
            );
        }
    }

    Ok(())
}
