use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use import_server::config::ImportConfig;
use import_server::import::{ImportError, ImportOrchestrator};
use import_server::models::ImportRecord;
use import_server::store::run_migrations;
use import_server::validation::validate_batch;

#[derive(Parser, Debug)]
#[command(
    name = "import_file",
    about = "Import a JSON array of records through the idempotent import pipeline"
)]
struct Args {
    /// Path to a JSON file containing an array of `{name, email, metadata?}` records.
    #[arg(long)]
    file: PathBuf,

    /// Idempotency key. Re-running with the same key never re-applies the import.
    #[arg(long)]
    token: Option<String>,

    /// Records per set-based write; defaults to IMPORT_CHUNK_SIZE or 500.
    #[arg(long)]
    chunk_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();

    let mut config = ImportConfig::from_env();
    if let Some(chunk_size) = args.chunk_size {
        config = config.with_chunk_size(chunk_size);
    }

    let raw = std::fs::read_to_string(&args.file)?;
    let records: Vec<ImportRecord> = serde_json::from_str(&raw)?;

    if let Err(err) = validate_batch(&records, &config) {
        writeln!(io::stderr(), "error: {err}")?;
        std::process::exit(2);
    }

    let token = match args.token {
        Some(token) if !token.trim().is_empty() => token.trim().to_string(),
        Some(_) => {
            writeln!(io::stderr(), "error: --token must not be blank")?;
            std::process::exit(2);
        }
        None => {
            let token = Uuid::new_v4().to_string();
            writeln!(
                io::stderr(),
                "warning: no --token given; generated '{token}'. Pass it on re-runs to avoid re-importing."
            )?;
            token
        }
    };

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;
    run_migrations(&pool).await?;

    let orchestrator = ImportOrchestrator::new(pool.clone(), &config);
    let outcome = match orchestrator.run(&token, records).await {
        Ok(outcome) => outcome,
        Err(err @ ImportError::InProgress { .. }) => {
            writeln!(io::stderr(), "error: {err}")?;
            std::process::exit(3);
        }
        Err(err) => return Err(err.into()),
    };

    let summary = outcome.summary();
    let report = serde_json::json!({
        "jobId": outcome.job_id(),
        "token": token,
        "total": summary.total,
        "inserted": summary.inserted,
        "updated": summary.updated,
        "duplicate": outcome.is_duplicate(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    pool.close().await;
    Ok(())
}
