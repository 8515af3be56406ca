//! CSV house import.
//!
//! Reads `<CODE>.csv` house files and upserts them into ScyllaDB, where the
//! `reverse` server can load them from.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use house_resolver::storage::{CsvDataSource, HouseRow, ScyllaDataSource};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Import CSV house files into ScyllaDB")]
struct Args {
    /// Directory containing <CODE>.csv house files
    #[arg(short, long)]
    dir: PathBuf,

    /// ScyllaDB URL
    #[arg(long, default_value = "127.0.0.1:9042")]
    scylla_url: String,

    /// Keyspace to write into
    #[arg(long, default_value = "houses")]
    keyspace: String,

    /// Only import these country codes
    #[arg(long, value_delimiter = ',')]
    countries: Vec<String>,

    /// Concurrent upserts
    #[arg(long, default_value = "64")]
    concurrency: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("House import");
    info!("Directory: {}", args.dir.display());

    let files = CsvDataSource::open_dir(&args.dir)
        .with_context(|| format!("Failed to scan {}", args.dir.display()))?;
    let db = ScyllaDataSource::connect(&args.scylla_url, &args.keyspace)
        .await
        .context("Failed to connect to ScyllaDB")?;

    let selected: Vec<String> = files
        .country_codes()
        .into_iter()
        .filter(|code| {
            args.countries.is_empty()
                || args.countries.iter().any(|c| c.eq_ignore_ascii_case(code))
        })
        .collect();

    if selected.is_empty() {
        anyhow::bail!("No house files to import in {}", args.dir.display());
    }

    for code in selected {
        let Some(path) = files.path_for(&code) else {
            continue;
        };
        import_country(&db, &code, path, args.concurrency.max(1)).await?;
    }

    info!("Import complete");
    Ok(())
}

fn read_rows(path: &Path) -> Result<(Vec<HouseRow>, usize)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    let mut skipped = 0;
    for result in reader.deserialize::<HouseRow>() {
        match result {
            Ok(row) => rows.push(row),
            Err(_) => skipped += 1,
        }
    }
    Ok((rows, skipped))
}

async fn import_country(
    db: &ScyllaDataSource,
    code: &str,
    path: &Path,
    concurrency: usize,
) -> Result<()> {
    info!("Importing {} from {}", code, path.display());

    let (rows, skipped) = read_rows(path)?;
    if skipped > 0 {
        warn!("Skipped {} malformed rows in {}", skipped, path.display());
    }

    // Create progress bar
    let pb = ProgressBar::new(rows.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) {msg}",
            )?
            .progress_chars("#>-"),
    );
    pb.set_message(code.to_string());

    let mut failed = 0usize;
    let mut upserts = stream::iter(rows.iter())
        .map(|row| db.upsert_house(code, row))
        .buffer_unordered(concurrency);

    while let Some(result) = upserts.next().await {
        if let Err(e) = result {
            failed += 1;
            warn!("Upsert failed: {}", e);
        }
        pb.inc(1);
    }

    pb.finish_with_message(format!("{} complete", code));

    if failed > 0 {
        warn!("{} of {} houses failed for {}", failed, rows.len(), code);
    }
    info!("Imported {} houses for {}", rows.len() - failed, code);
    Ok(())
}
