use chrono::DateTime;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use orderpay::interfaces::replay::{Scenario, ScenarioReader};
use std::fs::File;
use std::path::PathBuf;

/// Scenario runner: replays a JSON-lines event file (seed records plus
/// webhook/poll/checkout requests) through the payment core and prints one
/// JSON line per event, then a final state summary.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input scenario file (JSON lines)
    scenario: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

fn build_scenario(cli: &Cli) -> Result<Scenario> {
    // The replay clock starts at a fixed instant so scenario output is
    // reproducible; advance_clock events move it.
    let start = DateTime::UNIX_EPOCH;

    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = &cli.db_path {
        return Scenario::with_rocksdb(db_path, start).into_diagnostic();
    }
    #[cfg(not(feature = "storage-rocksdb"))]
    if cli.db_path.is_some() {
        miette::bail!("--db-path requires building with the storage-rocksdb feature");
    }

    Ok(Scenario::in_memory(start))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let scenario = build_scenario(&cli)?;

    let file = File::open(&cli.scenario).into_diagnostic()?;
    let reader = ScenarioReader::new(file);
    for event in reader.events() {
        match event {
            Ok(event) => match scenario.apply(event).await {
                Ok(line) => println!("{line}"),
                Err(e) => eprintln!("Error applying event: {e}"),
            },
            Err(e) => eprintln!("Error reading event: {e}"),
        }
    }

    let summary = scenario.summary().await.into_diagnostic()?;
    println!("{summary}");

    Ok(())
}
