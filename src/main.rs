//! Binary entry point for scangate.
//!
//! Drives the ingestion pipeline from a terminal: characters arrive on
//! stdin, each line break acts as the scan terminator.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// CLI output goes to stdout/stderr by design
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use scangate::{
    EventBus, ScanConfig, ScanIngestor, ScanOutcome, SqliteScanStore, UnmanagedSource,
    is_valid_tag, observability,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

/// Scangate - scan ingestion for RFID/QR goods-receipt stations.
#[derive(Parser)]
#[command(name = "scangate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Listen for scans on stdin (one payload per line).
    Listen {
        /// Path to the SQLite scan database.
        #[arg(long, default_value = "./scans.db")]
        db: PathBuf,

        /// Receiving session identifier (random if omitted).
        #[arg(long)]
        session: Option<String>,
    },

    /// Submit a payload directly, bypassing keystroke decoding.
    Submit {
        /// The payload to submit (QR content or tag ID).
        payload: String,

        /// Path to the SQLite scan database.
        #[arg(long, default_value = "./scans.db")]
        db: PathBuf,

        /// Receiving session identifier (random if omitted).
        #[arg(long)]
        session: Option<String>,
    },

    /// Check whether a candidate string is a well-formed tag.
    Validate {
        /// The candidate to check.
        candidate: String,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ScanConfig> {
    match path {
        Some(path) => ScanConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(ScanConfig::load_default()),
    }
}

fn describe(outcome: &ScanOutcome) -> String {
    match outcome {
        ScanOutcome::Accepted { record } => {
            format!("accepted  {} -> {}", record.payload, record.id)
        },
        ScanOutcome::Duplicate { payload, source } => {
            format!("duplicate {payload} ({source})")
        },
        ScanOutcome::Invalid { candidate } => format!("invalid   {candidate}"),
    }
}

async fn listen(config: ScanConfig, db: PathBuf, session: Option<String>) -> anyhow::Result<()> {
    let store = Arc::new(SqliteScanStore::new(&db).context("opening scan database")?);
    let ingestor = ScanIngestor::new(config, store, EventBus::default());
    let session = session.unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut source = UnmanagedSource;
    ingestor.start(&mut source, session);
    println!("listening; one payload per line, Ctrl-C to stop");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut cleanup = tokio::time::interval(Duration::from_secs(3600));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = cleanup.tick() => {
                let removed = ingestor.cleanup_cache();
                if removed > 0 {
                    println!("cache cleanup removed {removed} entries");
                }
            },
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else { break };
                for c in line.chars() {
                    ingestor.handle_char(c);
                }
                match ingestor.handle_terminator().await {
                    Ok(Some(outcome)) => println!("{}", describe(&outcome)),
                    Ok(None) => {},
                    Err(err) => eprintln!("error: {err}"),
                }
            },
        }
    }

    ingestor.stop(&mut source);
    let status = ingestor.status();
    println!(
        "{}",
        serde_json::to_string_pretty(&status.stats).context("rendering stats")?
    );
    Ok(())
}

async fn submit(config: ScanConfig, db: PathBuf, session: Option<String>, payload: &str) -> anyhow::Result<ExitCode> {
    let store = Arc::new(SqliteScanStore::new(&db).context("opening scan database")?);
    let ingestor = ScanIngestor::new(config, store, EventBus::default());
    let session = session.unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut source = UnmanagedSource;
    ingestor.start(&mut source, session);
    let outcome = ingestor.submit_payload(payload).await?;
    ingestor.stop(&mut source);

    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).context("rendering outcome")?
    );
    Ok(if outcome.is_accepted() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    observability::init(cli.verbose);

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        },
    };

    let result = match cli.command {
        Commands::Listen { db, session } => listen(config, db, session).await.map(|()| ExitCode::SUCCESS),
        Commands::Submit { payload, db, session } => submit(config, db, session, &payload).await,
        Commands::Validate { candidate } => {
            if is_valid_tag(&candidate) {
                println!("valid");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("invalid");
                Ok(ExitCode::FAILURE)
            }
        },
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        },
    }
}
