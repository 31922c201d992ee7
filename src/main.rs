//! Binary entry point for chat-ingest.
//!
//! This binary drives the ingestion pipeline over local export files.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use chat_ingest::IngestConfig;
use chat_ingest::cli::{cmd_hash, cmd_ingest, cmd_parse, cmd_validate};
use chat_ingest::observability::{self, ObservabilityConfig, RequestContext, enter_request_context};
use chat_ingest::services::ServiceContainer;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

/// chat-ingest - Resilient ingestion of WhatsApp chat exports.
#[derive(Parser)]
#[command(name = "chat-ingest")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Parse an export and print it as JSON.
    Parse {
        /// Export file.
        file: PathBuf,

        /// Pretty-print the JSON.
        #[arg(long)]
        pretty: bool,
    },

    /// Check whether a file looks like a WhatsApp export.
    Validate {
        /// Export file.
        file: PathBuf,
    },

    /// Run files through the ingest pipeline.
    Ingest {
        /// Export files, processed in order.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Idempotency key applied to every file.
        #[arg(long)]
        idempotency_key: Option<String>,
    },

    /// Print the content hash used for deduplication.
    Hash {
        /// Export file.
        file: PathBuf,
    },
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match IngestConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let observability =
        match observability::init(ObservabilityConfig::from_ingest_config(&config, cli.verbose)) {
            Ok(handle) => handle,
            Err(e) => {
                eprintln!("Failed to initialize observability: {e}");
                return ExitCode::FAILURE;
            },
        };

    let mut stdout = std::io::stdout().lock();
    // Ingest opens a context per file; the other commands share this one.
    let _request = enter_request_context(RequestContext::new());
    let result = match cli.command {
        Commands::Parse { file, pretty } => cmd_parse(&file, pretty, &mut stdout).map(|()| true),
        Commands::Validate { file } => cmd_validate(&file, &mut stdout),
        Commands::Ingest {
            files,
            idempotency_key,
        } => {
            let container = ServiceContainer::new(&config);
            cmd_ingest(&container, &files, idempotency_key.as_deref(), &mut stdout)
                .await
                .map(|()| true)
        },
        Commands::Hash { file } => cmd_hash(&file, &mut stdout).map(|()| true),
    };

    drop(stdout);

    if let Some(rendered) = observability.render_metrics() {
        println!("\n{rendered}");
    }

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}
