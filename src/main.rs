//! pod5-convert - Bulk Legacy Container Converter
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use pod5_convert::codec::DeflateCodec;
use pod5_convert::config::{CliArgs, ConvertConfig};
use pod5_convert::container::SqliteWriterFactory;
use pod5_convert::converter::Converter;
use pod5_convert::legacy::JsonReader;
use pod5_convert::status::{print_header, print_summary};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();
    let quiet = args.quiet;

    setup_logging(args.verbose)?;

    let config = ConvertConfig::from_args(args).context("Invalid configuration")?;

    let converter = Converter::new(
        config.clone(),
        Arc::new(JsonReader::new()),
        Arc::new(DeflateCodec::default()),
        Arc::new(SqliteWriterFactory::new()),
    );

    // Setup signal handler; the converter aborts on its next poll
    let shutdown_flag = converter.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let files = converter.discover().context("Failed to find inputs")?;

    if !quiet {
        print_header(files.len(), config.worker_count.min(files.len()), &config.output);
    }

    converter
        .prepare_output()
        .context("Failed to prepare output")?;

    let summary = converter
        .convert_files(files)
        .context("Conversion failed")?;

    if !quiet {
        print_summary(&summary);
    }

    if summary.failed > 0 {
        info!(failed = summary.failed, "Conversion completed with failed inputs");
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("pod5_convert=debug,warn")
    } else {
        EnvFilter::new("pod5_convert=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
