//! record-jogger - distribute a record store across workers
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use record_jogger::config::{CliArgs, Command, OutputFormat, RunOptions};
use record_jogger::distributor::JobStatus;
use record_jogger::job::LocalJob;
use record_jogger::processor::RecordSummaryProcessor;
use record_jogger::progress::{print_header, print_summary, ProgressReporter};
use record_jogger::resources::{RecordStoreResources, Resources};
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    match args.command {
        Command::Run(ref run) => {
            let options = RunOptions::from_args(run, args.verbose, args.quiet)
                .context("Invalid configuration")?;
            run_job(options)
        }
        Command::Check { ref properties } => check(properties),
    }
}

/// Run a job with the built-in summary processor
fn run_job(options: RunOptions) -> Result<ExitCode> {
    let resources = RecordStoreResources::open(&options.properties)
        .with_context(|| format!("Failed to load job '{}'", options.properties.display()))?;

    let workers = options
        .workers
        .unwrap_or(resources.workers_per_node() as usize);

    // Print header
    if !options.quiet && options.format == OutputFormat::Text {
        print_header(
            &resources.store_path().display().to_string(),
            resources.chunk_size(),
            workers,
            &logsheet_label(resources.resources()),
        );
    }

    let factory = RecordSummaryProcessor::new().fail_fatally_on(options.fail_on.iter().copied());
    let mut job = LocalJob::new(resources, factory)
        .workers(workers)
        .keys_only(options.keys_only);

    // Setup signal handler for graceful shutdown
    let shutdown_flag = job.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, draining outstanding chunks...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    // Create progress reporter
    let progress = if options.show_progress {
        Some(ProgressReporter::new())
    } else {
        None
    };
    if let Some(ref p) = progress {
        p.set_status("Starting workers...");
        job = job.on_progress(p.hook());
    }

    // Run the job
    let outcome = job.run().context("Job failed")?;
    let summary = outcome.summary;

    // Finish progress
    if let Some(ref p) = progress {
        match summary.status {
            JobStatus::Completed => p.finish("Job completed"),
            JobStatus::Interrupted => p.finish("Job interrupted"),
            JobStatus::Failed(_) => p.finish("Job failed"),
        }
    }

    match options.format {
        OutputFormat::Json => {
            println!("{}", summary.to_json().context("Failed to encode summary")?);
        }
        OutputFormat::Text if !options.quiet => print_summary(&summary),
        OutputFormat::Text => {}
    }

    if !summary.lost_chunks.is_empty() {
        warn!(lost = ?summary.lost_chunks, "Chunks lost to fatal worker errors");
    }

    Ok(match summary.status {
        JobStatus::Completed if summary.lost_chunks.is_empty() => ExitCode::SUCCESS,
        JobStatus::Completed => {
            info!("Job completed with lost chunks");
            ExitCode::from(2)
        }
        JobStatus::Interrupted => ExitCode::from(130),
        JobStatus::Failed(_) => ExitCode::FAILURE,
    })
}

/// Validate a properties file and print what a job would see
fn check(properties: &Path) -> Result<ExitCode> {
    let resources = RecordStoreResources::open(properties)
        .with_context(|| format!("Failed to load job '{}'", properties.display()))?;
    let store = resources.record_store();
    let records = store.count().context("Failed to count records")?;
    let chunks = record_jogger::package::chunk_count_for(records, resources.chunk_size());

    println!("Store:            {}", store.description());
    println!("Store name:       {}", resources.store_name());
    println!("Store directory:  {}", resources.store_dir().display());
    println!("Records:          {}", records);
    println!("Max key size:     {}", resources.max_key_size());
    println!("Chunk size:       {}", resources.chunk_size());
    println!("Chunks:           {}", chunks);
    println!("Workers per node: {}", resources.workers_per_node());
    println!("Logsheet:         {}", logsheet_label(resources.resources()));

    Ok(ExitCode::SUCCESS)
}

/// Where logsheet entries will go, for display
fn logsheet_label(resources: &Resources) -> String {
    match resources.logsheet_path() {
        Ok(Some(path)) => path.display().to_string(),
        Ok(None) => "(tracing)".to_string(),
        Err(e) => format!("({})", e),
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("record_jogger=debug,warn")
    } else {
        EnvFilter::new("record_jogger=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
