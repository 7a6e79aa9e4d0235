use anyhow::{Context, Result};
use clap::Parser;
use mistconv::{batch, cli::Cli, config};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber, optionally writing to a log file
fn init_tracing(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Check a directory flag; an invalid directory turns the run into a no-op
fn valid_dir(path: &Path, what: &str) -> bool {
    if path.is_dir() {
        return true;
    }
    warn!("{} directory not valid: {}", what, path.display());
    false
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug, args.log_file.as_deref())?;

    let mut options = batch::BatchOptions {
        show_progress: args.progress,
        ..batch::BatchOptions::default()
    };
    if let Some(workers) = args.workers {
        options.workers = workers;
    }
    options
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid value for --workers: {}", e))?;

    if !valid_dir(&args.confdir, "Configuration")
        || !valid_dir(&args.inputdir, "Input")
        || !valid_dir(&args.outputdir, "Output")
    {
        return Ok(());
    }

    let tables = config::load(&args.confdir)?;

    let items = batch::collect_inputs(&args.inputdir).with_context(|| {
        format!("Failed to list input directory: {}", args.inputdir.display())
    })?;

    let report = batch::run(&items, &args.outputdir, &tables, &options);

    println!(
        "Converted {} of {} reports ({} failed)",
        report.converted(),
        items.len(),
        report.failed()
    );

    Ok(())
}
