mod cli;
mod dispatcher;
mod engine;
mod error;
mod parser;
mod paths;
mod report;
mod retry;
mod shutdown;
mod types;

use clap::Parser;
use cli::Cli;
use colored::*;
use dispatcher::Dispatcher;
use engine::Aria2Launcher;
use error::DownloaderError;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::process::ExitCode;
use types::{BatchResult, UrlEntry};

const EXIT_FAILED_DOWNLOADS: u8 = 1;
const EXIT_ENVIRONMENT: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter()))
        .init();
    info!("Starting parallel URL downloader");

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("Download batch aborted: {}", e);
            eprintln!("{}", format!("Error: {}", e).red());
            ExitCode::from(EXIT_ENVIRONMENT)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, DownloaderError> {
    let config = cli.dispatch_config()?;
    let options = cli.aria2_options()?;
    let entries = load_entries(&cli).await?;
    info!(
        "Loaded {} URLs: concurrency={}, max_retries={}",
        entries.len(),
        config.concurrency,
        config.retry.max_retries
    );

    let progress = if cli.quiet {
        ProgressBar::hidden()
    } else {
        create_progress_bar()
    };
    let dispatcher = Dispatcher::new(Aria2Launcher::new(&cli.engine, options), config)
        .with_progress(progress);
    shutdown::cancel_on_signal(dispatcher.cancellation_token());

    let result = dispatcher.run(entries, &cli.output_dir).await?;
    report::print_summary(&result);

    if let Some(path) = &cli.stats_csv {
        if let Err(e) = report::write_stats_csv(&result, path) {
            error!("Failed to write stats CSV: {}", e);
        }
    }

    if !result.interrupted && !result.all_succeeded() {
        error!("{} downloads failed", result.failed());
    }
    Ok(ExitCode::from(exit_code(&result)))
}

/// An interrupted run reports 130 even when some jobs also failed.
fn exit_code(result: &BatchResult) -> u8 {
    if result.interrupted {
        EXIT_INTERRUPTED
    } else if result.all_succeeded() {
        0
    } else {
        EXIT_FAILED_DOWNLOADS
    }
}

/// Entries from --input-file come first, then the positional URLs.
async fn load_entries(cli: &Cli) -> Result<Vec<UrlEntry>, DownloaderError> {
    if cli.input_file.is_none() && cli.urls.is_empty() {
        return Err(DownloaderError::InvalidConfig(
            "pass URLs as arguments or use --input-file".to_string(),
        ));
    }

    let mut entries = match &cli.input_file {
        Some(path) => parser::parse_url_file(path).await?,
        None => Vec::new(),
    };
    entries.extend(parser::parse_inline(&cli.urls)?);
    Ok(entries)
}

fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    )
    .map(|s| s.progress_chars("#>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}
