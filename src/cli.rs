use crate::dispatcher::DispatchConfig;
use crate::engine::Aria2Options;
use crate::error::DownloaderError;
use crate::retry::RetryPolicy;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

/// aria2c refuses more connections per server than this.
const MAX_CONNECTIONS: u16 = 16;

/// Download a large number of URLs in parallel with aria2c.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// URLs to download, in addition to those read from --input-file
    pub urls: Vec<String>,

    /// File with one "URL [DESTINATION]" per line ("-" reads stdin)
    #[arg(short, long)]
    pub input_file: Option<PathBuf>,

    /// Output directory for downloaded files
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Number of concurrent downloads
    #[arg(short = 'j', long, default_value_t = 4)]
    pub concurrency: usize,

    /// Retries per URL after the first failed attempt
    #[arg(short = 'r', long, default_value_t = 3)]
    pub max_retries: u32,

    /// Per-download time limit in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Base delay in seconds before a failed URL is retried (doubles per attempt)
    #[arg(long, default_value_t = 0)]
    pub retry_delay: u64,

    /// Download engine executable
    #[arg(long, default_value = "aria2c")]
    pub engine: PathBuf,

    /// Connections per download
    #[arg(short = 'x', long, default_value_t = 1)]
    pub connections: u16,

    /// Extra argument passed to the engine (repeatable)
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    pub engine_args: Vec<String>,

    /// Do not download URLs whose destination file already exists
    #[arg(long)]
    pub skip_existing: bool,

    /// Write per-URL statistics to this CSV file
    #[arg(long)]
    pub stats_csv: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn dispatch_config(&self) -> Result<DispatchConfig, DownloaderError> {
        if self.concurrency == 0 {
            return Err(DownloaderError::InvalidConfig(
                "--concurrency must be at least 1".to_string(),
            ));
        }
        if self.timeout == Some(0) {
            return Err(DownloaderError::InvalidConfig(
                "--timeout must be greater than 0".to_string(),
            ));
        }

        Ok(DispatchConfig {
            concurrency: self.concurrency,
            retry: RetryPolicy::new(self.max_retries, Duration::from_secs(self.retry_delay)),
            timeout: self.timeout.map(Duration::from_secs),
            skip_existing: self.skip_existing,
        })
    }

    pub fn aria2_options(&self) -> Result<Aria2Options, DownloaderError> {
        if !(1..=MAX_CONNECTIONS).contains(&self.connections) {
            return Err(DownloaderError::InvalidConfig(format!(
                "--connections must be between 1 and {}",
                MAX_CONNECTIONS
            )));
        }

        Ok(Aria2Options {
            connections: self.connections,
            extra_args: self.engine_args.clone(),
        })
    }

    /// Default `env_logger` filter; `RUST_LOG` still takes precedence.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}
