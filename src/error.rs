use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloaderError {
    #[error("Failed to parse URL list: line {line}: {reason}")]
    ParseError { line: usize, reason: String },

    #[error("No URLs to download")]
    EmptyBatch,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Download engine '{0}' not found or not executable")]
    EngineNotFound(String),

    #[error("Destination directory {} is not writable: {source}", path.display())]
    DestinationNotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}
