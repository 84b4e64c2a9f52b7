use crate::error::DownloaderError;
use crate::types::UrlEntry;
use log::debug;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};
use url::Url;

/// Reads a URL list from `path`, or from stdin when `path` is `-`.
pub async fn parse_url_file(path: &Path) -> Result<Vec<UrlEntry>, DownloaderError> {
    if path == Path::new("-") {
        parse_url_reader(tokio::io::stdin()).await
    } else {
        parse_url_reader(File::open(path).await?).await
    }
}

pub async fn parse_url_reader<R>(mut reader: R) -> Result<Vec<UrlEntry>, DownloaderError>
where
    R: AsyncRead + Unpin,
{
    let mut contents = String::new();
    reader.read_to_string(&mut contents).await?;
    parse_url_list(&contents)
}

/// Parses `URL [DESTINATION]` lines. Blank lines and `#` comments are skipped.
pub fn parse_url_list(contents: &str) -> Result<Vec<UrlEntry>, DownloaderError> {
    let mut entries = Vec::new();

    for (idx, raw) in contents.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut parts = trimmed.splitn(2, char::is_whitespace);
        let url = parts.next().unwrap_or_default();
        validate_url(url, line)?;

        let destination = parts
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let entry = UrlEntry {
            url: url.to_string(),
            destination,
            line,
        };
        debug!("Parsed entry: {:?}", entry);
        entries.push(entry);
    }

    Ok(entries)
}

/// URLs passed directly on the command line; no destination overrides.
pub fn parse_inline(urls: &[String]) -> Result<Vec<UrlEntry>, DownloaderError> {
    urls.iter()
        .map(|url| {
            validate_url(url, 0)?;
            Ok(UrlEntry::new(url.clone()))
        })
        .collect()
}

fn validate_url(raw: &str, line: usize) -> Result<(), DownloaderError> {
    let parsed = Url::parse(raw).map_err(|e| DownloaderError::ParseError {
        line,
        reason: format!("'{}' is not an absolute URL ({})", raw, e),
    })?;

    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(DownloaderError::ParseError {
            line,
            reason: format!("'{}' has no host", raw),
        }),
    }
}
