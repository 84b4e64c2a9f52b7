//! External download engine capability and its aria2c implementation.

use crate::error::DownloaderError;
use async_trait::async_trait;
use log::debug;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// One engine run: fetch `url` into `part_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub url: String,
    pub part_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineExit {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl EngineExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for EngineExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Process-launching capability used by the dispatcher.
///
/// The exit status returned by [`Launcher::wait`] is the only success signal
/// the dispatcher consumes.
#[async_trait]
pub trait Launcher: Send + Sync + 'static {
    type Handle: Send + 'static;

    fn name(&self) -> &str;

    /// Human-readable meaning of an engine exit code, if the engine documents one.
    fn describe_exit(&self, _code: i32) -> Option<&'static str> {
        None
    }

    /// Fails when the engine cannot be started at all.
    fn ensure_available(&self) -> Result<(), DownloaderError>;

    async fn launch(&self, invocation: &Invocation) -> io::Result<Self::Handle>;

    async fn wait(&self, handle: &mut Self::Handle) -> io::Result<EngineExit>;

    /// Stops a running invocation. Callers still `wait` on the handle afterwards.
    async fn terminate(&self, handle: &mut Self::Handle) -> io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct Aria2Options {
    /// Connections per download (`--max-connection-per-server` and `--split`).
    pub connections: u16,
    /// Passed through verbatim before the URL.
    pub extra_args: Vec<String>,
}

impl Default for Aria2Options {
    fn default() -> Self {
        Self {
            connections: 1,
            extra_args: Vec::new(),
        }
    }
}

pub struct Aria2Launcher {
    program: PathBuf,
    options: Aria2Options,
}

impl Aria2Launcher {
    pub fn new(program: impl Into<PathBuf>, options: Aria2Options) -> Self {
        Self {
            program: program.into(),
            options,
        }
    }

    pub fn args(&self, invocation: &Invocation) -> Vec<String> {
        let dir = invocation
            .part_path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| ".".to_string());
        let out = invocation
            .part_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let connections = self.options.connections.max(1);

        let mut args = vec![
            format!("--dir={}", dir),
            format!("--out={}", out),
            "--continue=true".to_string(),
            "--allow-overwrite=true".to_string(),
            "--auto-file-renaming=false".to_string(),
            format!("--max-connection-per-server={}", connections),
            format!("--split={}", connections),
            "--console-log-level=warn".to_string(),
            "--summary-interval=0".to_string(),
            "--download-result=hide".to_string(),
        ];
        args.extend(self.options.extra_args.iter().cloned());
        args.push(invocation.url.clone());
        args
    }
}

#[async_trait]
impl Launcher for Aria2Launcher {
    type Handle = Child;

    fn name(&self) -> &str {
        "aria2c"
    }

    fn describe_exit(&self, code: i32) -> Option<&'static str> {
        Some(describe_exit_code(code))
    }

    fn ensure_available(&self) -> Result<(), DownloaderError> {
        which::which(&self.program)
            .map(|path| debug!("Using download engine at {}", path.display()))
            .map_err(|_| DownloaderError::EngineNotFound(self.program.display().to_string()))
    }

    async fn launch(&self, invocation: &Invocation) -> io::Result<Child> {
        let args = self.args(invocation);
        debug!("Launching {} {}", self.program.display(), args.join(" "));
        Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }

    async fn wait(&self, handle: &mut Child) -> io::Result<EngineExit> {
        handle.wait().await.map(EngineExit::from)
    }

    async fn terminate(&self, handle: &mut Child) -> io::Result<()> {
        match handle.start_kill() {
            Ok(()) => Ok(()),
            // Already exited.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Meaning of aria2c's documented exit codes.
pub fn describe_exit_code(code: i32) -> &'static str {
    match code {
        0 => "success",
        1 => "unknown error",
        2 => "timeout",
        3 => "resource not found",
        4 => "too many not-found responses",
        5 => "download too slow",
        6 => "network problem",
        7 => "unfinished downloads",
        8 => "server does not support resume",
        9 => "not enough disk space",
        10 => "piece length mismatch",
        11 => "same file already being downloaded",
        12 => "same info hash already being downloaded",
        13 => "file already exists",
        14 => "renaming failed",
        15 => "could not open existing file",
        16 => "could not create file",
        17 => "file I/O error",
        18 => "could not create directory",
        19 => "name resolution failed",
        20 => "could not parse metalink",
        21 => "FTP command failed",
        22 => "bad HTTP response header",
        23 => "too many redirects",
        24 => "HTTP authorization failed",
        25 => "could not parse bencoded file",
        26 => "torrent file corrupted",
        27 => "bad magnet URI",
        28 => "bad option",
        29 => "remote server overloaded",
        30 => "could not parse JSON-RPC request",
        31 => "reserved",
        32 => "checksum validation failed",
        _ => "unrecognized exit code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation() -> Invocation {
        Invocation {
            url: "https://example.com/file.iso".to_string(),
            part_path: PathBuf::from("/data/out/file.iso.part"),
        }
    }

    #[test]
    fn args_target_part_file_and_end_with_url() {
        let launcher = Aria2Launcher::new("aria2c", Aria2Options::default());
        let args = launcher.args(&invocation());
        assert_eq!(args[0], "--dir=/data/out");
        assert_eq!(args[1], "--out=file.iso.part");
        assert!(args.contains(&"--auto-file-renaming=false".to_string()));
        assert_eq!(args.last().unwrap(), "https://example.com/file.iso");
    }

    #[test]
    fn connections_and_extra_args_are_forwarded() {
        let launcher = Aria2Launcher::new(
            "aria2c",
            Aria2Options {
                connections: 8,
                extra_args: vec!["--check-certificate=false".to_string()],
            },
        );
        let args = launcher.args(&invocation());
        assert!(args.contains(&"--max-connection-per-server=8".to_string()));
        assert!(args.contains(&"--split=8".to_string()));
        let extra = args
            .iter()
            .position(|a| a == "--check-certificate=false")
            .unwrap();
        assert_eq!(extra, args.len() - 2);
    }

    #[test]
    fn bare_file_name_downloads_into_current_dir() {
        let launcher = Aria2Launcher::new("aria2c", Aria2Options::default());
        let args = launcher.args(&Invocation {
            url: "https://example.com/a".to_string(),
            part_path: PathBuf::from("a.part"),
        });
        assert_eq!(args[0], "--dir=.");
    }

    #[test]
    fn missing_engine_is_reported() {
        let launcher = Aria2Launcher::new("definitely-not-aria2c-xyz", Aria2Options::default());
        assert!(matches!(
            launcher.ensure_available(),
            Err(DownloaderError::EngineNotFound(_))
        ));
    }

    #[test]
    fn exit_success_only_for_zero() {
        assert!(EngineExit { code: Some(0) }.success());
        assert!(!EngineExit { code: Some(3) }.success());
        assert!(!EngineExit { code: None }.success());
        assert_eq!(describe_exit_code(3), "resource not found");
    }
}
