use crate::engine::{EngineExit, Invocation, Launcher};
use crate::error::DownloaderError;
use crate::paths::plan_destinations;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::types::{AttemptFailure, BatchResult, Job, JobStatus, UrlEntry};
use indicatif::ProgressBar;
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum simultaneous engine invocations.
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Per-attempt limit; the engine is killed when it runs longer.
    pub timeout: Option<Duration>,
    pub skip_existing: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry: RetryPolicy::default(),
            timeout: None,
            skip_existing: false,
        }
    }
}

/// Owns the job table and drives every job to a terminal state with at most
/// `concurrency` engine invocations in flight.
pub struct Dispatcher<L: Launcher> {
    launcher: Arc<L>,
    config: DispatchConfig,
    cancel: CancellationToken,
    progress: ProgressBar,
}

struct AttemptReport {
    index: usize,
    elapsed: Duration,
    /// False when the attempt was cancelled before the engine was started.
    launched: bool,
    outcome: Result<(), AttemptFailure>,
}

enum Waited {
    Exited(io::Result<EngineExit>),
    TimedOut(Duration),
    Cancelled,
}

impl<L: Launcher> Dispatcher<L> {
    pub fn new(launcher: L, config: DispatchConfig) -> Self {
        Self {
            launcher: Arc::new(launcher),
            config,
            cancel: CancellationToken::new(),
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    #[cfg(test)]
    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Cancelling this token stops new invocations and terminates running ones.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(
        &self,
        entries: Vec<UrlEntry>,
        output_dir: &Path,
    ) -> Result<BatchResult, DownloaderError> {
        if entries.is_empty() {
            return Err(DownloaderError::EmptyBatch);
        }
        if self.config.concurrency == 0 {
            return Err(DownloaderError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        self.launcher.ensure_available()?;
        ensure_writable(output_dir).await?;

        let start_time = Instant::now();
        let paths = plan_destinations(&entries, output_dir);
        let mut jobs: Vec<Job> = entries
            .into_iter()
            .zip(paths)
            .map(|(entry, path)| Job::new(entry, path))
            .collect();

        self.progress.set_length(jobs.len() as u64);

        let mut queue: VecDeque<(usize, Duration)> = VecDeque::new();
        for (index, job) in jobs.iter_mut().enumerate() {
            if self.config.skip_existing && path_exists(&job.output_path).await {
                info!("Skipping {}: {} exists", job.entry.url, job.output_path.display());
                job.mark_skipped();
                self.progress.inc(1);
            } else {
                queue.push_back((index, Duration::ZERO));
            }
        }

        info!(
            "Dispatching {} jobs with concurrency {} via {}",
            queue.len(),
            self.config.concurrency,
            self.launcher.name()
        );

        let mut in_flight: JoinSet<AttemptReport> = JoinSet::new();
        loop {
            while in_flight.len() < self.config.concurrency && !self.cancel.is_cancelled() {
                let Some((index, delay)) = queue.pop_front() else {
                    break;
                };
                let job = &jobs[index];
                debug!("Attempt {} for {}", job.attempts + 1, job.entry.url);
                in_flight.spawn(supervise(
                    index,
                    run_attempt(
                        self.launcher.clone(),
                        index,
                        Invocation {
                            url: job.entry.url.clone(),
                            part_path: job.part_path(),
                        },
                        job.output_path.clone(),
                        delay,
                        self.config.timeout,
                        self.cancel.clone(),
                    ),
                ));
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            // supervise() turns worker panics into reports, so only an
            // aborted supervisor lands here.
            let report = match joined {
                Ok(report) => report,
                Err(e) => {
                    error!("Download supervisor failed: {}", e);
                    continue;
                }
            };

            let job = &mut jobs[report.index];
            match report.outcome {
                Ok(()) => {
                    job.record_success(report.elapsed);
                    info!(
                        "Downloaded {} -> {} (attempt {})",
                        job.entry.url,
                        job.output_path.display(),
                        job.attempts
                    );
                    self.finish(job);
                }
                Err(AttemptFailure::Interrupted) => {
                    if report.launched {
                        job.attempts += 1;
                    }
                    job.elapsed += report.elapsed;
                    job.abandon();
                    self.finish(job);
                }
                Err(failure) => {
                    warn!(
                        "Attempt {} for {} failed: {}",
                        job.attempts + 1,
                        job.entry.url,
                        failure
                    );
                    match job.record_failure(failure, report.elapsed, &self.config.retry) {
                        RetryDecision::GiveUp => {
                            error!(
                                "Giving up on {} after {} attempts",
                                job.entry.url, job.attempts
                            );
                            self.finish(job);
                        }
                        RetryDecision::RetryAfter(delay) if !self.cancel.is_cancelled() => {
                            queue.push_back((report.index, delay));
                        }
                        RetryDecision::RetryAfter(_) => {
                            job.abandon();
                            self.finish(job);
                        }
                    }
                }
            }
        }

        let interrupted = self.cancel.is_cancelled();
        for job in jobs.iter_mut().filter(|j| j.status == JobStatus::Pending) {
            job.abandon();
            self.finish(job);
        }

        if interrupted {
            self.progress.abandon_with_message("interrupted");
        } else {
            self.progress.finish_with_message("done");
        }

        Ok(BatchResult {
            jobs,
            total_duration: start_time.elapsed(),
            interrupted,
        })
    }

    fn finish(&self, job: &Job) {
        self.progress.inc(1);
        if let Some(name) = job.output_path.file_name() {
            self.progress.set_message(name.to_string_lossy().to_string());
        }
    }
}

/// Runs an attempt in its own task. A panic while driving the engine becomes a
/// failed attempt for `index`, so the job still goes through the retry policy.
async fn supervise<F>(index: usize, attempt: F) -> AttemptReport
where
    F: Future<Output = AttemptReport> + Send + 'static,
{
    match tokio::spawn(attempt).await {
        Ok(report) => report,
        Err(e) => {
            error!("Download worker failed: {}", e);
            AttemptReport {
                index,
                elapsed: Duration::ZERO,
                launched: true,
                outcome: Err(AttemptFailure::Launch(e.to_string())),
            }
        }
    }
}

async fn run_attempt<L: Launcher>(
    launcher: Arc<L>,
    index: usize,
    invocation: Invocation,
    output_path: PathBuf,
    delay: Duration,
    timeout: Option<Duration>,
    cancel: CancellationToken,
) -> AttemptReport {
    if !delay.is_zero() {
        tokio::select! {
            _ = cancel.cancelled() => {
                return AttemptReport {
                    index,
                    elapsed: Duration::ZERO,
                    launched: false,
                    outcome: Err(AttemptFailure::Interrupted),
                };
            }
            _ = sleep(delay) => {}
        }
    }

    let start_time = Instant::now();
    let outcome = attempt_download(launcher.as_ref(), &invocation, &output_path, timeout, &cancel).await;
    AttemptReport {
        index,
        elapsed: start_time.elapsed(),
        launched: true,
        outcome,
    }
}

async fn attempt_download<L: Launcher>(
    launcher: &L,
    invocation: &Invocation,
    output_path: &Path,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<(), AttemptFailure> {
    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AttemptFailure::Launch(format!("{}: {}", parent.display(), e)))?;
    }

    let mut handle = launcher
        .launch(invocation)
        .await
        .map_err(|e| AttemptFailure::Launch(e.to_string()))?;

    let waited = {
        let deadline = async {
            match timeout {
                Some(limit) => {
                    sleep(limit).await;
                    limit
                }
                None => std::future::pending::<Duration>().await,
            }
        };
        tokio::select! {
            res = launcher.wait(&mut handle) => Waited::Exited(res),
            limit = deadline => Waited::TimedOut(limit),
            _ = cancel.cancelled() => Waited::Cancelled,
        }
    };

    let exit = match waited {
        Waited::Exited(res) => res.map_err(|e| AttemptFailure::Launch(e.to_string()))?,
        Waited::TimedOut(limit) => {
            stop(launcher, &mut handle, &invocation.url).await;
            return Err(AttemptFailure::TimedOut(limit));
        }
        Waited::Cancelled => {
            stop(launcher, &mut handle, &invocation.url).await;
            return Err(AttemptFailure::Interrupted);
        }
    };

    if !exit.success() {
        if let Some(meaning) = exit.code.and_then(|c| launcher.describe_exit(c)) {
            debug!("{} exited for {}: {}", launcher.name(), invocation.url, meaning);
        }
        return Err(AttemptFailure::ExitCode(exit.code));
    }

    if !path_exists(&invocation.part_path).await {
        return Err(AttemptFailure::MissingOutput);
    }

    tokio::fs::rename(&invocation.part_path, output_path)
        .await
        .map_err(|e| AttemptFailure::Finalize(e.to_string()))
}

async fn stop<L: Launcher>(launcher: &L, handle: &mut L::Handle, url: &str) {
    if let Err(e) = launcher.terminate(handle).await {
        warn!("Failed to terminate {} for {}: {}", launcher.name(), url, e);
    }
    if let Err(e) = launcher.wait(handle).await {
        warn!("Failed to reap {} for {}: {}", launcher.name(), url, e);
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

async fn ensure_writable(dir: &Path) -> Result<(), DownloaderError> {
    let not_writable = |source: io::Error| DownloaderError::DestinationNotWritable {
        path: dir.to_path_buf(),
        source,
    };

    tokio::fs::create_dir_all(dir).await.map_err(not_writable)?;
    let marker = dir.join(format!(".parallel-url-downloader-{}.write-check", std::process::id()));
    tokio::fs::write(&marker, b"").await.map_err(not_writable)?;
    tokio::fs::remove_file(&marker).await.map_err(not_writable)?;
    Ok(())
}
