use crate::paths;
use crate::retry::{RetryDecision, RetryPolicy};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// One line of the input list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlEntry {
    pub url: String,
    /// Destination override; relative paths resolve against the output directory.
    pub destination: Option<PathBuf>,
    /// 1-based line in the input file, 0 for URLs given on the command line.
    pub line: usize,
}

impl UrlEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            destination: None,
            line: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Why a single attempt did not produce a finished file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// Engine exited unsuccessfully; `None` means it was killed by a signal.
    ExitCode(Option<i32>),
    TimedOut(Duration),
    Launch(String),
    /// Engine reported success but left no output behind.
    MissingOutput,
    Finalize(String),
    Interrupted,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::ExitCode(Some(code)) => write!(f, "engine exited with code {}", code),
            AttemptFailure::ExitCode(None) => write!(f, "engine terminated by signal"),
            AttemptFailure::TimedOut(limit) => write!(f, "timed out after {:?}", limit),
            AttemptFailure::Launch(e) => write!(f, "failed to launch engine: {}", e),
            AttemptFailure::MissingOutput => write!(f, "engine succeeded but produced no file"),
            AttemptFailure::Finalize(e) => write!(f, "failed to finalize download: {}", e),
            AttemptFailure::Interrupted => write!(f, "interrupted"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub entry: UrlEntry,
    pub output_path: PathBuf,
    pub attempts: u32,
    pub status: JobStatus,
    /// Output already existed, so the engine was never invoked.
    pub skipped: bool,
    pub last_error: Option<AttemptFailure>,
    pub elapsed: Duration,
}

impl Job {
    pub fn new(entry: UrlEntry, output_path: PathBuf) -> Self {
        Self {
            entry,
            output_path,
            attempts: 0,
            status: JobStatus::Pending,
            skipped: false,
            last_error: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Name the engine writes to until the download is complete.
    pub fn part_path(&self) -> PathBuf {
        paths::part_path(&self.output_path)
    }

    pub fn mark_skipped(&mut self) {
        self.status = JobStatus::Succeeded;
        self.skipped = true;
    }

    pub fn record_success(&mut self, elapsed: Duration) {
        self.attempts += 1;
        self.elapsed += elapsed;
        self.status = JobStatus::Succeeded;
        self.last_error = None;
    }

    /// Records a failed attempt. The job becomes permanently failed once the
    /// policy gives up; otherwise it stays pending for resubmission.
    pub fn record_failure(
        &mut self,
        failure: AttemptFailure,
        elapsed: Duration,
        policy: &RetryPolicy,
    ) -> RetryDecision {
        self.attempts += 1;
        self.elapsed += elapsed;
        self.last_error = Some(failure);
        let decision = policy.decide(self.attempts);
        if decision == RetryDecision::GiveUp {
            self.status = JobStatus::Failed;
        }
        decision
    }

    /// Terminates a job that never got to finish because the batch was cancelled.
    pub fn abandon(&mut self) {
        if self.status == JobStatus::Pending {
            self.status = JobStatus::Failed;
            self.last_error = Some(AttemptFailure::Interrupted);
        }
    }
}

#[derive(Debug)]
pub struct BatchResult {
    /// Jobs in input order.
    pub jobs: Vec<Job>,
    pub total_duration: Duration,
    pub interrupted: bool,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.jobs.len()
    }

    pub fn succeeded(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.status == JobStatus::Succeeded)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.status == JobStatus::Failed)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.jobs.iter().filter(|j| j.skipped).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0 && !self.interrupted
    }
}
