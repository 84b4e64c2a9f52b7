use crate::error::DownloaderError;
use crate::types::{BatchResult, Job, JobStatus};
use colored::*;
use std::path::Path;

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn display_name(job: &Job) -> String {
    job.output_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| job.entry.url.clone())
}

pub fn print_summary(result: &BatchResult) {
    let total = result.total();
    let succeeded = result.succeeded();
    let failed = result.failed();

    println!("\n{}", "Download Summary:".bold());
    println!("Total URLs: {}", total);
    println!(
        "Succeeded: {:.1}% ({} files, {} already present)",
        percent(succeeded, total),
        succeeded.to_string().green(),
        result.skipped()
    );
    println!(
        "Failed: {:.1}% ({} files)",
        percent(failed, total),
        failed.to_string().red()
    );
    println!("Total duration: {:.2?}", result.total_duration);

    if failed > 0 {
        println!("\n{}", "Failed Downloads:".red().bold());
        for job in result.jobs.iter().filter(|j| j.status == JobStatus::Failed) {
            let reason = job
                .last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string());
            println!(
                "✗ {} - {} after {} attempt(s)",
                display_name(job).red(),
                reason,
                job.attempts
            );
            println!("  URL: {}", job.entry.url);
        }
    }

    if result.interrupted {
        println!("\n{}", "Interrupted before all downloads finished".yellow());
    } else if failed == 0 {
        println!("\n{}", "All downloads completed successfully".green());
    }
}

/// One row per URL, in input order.
pub fn write_stats_csv(result: &BatchResult, path: &Path) -> Result<(), DownloaderError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut wtr = csv::WriterBuilder::new().from_path(path)?;
    wtr.write_record([
        "URL",
        "Destination",
        "Status",
        "Attempts",
        "Duration (s)",
        "Error",
    ])?;

    for job in &result.jobs {
        let status = match (job.status, job.skipped) {
            (JobStatus::Succeeded, true) => "Skipped",
            (JobStatus::Succeeded, false) => "Succeeded",
            (JobStatus::Failed, _) => "Failed",
            (JobStatus::Pending, _) => "Pending",
        };
        wtr.write_record([
            job.entry.url.clone(),
            job.output_path.display().to_string(),
            status.to_string(),
            job.attempts.to_string(),
            format!("{:.2}", job.elapsed.as_secs_f64()),
            job.last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
