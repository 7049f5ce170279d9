//! Progress reporting for local jobs
//!
//! Provides a chunk progress bar fed by the distributor's progress hook,
//! plus the header and summary printed around a run.

use crate::distributor::{JobProgress, JobStatus, JobSummary, ProgressHook};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress bar counting finished chunks
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Hook to install on the job; updates this bar
    pub fn hook(&self) -> ProgressHook {
        let bar = self.bar.clone();
        Box::new(move |progress: &JobProgress| {
            bar.set_length(progress.total_chunks);
            bar.set_position(progress.finished_chunks);
            bar.set_message(progress_message(progress));
        })
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn progress_message(progress: &JobProgress) -> String {
    if progress.lost_chunks > 0 {
        format!(
            "| Workers: {} | Lost: {}",
            progress.live_workers, progress.lost_chunks
        )
    } else {
        format!("| Workers: {}", progress.live_workers)
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the job
pub fn print_summary(summary: &JobSummary) {
    let title = match &summary.status {
        JobStatus::Completed if summary.is_clean() => style("Job Complete".to_string()).green().bold(),
        JobStatus::Completed => style("Job Complete (with errors)".to_string()).yellow().bold(),
        JobStatus::Interrupted => style("Job Interrupted".to_string()).yellow().bold(),
        JobStatus::Failed(reason) => style(format!("Job Failed: {}", reason)).red().bold(),
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Job:").bold(), summary.job_id);
    println!(
        "  {} {} of {} completed",
        style("Chunks:").bold(),
        format_number(summary.completed_chunks),
        format_number(summary.total_chunks)
    );
    println!(
        "  {} {} ({})",
        style("Records:").bold(),
        format_number(summary.records),
        format_size(summary.bytes, BINARY)
    );
    println!(
        "  {} {:.1}s ({:.0} records/sec)",
        style("Duration:").bold(),
        summary.duration.as_secs_f64(),
        summary.records_per_second()
    );
    if summary.recoverable_chunks > 0 {
        println!(
            "  {} {}",
            style("Failed chunks:").yellow().bold(),
            format_number(summary.recoverable_chunks)
        );
    }
    if !summary.lost_chunks.is_empty() {
        let lost: Vec<String> = summary.lost_chunks.iter().map(u64::to_string).collect();
        println!("  {} {}", style("Lost chunks:").red().bold(), lost.join(", "));
    }
    if summary.undispatched_chunks() > 0 {
        println!(
            "  {} {}",
            style("Undispatched:").yellow().bold(),
            format_number(summary.undispatched_chunks())
        );
    }
    println!(
        "  {} {} started, {} failed to initialize, {} retired",
        style("Workers:").bold(),
        summary.workers_started,
        summary.workers_failed_init,
        summary.workers_retired
    );
    println!();
}

/// Print a header at the start of the job
pub fn print_header(store: &str, chunk_size: u32, workers: usize, logsheet: &str) {
    println!();
    println!(
        "{} {}",
        style("record-jogger").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Store:").bold(), store);
    println!("  {} {}", style("Chunk size:").bold(), format_number(chunk_size as u64));
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Logsheet:").bold(), logsheet);
    println!();
}
