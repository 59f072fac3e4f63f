//! Conversion progress accounting and terminal output
//!
//! The number of reads in a legacy file is unknown until the file has been
//! scanned, so every pending file starts with a fixed estimate. The bar's
//! length is the live sum of all per-file values and is corrected (up or
//! down) each time a file reports its true count.

use crate::converter::ConvertSummary;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Reads assumed per file until its true count is known
pub const ESTIMATED_READS_PER_FILE: u64 = 4000;

/// Environment variable that disables progress bars when set to 0
pub const PBAR_ENV: &str = "POD5_PBAR";

/// Check whether progress bars are enabled in the environment
pub fn progress_enabled() -> bool {
    match std::env::var(PBAR_ENV) {
        Ok(value) => value.trim().parse::<i64>().map(|v| v != 0).unwrap_or(true),
        Err(_) => true,
    }
}

/// Tracks finished files and read totals for a run
pub struct StatusMonitor {
    path_reads: HashMap<PathBuf, u64>,
    finished: HashSet<PathBuf>,
    total_reads: u64,
    reads_done: u64,
    bar: ProgressBar,
}

impl StatusMonitor {
    /// Create a monitor for `paths`; the bar is drawn only if `show`
    pub fn new(paths: &[PathBuf], show: bool) -> Self {
        let path_reads: HashMap<PathBuf, u64> = paths
            .iter()
            .map(|p| (p.clone(), ESTIMATED_READS_PER_FILE))
            .collect();
        let total_reads = path_reads.values().sum();

        let bar = if show {
            let bar = ProgressBar::new(total_reads);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{msg} {wide_bar:.cyan/blue} {pos}/{len} reads \
                         [{elapsed_precise}<{eta_precise}, {per_sec}]",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar.enable_steady_tick(Duration::from_millis(250));
            bar
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(format!("Converting {} files", path_reads.len()));

        Self {
            path_reads,
            finished: HashSet::new(),
            total_reads,
            reads_done: 0,
            bar,
        }
    }

    pub fn total_files(&self) -> usize {
        self.path_reads.len()
    }

    /// Live sum of per-file read estimates and true counts
    pub fn total_reads(&self) -> u64 {
        self.total_reads
    }

    /// Reads written so far
    pub fn reads_done(&self) -> u64 {
        self.reads_done
    }

    pub fn finished_files(&self) -> usize {
        self.finished.len()
    }

    /// True until every file has finished
    pub fn running(&self) -> bool {
        self.finished.len() < self.path_reads.len()
    }

    /// Check if `path` is one of the files being converted
    pub fn is_tracked(&self, path: &Path) -> bool {
        self.path_reads.contains_key(path)
    }

    pub fn is_finished(&self, path: &Path) -> bool {
        self.finished.contains(path)
    }

    /// Mark `path` finished
    pub fn increment(&mut self, path: &Path) {
        self.finished.insert(path.to_path_buf());
    }

    /// Advance the bar by `n` reads
    pub fn increment_reads(&mut self, n: u64) {
        self.reads_done += n;
        self.bar.inc(n);
    }

    /// Replace the estimate for `path` with its true read count
    pub fn update_reads_total(&mut self, path: &Path, total: u64) {
        self.path_reads.insert(path.to_path_buf(), total);
        self.total_reads = self.path_reads.values().sum();
        self.bar.set_length(self.total_reads);
    }

    /// Print a message without clobbering the bar
    pub fn write(&self, msg: &str) {
        self.bar.suspend(|| eprintln!("{}", msg));
    }

    /// Stop drawing, leaving the final state on screen
    pub fn close(&self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}

impl Drop for StatusMonitor {
    fn drop(&mut self) {
        self.close();
    }
}

/// Spinner-style bar for the input check pass
pub fn checking_bar(total: usize, show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg} {bar:30.green} {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message("Checking input files");
    bar
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Print a summary of the conversion
pub fn print_summary(summary: &ConvertSummary) {
    let duration_secs = summary.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        summary.records as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    println!("{}", style("Conversion Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Files:").bold(),
        format_number(summary.files as u64)
    );
    println!(
        "  {} {}",
        style("Reads:").bold(),
        format_number(summary.records)
    );
    println!(
        "  {} {:.1}s ({:.0} reads/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if summary.failed > 0 {
        println!(
            "  {} {}",
            style("Failed:").yellow().bold(),
            format_number(summary.failed as u64)
        );
    }
    for path in &summary.outputs {
        match std::fs::metadata(path) {
            Ok(meta) => println!(
                "  {} {} ({})",
                style("Output:").bold(),
                path.display(),
                format_size(meta.len(), BINARY)
            ),
            Err(_) => println!("  {} {}", style("Output:").bold(), path.display()),
        }
    }
    println!();
}

/// Print a header at the start of the conversion
pub fn print_header(files: usize, workers: usize, output: &Path) {
    println!();
    println!(
        "{} {}",
        style("pod5-convert").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Inputs:").bold(), format_number(files as u64));
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Output:").bold(), output.display());
    println!();
}
