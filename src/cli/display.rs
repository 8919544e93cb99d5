//! Terminal output for the CLI
//!
//! Colored summaries, answers with their sources, and the ingestion spinner.

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::cli::Verbosity;
use crate::ingestion::{IngestProgress, IngestReport};
use crate::rag::QueryOutcome;
use crate::telemetry::TelemetryStats;

/// Rows of the ingestion summary, in print order
pub fn summary_rows(report: &IngestReport) -> Vec<(&'static str, usize)> {
    vec![
        ("Records read", report.records_read),
        ("Records skipped", report.records_skipped),
        ("Records chunked", report.records_chunked),
        ("Records indexed", report.records_indexed),
        ("Passages created", report.passages_created),
        ("Passages embedded", report.passages_embedded),
        ("Passages indexed", report.passages_indexed),
        ("Passages failed", report.passages_failed),
    ]
}

fn format_duration(duration_ms: u64) -> String {
    if duration_ms >= 1000 {
        format!("{:.1}s", duration_ms as f64 / 1000.0)
    } else {
        format!("{}ms", duration_ms)
    }
}

/// Display manager for CLI output
pub struct DisplayManager {
    verbosity: Verbosity,
}

impl DisplayManager {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    /// Spinner for a long-running ingestion; hidden in quiet mode
    pub fn ingest_spinner(&self, file: &str) -> ProgressBar {
        if !self.verbosity.show_progress() {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix} [{elapsed}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_prefix(format!("Ingesting {}", file));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn update_spinner(pb: &ProgressBar, progress: IngestProgress) {
        pb.set_message(format!(
            "{} batches, {} passages indexed, {} failed",
            progress.batches_done, progress.passages_indexed, progress.passages_failed
        ));
    }

    /// Spinner shown while a question is being answered
    pub fn query_spinner(&self) -> ProgressBar {
        if !self.verbosity.show_progress() {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Searching reviews...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn show_ingest_report(&self, report: &IngestReport, stats: &TelemetryStats, duration_ms: u64) {
        println!();
        if report.is_complete() {
            println!("{} {}", "✓".green().bold(), "Ingestion complete".green().bold());
        } else {
            println!("{} {}", "✗".red().bold(), "Ingestion finished with failures".red().bold());
        }

        for (label, value) in summary_rows(report) {
            let value = value.to_string();
            let value = if label == "Passages failed" && report.passages_failed > 0 {
                value.red()
            } else {
                value.normal()
            };
            println!("  {:<20} {}", label, value);
        }
        println!("  {:<20} {}", "Time", format_duration(duration_ms).dimmed());

        if self.verbosity.show_details() {
            println!(
                "  {:<20} {} batches, {} retries",
                "Embedding", stats.batches_embedded, stats.retry_attempts
            );
            for rejection in &report.rejections {
                println!(
                    "  {} line {}: {} {}",
                    "skipped".yellow(),
                    rejection.line,
                    rejection.field,
                    rejection.reason.dimmed()
                );
            }
        }

        for (id, reason) in report.failures.iter().take(10) {
            println!("  {} {} {}", "failed".red(), id, reason.dimmed());
        }
        if report.failures.len() > 10 {
            println!("  {}", format!("... and {} more", report.failures.len() - 10).dimmed());
        }
        println!();
    }

    pub fn show_answer(&self, outcome: &QueryOutcome, show_sources: bool) {
        let answer = &outcome.answer;
        println!("\n{}\n", answer.text);

        if answer.has_citations() {
            println!("{}", "Sources".bold().cyan());
            for citation in &answer.citations {
                println!(
                    "  [{}] review {} {}",
                    citation.tag.to_string().cyan(),
                    citation.record_id,
                    citation.passage_id.to_string().dimmed()
                );
                if show_sources {
                    for line in citation.excerpt.lines() {
                        println!("      {}", line.dimmed());
                    }
                }
            }
        }

        if !answer.rejected_tags.is_empty() {
            self.show_warning(&format!(
                "removed citations not backed by retrieved reviews: {}",
                answer.rejected_tags.join(" ")
            ));
        }

        if self.verbosity.show_details() {
            println!(
                "{}",
                format!(
                    "{} retrieved, {} in context, {}",
                    outcome.retrieved,
                    outcome.context.entries.len(),
                    format_duration(outcome.duration_ms)
                )
                .dimmed()
            );
        }
        println!();
    }

    pub fn show_banner(&self, collection: &str) {
        println!("\n{}", "reviewrag".bold().cyan());
        println!("{}", format!("Collection: {}", collection).dimmed());
        println!(
            "Ask a question about the reviews ({} for help, {} to quit)\n",
            "/help".green(),
            "/exit".green()
        );
    }

    pub fn show_help(&self) {
        println!("  {}   leave the session", "/exit".green());
        println!("  {}   this message", "/help".green());
        println!("  Anything else is answered from the indexed reviews.");
        println!("  Ctrl-C cancels a running question.");
    }

    pub fn show_success(&self, message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    pub fn show_error(&self, error: &str) {
        eprintln!("{} {}", "Error:".red().bold(), error.red());
    }

    pub fn show_warning(&self, warning: &str) {
        eprintln!("{} {}", "Warning:".yellow().bold(), warning.yellow());
    }

    pub fn show_section(&self, title: &str) {
        println!("\n{}", title.bold().cyan());
        println!("{}", "-".repeat(60).cyan());
    }

    pub fn show_field(&self, label: &str, value: &str) {
        println!("  {:<20} {}", label, value);
    }
}
