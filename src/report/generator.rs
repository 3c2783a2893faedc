//! Run report generation.
//!
//! This module renders a finished crawl as Markdown or JSON and writes it
//! into the task folder next to the images and workbook.

use crate::cli::OutputFormat;
use crate::models::{CrawlStats, PinRecord, RunReport};
use crate::utils::{format_duration, format_number, truncate};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Base name of the report file; the extension follows the format.
pub const REPORT_FILE_STEM: &str = "run_report";

const TITLE_WIDTH: usize = 48;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &RunReport) -> String {
    let mut output = String::new();

    output.push_str("# Pinscout Run Report\n\n");

    output.push_str(&generate_metadata_section(report));
    output.push_str(&generate_summary_section(&report.stats, report.records.len()));
    output.push_str(&generate_exports_section(&report.exports));
    output.push_str(&generate_pins_section(&report.records));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(report: &RunReport) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Keywords:** {}\n", report.keywords.join(", ")));
    section.push_str(&format!(
        "- **Started:** {}\n",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Minimum Likes:** {}\n",
        format_number(report.min_likes)
    ));
    section.push_str(&format!("- **Max Results:** {}\n", report.max_results));
    section.push_str(&format!("- **Mode:** {:?}\n", report.mode));
    section.push_str(&format!(
        "- **Duration:** {}\n",
        format_duration(Duration::from_secs_f64(report.duration_seconds.max(0.0)))
    ));
    section.push_str(&format!(
        "- **Task Folder:** `{}`\n",
        report.task_folder.display()
    ));
    if report.stats.interrupted {
        section.push_str("- **Status:** interrupted, partial results\n");
    }
    section.push('\n');

    section
}

/// Generate the counters table.
fn generate_summary_section(stats: &CrawlStats, recorded: usize) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| Metric | Count |\n");
    section.push_str("|--------|-------|\n");

    let rows = [
        ("Pins found", stats.found),
        ("Detail pages visited", stats.visited),
        ("Revisits", stats.revisited),
        ("Above threshold", stats.matched),
        ("Recorded", recorded),
        ("Downloaded", stats.downloaded),
        ("Skipped (already seen)", stats.skipped_seen),
        ("Below threshold", stats.below_threshold),
        ("Rejected images", stats.rejected_images),
        ("Failed", stats.failed),
    ];
    for (label, count) in rows {
        section.push_str(&format!("| {} | {} |\n", label, count));
    }
    section.push('\n');

    section
}

fn generate_exports_section(exports: &[String]) -> String {
    if exports.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Exports\n\n");
    for location in exports {
        section.push_str(&format!("- {}\n", location));
    }
    section.push('\n');
    section
}

/// Generate the matched pins table.
fn generate_pins_section(records: &[PinRecord]) -> String {
    let mut section = String::new();

    section.push_str("## Matched Pins\n\n");

    if records.is_empty() {
        section.push_str("No pins reached the like threshold.\n\n");
        return section;
    }

    section.push_str("| # | Likes | Title | Keyword | Source | Pin | File |\n");
    section.push_str("|---|-------|-------|---------|--------|-----|------|\n");

    for record in records {
        let title = if record.pin.title.is_empty() {
            "-".to_string()
        } else {
            escape_cell(&truncate(&record.pin.title, TITLE_WIDTH))
        };
        let file = record.file_name();

        section.push_str(&format!(
            "| {} | {} | {} | {} | {} | [link]({}) | {} |\n",
            record.index,
            format_number(record.likes),
            title,
            escape_cell(&record.keyword),
            record.source,
            record.pin.url,
            if file.is_empty() { "-".to_string() } else { format!("`{}`", file) }
        ));
    }
    section.push('\n');

    section
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Generate the report footer.
fn generate_footer() -> String {
    format!(
        "---\n\n*Report generated by pinscout v{}*\n",
        env!("CARGO_PKG_VERSION")
    )
}

/// Generate a JSON report.
pub fn generate_json_report(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Render the report in `format` and write it into `dir`.
pub fn write_report(report: &RunReport, format: OutputFormat, dir: &Path) -> Result<PathBuf> {
    let content = match format {
        OutputFormat::Markdown => generate_markdown_report(report),
        OutputFormat::Json => generate_json_report(report)?,
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("{}.{}", REPORT_FILE_STEM, format.extension()));
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    Ok(path)
}
