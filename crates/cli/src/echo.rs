use std::time::Duration;

use gleaner_core::{DocumentFailure, ListDetection, RunReport, SelectorProbe, TableDetection};
use owo_colors::OwoColorize;

use crate::VERSION;

/// Print a styled banner for verbose mode
pub fn print_banner() {
    eprintln!("\n{} {} {}", "Gleaner".bold().bright_green(), "v".dimmed(), VERSION.dimmed());
    eprintln!("{}", "Point-and-click HTML extraction\n".dimmed());
}

/// Print a styled step message
pub fn print_step(step: usize, total: usize, message: &str) {
    eprintln!("{} {}", format!("[{}/{}]", step, total).dimmed(), message.bright_cyan());
}

/// Print a success message
pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green(), message.bright_green());
}

/// Print an info message
pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue(), message.bright_blue());
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message.bright_yellow());
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message.bright_red());
}

/// Print a dimmed key with a bright value
pub fn print_field(label: &str, value: impl std::fmt::Display) {
    eprintln!("  {} {}", format!("{}:", label).dimmed(), value.to_string().bright_white());
}

/// Print elapsed time with color coding
pub fn print_timing(label: &str, duration: Duration) {
    let ms = duration.as_secs_f64() * 1000.0;
    let label = format!("{}:", label);

    if ms < 1000.0 {
        eprintln!("  {} {:>10.2}ms ({})", label.dimmed(), ms, "fast".dimmed());
    } else if ms < 10_000.0 {
        eprintln!("  {} {:>10.2}ms ({})", label.dimmed(), ms, "moderate".bright_yellow());
    } else {
        eprintln!("  {} {:>10.2}ms ({})", label.dimmed(), ms, "slow".bright_red());
    }
}

/// Print a summary of a finished run
pub fn print_run_summary(report: &RunReport, elapsed: Duration) {
    eprintln!("\n{}", "═".repeat(60).dimmed());
    eprintln!("{}", "Run Summary".bold().cyan());
    eprintln!("{}", "═".repeat(60).dimmed());

    print_field("Documents", report.total());
    print_field("Succeeded", report.succeeded);
    print_field("Failed", report.failures.len());
    for table in &report.tables {
        print_field(&format!("Table {}", table.name), format!("{} rows", table.rows.len()));
    }
    print_timing("Elapsed", elapsed);
    eprintln!();
}

/// Print one line per failed document
pub fn print_failures(failures: &[DocumentFailure]) {
    for failure in failures {
        print_error(&format!("{} (#{}): {}", failure.source, failure.index + 1, failure.error));
    }
}

/// Print what list detection found
pub fn print_list_details(detection: &ListDetection) {
    print_field("Fingerprint", &detection.fingerprint);
    print_field("Container", &detection.container_selector);
    print_field("Items", detection.item_count);
    if let Some(warning) = &detection.warning {
        print_warning(&warning.to_string());
    }
}

/// Print what table detection found
pub fn print_table_details(detection: &TableDetection) {
    print_field("Table", &detection.table_selector);
    print_field("Headers", detection.headers.join(", "));
    print_field("Rows", detection.row_count);
    if detection.skipped_rows > 0 {
        print_warning(&format!("{} rows skipped: cell count differs from the header", detection.skipped_rows));
    }
}

/// One probe as text, indented by rule depth, samples on their own lines
pub fn format_probe(probe: &SelectorProbe) -> String {
    let indent = "  ".repeat(probe.depth);
    let status = if probe.is_success() { "ok" } else { "FAIL" };
    let mut line = format!("{}{} [{}] {} -> {} found", indent, status, probe.name, probe.selector, probe.found_count);
    if let Some(error) = &probe.error {
        line.push_str(&format!(" ({})", error));
    }
    for sample in &probe.samples {
        line.push_str(&format!("\n{}    {:?}", indent, sample));
    }
    line
}

/// Format file size for display
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
