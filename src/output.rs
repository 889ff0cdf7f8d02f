//! CLI output formatting and display helpers.

use songsync_core::SyncReport;

/// Message when the manifest yields no queries.
pub const NO_QUERIES_MESSAGE: &str = "No valid songs found in the manifest.";

/// Returns terminal width from COLUMNS, or 80 if unset/invalid.
pub fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|width| *width >= 20)
        .unwrap_or(80)
}

/// Truncates text to at most `width` chars, appending ellipsis if truncated.
pub fn truncate_to_width(text: &str, width: usize) -> String {
    let text_len = text.chars().count();
    if text_len <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    if width == 1 {
        return "…".to_string();
    }

    let mut output: String = text.chars().take(width - 1).collect();
    output.push('…');
    output
}

/// Prints each parsed query on its own line (dry run).
pub fn print_dry_run(queries: &[String]) {
    if queries.is_empty() {
        println!("{NO_QUERIES_MESSAGE}");
        return;
    }
    for line in dry_run_lines(queries) {
        println!("{line}");
    }
}

pub(crate) fn dry_run_lines(queries: &[String]) -> Vec<String> {
    let width = queries.len().to_string().len();
    queries
        .iter()
        .enumerate()
        .map(|(index, query)| format!("{:>width$}. {query}", index + 1))
        .collect()
}

/// Prints the end-of-run summary block to stdout.
pub fn print_summary(report: &SyncReport) {
    let width = terminal_width();
    for line in summary_lines(report, width) {
        println!("{line}");
    }
}

pub(crate) fn summary_lines(report: &SyncReport, width: usize) -> Vec<String> {
    let rule = "=".repeat(width.min(60));
    let mut lines = vec![
        rule.clone(),
        format!("Destination: {}", report.dest.display()),
        format!("Total:       {}", report.total),
        format!(
            "Succeeded:   {} ({} downloaded, {} already present)",
            report.succeeded, report.fetched, report.already_present
        ),
        format!("Failed:      {}", report.failed()),
    ];
    match &report.reconcile {
        Some(reconcile) if !reconcile.failed.is_empty() => lines.push(format!(
            "Pruned:      {} ({} could not be deleted)",
            reconcile.deleted.len(),
            reconcile.failed.len()
        )),
        Some(reconcile) => lines.push(format!("Pruned:      {}", reconcile.deleted.len())),
        None => lines.push("Pruned:      skipped".to_string()),
    }
    for failure in &report.failures {
        lines.push(truncate_to_width(
            &format!("  x {} [{}]: {}", failure.query, failure.stage, failure.reason),
            width,
        ));
    }
    lines.push(rule);
    lines
}
