//! Terminal output for discovery and batch runs.

use std::time::Duration;

use ctrun_core::{BatchSummary, Inventory, RunEvent};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

const PROGRESS_TEMPLATE: &str = "{spinner} [{elapsed_precise}] {bar:30} {pos}/{len} {msg}";

/// Print the inventory as a fixture tree.
pub fn print_inventory(inventory: &Inventory) {
    for fixture in &inventory.fixtures {
        println!("{} ({})", fixture.name, fixture.tests.len());
        for test in &fixture.tests {
            match (&test.source_file, test.line) {
                (Some(file), Some(line)) => {
                    println!("  {}  {}:{}", test.label, file.display(), line)
                }
                (Some(file), None) => println!("  {}  {}", test.label, file.display()),
                _ => println!("  {}", test.label),
            }
        }
    }
    if inventory.is_empty() {
        println!("No tests found.");
    }
    for err in &inventory.errors {
        eprintln!("warning: {err}");
    }
}

/// Render run events until the sender side is dropped.
///
/// With `json`, every event is printed as one JSON line and no progress bar is drawn.
pub async fn consume_events(mut rx: mpsc::UnboundedReceiver<RunEvent>, total: usize, json: bool) {
    if json {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("Could not serialize run event: {e}"),
            }
        }
        return;
    }

    let bar = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::with_template(PROGRESS_TEMPLATE) {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(120));

    while let Some(event) = rx.recv().await {
        match event {
            RunEvent::Enqueued { .. } => {}
            RunEvent::Started { id } => bar.set_message(id),
            RunEvent::Passed { id, duration } => {
                bar.println(format!("PASS  {id} ({})", format_duration(duration)));
                bar.inc(1);
            }
            RunEvent::Failed {
                id,
                message,
                duration,
            } => {
                bar.println(format!("FAIL  {id} ({})", format_duration(duration)));
                for line in message.lines() {
                    bar.println(format!("      {line}"));
                }
                bar.inc(1);
            }
            RunEvent::Skipped { id } => {
                bar.println(format!("SKIP  {id}"));
                bar.inc(1);
            }
        }
    }
    bar.finish_and_clear();
}

pub fn print_summary(summary: &BatchSummary) {
    println!();
    println!(
        "{} tests: {} passed, {} failed, {} skipped",
        summary.total(),
        summary.passed,
        summary.failed,
        summary.skipped
    );
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(42)), "42ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
