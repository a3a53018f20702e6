//! Output formatting for CLI

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use tracing::debug;
use wpacceptance_e2e::{E2eError, TestSuiteResult};

/// Print success message
pub fn print_success(message: &str) {
    println!("{}", message.green());
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{}", message.red());
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("{}", message.yellow());
}

/// Print info message
pub fn print_info(message: &str) {
    println!("{}", message);
}

/// Print a terminal error as a single line.
///
/// Details the user-facing message hides (backend output, file paths) go to
/// the debug log.
pub fn report_error(err: &anyhow::Error) {
    if let Some(E2eError::Common(inner)) = err.downcast_ref::<E2eError>() {
        if let Some(detail) = inner.detail() {
            debug!("{}", detail);
        }
    } else if let Some(inner) = err.downcast_ref::<wpacceptance_common::Error>() {
        if let Some(detail) = inner.detail() {
            debug!("{}", detail);
        }
    }
    debug!("{:?}", err);
    print_error(&err.to_string());
}

/// Print a table of test case outcomes
pub fn print_results(suite: &TestSuiteResult) {
    if suite.results.is_empty() {
        print_warning("No test cases found.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec!["Test", "Result", "Steps", "Duration", "Error"]);
    for result in &suite.results {
        let status = if result.success {
            Cell::new("passed").fg(Color::Green)
        } else {
            Cell::new("failed").fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(&result.name),
            status,
            Cell::new(result.steps.len()),
            Cell::new(format!("{} ms", result.duration_ms)),
            Cell::new(result.error.as_deref().unwrap_or("")),
        ]);
    }

    println!("{table}");
    println!(
        "{} passed, {} failed ({} ms)",
        suite.passed, suite.failed, suite.duration_ms
    );
}
