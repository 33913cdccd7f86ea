pub mod crawl;
pub mod download;
pub mod export;
pub mod load;
pub mod merge;

use std::process::ExitCode;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

/// Exit status used after SIGINT/SIGTERM
const INTERRUPTED: u8 = 130;

/// 130 when the run stopped on a shutdown request, success otherwise
pub fn exit_code(interrupted: bool) -> ExitCode {
    if interrupted || devline_core::is_shutdown_requested() {
        ExitCode::from(INTERRUPTED)
    } else {
        ExitCode::SUCCESS
    }
}

/// Table with cyan headers, the style every summary uses
pub fn summary_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

/// Print a key-value summary table on stderr
pub fn print_summary(title: &str, rows: &[(&str, String)]) {
    let mut table = summary_table(&[title, "Value"]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}
