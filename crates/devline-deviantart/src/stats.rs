//! Crawl statistics and summary tables

use std::time::{Duration, Instant};

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use devline_core::fmt_num;

use crate::state::{CrawlKind, Dataset};

/// Counters for one crawl run.
#[derive(Debug, Clone)]
pub struct CrawlStats {
    pub kind: CrawlKind,
    /// Deviants (or tags, for the tag crawl) handled this run
    pub processed: usize,
    /// Already in the visited set
    pub skipped: usize,
    /// Gave up after retries or non-retryable errors
    pub failed: usize,
    /// Rows appended per output, in first-write order
    pub rows: Vec<(Dataset, usize)>,
    /// Files downloaded and their total size
    pub files: usize,
    pub bytes: u64,
    /// Set when the run stopped on a shutdown request
    pub interrupted: bool,
    pub elapsed: Duration,
    started: Instant,
}

impl CrawlStats {
    pub fn new(kind: CrawlKind) -> Self {
        Self {
            kind,
            processed: 0,
            skipped: 0,
            failed: 0,
            rows: Vec::new(),
            files: 0,
            bytes: 0,
            interrupted: false,
            elapsed: Duration::ZERO,
            started: Instant::now(),
        }
    }

    pub fn add_rows(&mut self, dataset: Dataset, n: usize) {
        match self.rows.iter_mut().find(|(d, _)| *d == dataset) {
            Some((_, count)) => *count += n,
            None => self.rows.push((dataset, n)),
        }
    }

    pub fn rows_for(&self, dataset: Dataset) -> usize {
        self.rows
            .iter()
            .find(|(d, _)| *d == dataset)
            .map_or(0, |(_, n)| *n)
    }

    pub fn total_rows(&self) -> usize {
        self.rows.iter().map(|(_, n)| n).sum()
    }

    /// Stamp elapsed time; call once when the run ends
    pub fn finish(&mut self) {
        self.elapsed = self.started.elapsed();
    }

    /// Format summary table as a string.
    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new(format!("Crawl: {}", self.kind))
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
            ]);

        table.add_row(vec![Cell::new("Processed"), Cell::new(fmt_num(self.processed))]);
        table.add_row(vec![
            Cell::new("Skipped (visited)"),
            Cell::new(fmt_num(self.skipped)),
        ]);
        let failed = Cell::new(fmt_num(self.failed));
        table.add_row(vec![
            Cell::new("Failed"),
            if self.failed > 0 {
                failed.fg(Color::Red)
            } else {
                failed
            },
        ]);
        for (dataset, n) in &self.rows {
            table.add_row(vec![
                Cell::new(format!("{dataset} rows")).fg(Color::Green),
                Cell::new(fmt_num(*n)).fg(Color::Green),
            ]);
        }
        if self.files > 0 {
            table.add_row(vec![
                Cell::new("Files downloaded").fg(Color::Green),
                Cell::new(format!(
                    "{} ({:.1} MiB)",
                    fmt_num(self.files),
                    self.bytes as f64 / (1024.0 * 1024.0)
                ))
                .fg(Color::Green),
            ]);
        }
        table.add_row(vec![
            Cell::new("Elapsed"),
            Cell::new(format!("{:.1}s", self.elapsed.as_secs_f64())),
        ]);
        if self.interrupted {
            table.add_row(vec![
                Cell::new("Status").fg(Color::Yellow),
                Cell::new("interrupted").fg(Color::Yellow),
            ]);
        }

        format!("\n{table}")
    }

    /// Print summary table to stderr (TTY mode).
    pub fn print(&self) {
        eprintln!("{}", self.format_table());
    }

    /// Log minimal summary (non-TTY mode).
    pub fn log(&self) {
        let rows = self
            .rows
            .iter()
            .map(|(d, n)| format!("{d}={}", fmt_num(*n)))
            .collect::<Vec<_>>()
            .join(", ");
        log::info!(
            "{} {}: {} processed, {} skipped, {} failed, rows [{}], {} files [{:.1}s]",
            self.kind,
            if self.interrupted { "interrupted" } else { "complete" },
            fmt_num(self.processed),
            fmt_num(self.skipped),
            fmt_num(self.failed),
            rows,
            fmt_num(self.files),
            self.elapsed.as_secs_f64()
        );
    }
}
