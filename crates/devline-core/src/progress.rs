//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: indicatif bars (deviants processed) and spinner status lines.
//! Non-TTY mode: hidden bars; runners log progress instead.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Count bar: deviants done out of known total
fn count_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:<16.dim} {bar:30.green/dim} {pos:>7}/{len:7} {eta:>4} {wide_msg:.dim}")
        .expect("invalid template")
        .progress_chars("--")
}

/// Progress bars of one process, shared by every runner it starts
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Bars are drawn only when stderr is a terminal
    pub fn new() -> Self {
        let is_tty = std::io::stderr().is_terminal();
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Context that never draws (tests, library use)
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()),
            is_tty: false,
        }
    }

    /// Bar counting deviants for a crawl stage.
    ///
    /// The total may grow (snowball rounds); call `inc_length` as the frontier expands.
    pub fn deviant_bar(&self, name: &str, total: u64) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(total));
        pb.set_style(count_style());
        pb.set_prefix(name.chars().take(16).collect::<String>());
        pb
    }

    /// Spinner line for work without a known total (random walks)
    pub fn stage_line(&self, name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {prefix:<10.cyan.bold} {wide_msg}")
                .expect("invalid template"),
        );
        pb.set_prefix(name.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Shared with the `IndicatifLogger` so log lines print above the bars
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Handed from `main` to each subcommand
pub type SharedProgress = Arc<ProgressContext>;

/// `1234567` → `"1,234,567"`
pub fn fmt_num(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_num_small() {
        assert_eq!(fmt_num(0), "0");
        assert_eq!(fmt_num(999), "999");
    }

    #[test]
    fn fmt_num_thousands() {
        assert_eq!(fmt_num(1_000), "1,000");
        assert_eq!(fmt_num(888_326), "888,326");
        assert_eq!(fmt_num(1_234_567), "1,234,567");
    }

    #[test]
    fn hidden_context_gives_hidden_bars() {
        let ctx = ProgressContext::hidden();
        assert!(!ctx.is_tty());
        assert!(ctx.deviant_bar("watchers-friends-snowball", 10).is_hidden());
        assert!(ctx.stage_line("load").is_hidden());
    }
}
