//! About-page scraping

use anyhow::Context;
use devline_core::{CsvSink, ProgressContext, is_shutdown_requested, pace};

use crate::about::{AboutRow, scrape_about};
use crate::api::DeviantApi;
use crate::config::CrawlConfig;
use crate::crawl::profiles::open_sink;
use crate::crawl::{VisitedGuard, normalize_names};
use crate::state::{CrawlKind, Dataset};
use crate::stats::CrawlStats;

/// Rows buffered between appends
pub const ABOUT_BATCH_SIZE: usize = 10;

/// Append the buffered rows and persist visited state with them
fn flush(
    sink: &mut CsvSink,
    batch: &mut Vec<AboutRow>,
    visited: &VisitedGuard,
    stats: &mut CrawlStats,
) -> anyhow::Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let n = sink
        .append(&batch[..])
        .with_context(|| format!("Failed to append to {}", sink.path().display()))?;
    stats.add_rows(Dataset::About, n);
    batch.clear();
    visited.checkpoint();
    Ok(())
}

/// Scrape about and gallery pages of each unvisited name.
///
/// Rows are written in batches of `batch_size`; every user is followed by a
/// `scrape_delay` pause, failed ones included.
pub fn crawl_about<A: DeviantApi + ?Sized>(
    api: &A,
    config: &CrawlConfig,
    progress: &ProgressContext,
    names: &[String],
    batch_size: usize,
) -> anyhow::Result<CrawlStats> {
    crawl_about_until(
        api,
        config,
        progress,
        names,
        batch_size,
        &is_shutdown_requested,
    )
}

pub(crate) fn crawl_about_until<A: DeviantApi + ?Sized>(
    api: &A,
    config: &CrawlConfig,
    progress: &ProgressContext,
    names: &[String],
    batch_size: usize,
    stop: &dyn Fn() -> bool,
) -> anyhow::Result<CrawlStats> {
    let mut stats = CrawlStats::new(CrawlKind::About);
    let out = config.csv(Dataset::About);
    let mut visited = VisitedGuard::load(config, CrawlKind::About);
    visited.union_column(&out, Dataset::About.deviant_column())?;
    let mut sink = open_sink(config, Dataset::About)?;

    let names = normalize_names(names);
    let todo = visited.difference(&names);
    stats.skipped = names.len() - todo.len();
    log::info!("about: {} pages to scrape", todo.len());
    let bar = progress.deviant_bar("about", todo.len() as u64);
    let batch_size = batch_size.max(1);
    let mut batch: Vec<AboutRow> = Vec::with_capacity(batch_size);

    for name in &todo {
        if stop() {
            stats.interrupted = true;
            break;
        }
        visited.insert(name);
        bar.set_message(name.clone());
        match scrape_about(api, name) {
            Ok(row) => batch.push(row),
            Err(e) => {
                log::warn!("{name}: about page: {e}");
                stats.failed += 1;
            }
        }
        stats.processed += 1;
        if batch.len() >= batch_size {
            flush(&mut sink, &mut batch, &visited, &mut stats)?;
        }
        bar.inc(1);
        pace(config.pacing.scrape_delay);
    }
    stats.interrupted |= stop();

    flush(&mut sink, &mut batch, &visited, &mut stats)?;
    bar.finish_and_clear();
    stats.finish();
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::about::{about_url, gallery_url};
    use crate::crawl::fake::FakeApi;
    use crate::crawl::test_util::{config, lines};
    use tempfile::TempDir;

    const PAGE: &str = r#"<div id="userstats">Pageviews 10</div>"#;

    #[test]
    fn rows_written_in_batches() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let names: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let mut api = FakeApi::new();
        for n in &names {
            api = api.with_html(&about_url(n), PAGE);
        }
        let stats = crawl_about(&api, &cfg, &ProgressContext::hidden(), &names, 2).unwrap();
        assert_eq!(stats.rows_for(Dataset::About), 3);
        let out = lines(&cfg.csv(Dataset::About));
        assert_eq!(out.len(), 4);
        assert!(out[0].starts_with("username,statistics,about_info"));
        assert!(out[1].starts_with("a,"));
    }

    #[test]
    fn stop_during_last_page_reported() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let names = vec!["a".to_string()];
        let api = FakeApi::new().with_html(&about_url("a"), PAGE);
        let stop = || !api.calls.borrow().is_empty();
        let stats =
            crawl_about_until(&api, &cfg, &ProgressContext::hidden(), &names, 10, &stop).unwrap();
        assert_eq!(stats.processed, 1);
        assert!(stats.interrupted);
        assert_eq!(lines(&cfg.csv(Dataset::About)).len(), 2);
    }

    #[test]
    fn failed_pages_counted_and_not_retried() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let names = vec!["gone".to_string()];
        let api = FakeApi::new().with_html_status(&about_url("gone"), 404);
        let stats = crawl_about(&api, &cfg, &ProgressContext::hidden(), &names, 10).unwrap();
        assert_eq!(stats.failed, 1);
        assert!(api.calls_to(&gallery_url("gone")).is_empty());

        let api = FakeApi::new();
        let stats = crawl_about(&api, &cfg, &ProgressContext::hidden(), &names, 10).unwrap();
        assert_eq!(stats.skipped, 1);
        assert!(api.calls.borrow().is_empty());
    }
}
