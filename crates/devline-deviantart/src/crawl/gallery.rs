//! Gallery listings

use anyhow::Context;
use devline_core::{CsvSink, ProgressContext, is_shutdown_requested, pace, read_column};
use rustc_hash::FxHashSet;

use crate::api::DeviantApi;
use crate::config::CrawlConfig;
use crate::crawl::profiles::open_sink;
use crate::crawl::{VisitedGuard, normalize_names};
use crate::state::{CrawlKind, Dataset};
use crate::stats::CrawlStats;
use crate::transform::parse_gallery;

/// Consecutive empty pages after which a gallery is considered exhausted
pub const MAX_EMPTY_PAGES: usize = 3;

/// How paging through one gallery ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GalleryEnd {
    Done,
    Failed,
    Stopped,
}

/// Page through one gallery
fn fetch_gallery<A: DeviantApi + ?Sized>(
    api: &A,
    config: &CrawlConfig,
    username: &str,
    sink: &mut CsvSink,
    known_ids: &mut FxHashSet<String>,
    stats: &mut CrawlStats,
    stop: &dyn Fn() -> bool,
) -> anyhow::Result<GalleryEnd> {
    let mut offset = 0usize;
    let mut empty_pages = 0usize;
    loop {
        let body = match api.gallery_page(username, offset) {
            Ok(body) => body,
            Err(e) if e.is_user_done() => {
                log::debug!("{username}: gallery done at offset {offset}");
                return Ok(GalleryEnd::Done);
            }
            Err(e) => {
                log::warn!("{username}: gallery stopped at offset {offset}: {e}");
                return Ok(GalleryEnd::Failed);
            }
        };
        let page = parse_gallery(body);
        let n = sink
            .append_unique(page.rows, |r| r.deviation_id.as_str(), known_ids)
            .with_context(|| format!("Failed to append to {}", sink.path().display()))?;
        stats.add_rows(Dataset::Gallery, n);

        if page.result_count == 0 {
            empty_pages += 1;
            if empty_pages >= MAX_EMPTY_PAGES {
                log::debug!("{username}: {empty_pages} empty pages, stopping");
                return Ok(GalleryEnd::Done);
            }
        } else {
            empty_pages = 0;
        }
        if !page.has_more {
            return Ok(GalleryEnd::Done);
        }
        offset = match page.next_offset {
            Some(next) => next as usize,
            None => offset + page.result_count,
        };

        pace(config.pacing.gallery_page_delay);
        if stop() {
            return Ok(GalleryEnd::Stopped);
        }
    }
}

/// Galleries of each name not yet in the gallery output.
///
/// Visited = state file ∪ `Author_name` column; rows are deduplicated on
/// `Deviation_id` against everything already written. A gallery stopped part
/// way is marked unfinished and paged again next run.
pub fn crawl_gallery<A: DeviantApi + ?Sized>(
    api: &A,
    config: &CrawlConfig,
    progress: &ProgressContext,
    names: &[String],
) -> anyhow::Result<CrawlStats> {
    crawl_gallery_until(api, config, progress, names, &is_shutdown_requested)
}

pub(crate) fn crawl_gallery_until<A: DeviantApi + ?Sized>(
    api: &A,
    config: &CrawlConfig,
    progress: &ProgressContext,
    names: &[String],
    stop: &dyn Fn() -> bool,
) -> anyhow::Result<CrawlStats> {
    let mut stats = CrawlStats::new(CrawlKind::Gallery);
    let out = config.csv(Dataset::Gallery);
    let mut visited = VisitedGuard::load(config, CrawlKind::Gallery);
    visited.union_column(&out, Dataset::Gallery.deviant_column())?;
    let mut known_ids = read_column(&out, "Deviation_id")
        .with_context(|| format!("Failed to read {}", out.display()))?;
    let mut sink = open_sink(config, Dataset::Gallery)?;

    let names = normalize_names(names);
    let todo = visited.difference(&names);
    stats.skipped = names.len() - todo.len();
    log::info!(
        "gallery: {} deviants to fetch, {} known deviations",
        todo.len(),
        known_ids.len()
    );
    let bar = progress.deviant_bar("gallery", todo.len() as u64);

    for (i, name) in todo.iter().enumerate() {
        if i > 0 {
            pace(config.pacing.gallery_page_delay);
        }
        if stop() {
            stats.interrupted = true;
            break;
        }
        if let Err(e) = api.refresh_if_stale() {
            log::warn!("Token refresh failed: {e}");
        }
        visited.insert(name);
        visited.checkpoint();
        bar.set_message(name.clone());

        match fetch_gallery(
            api,
            config,
            name,
            &mut sink,
            &mut known_ids,
            &mut stats,
            stop,
        )? {
            GalleryEnd::Done => {}
            GalleryEnd::Failed => stats.failed += 1,
            GalleryEnd::Stopped => {
                visited.mark_unfinished(name);
                stats.interrupted = true;
                break;
            }
        }
        stats.processed += 1;
        bar.inc(1);
    }
    stats.interrupted |= stop();

    bar.finish_and_clear();
    stats.finish();
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::fake::FakeApi;
    use crate::crawl::test_util::{config, lines};
    use serde_json::json;
    use tempfile::TempDir;

    fn deviation(id: &str) -> serde_json::Value {
        json!({"deviationid": id, "url": format!("https://d/{id}"),
               "author": {"userid": "U1", "username": "amy"},
               "published_time": "1683132000",
               "content": {"src": format!("https://img/{id}.jpg")}})
    }

    #[test]
    fn follows_next_offset_and_dedups() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let api = FakeApi::new()
            .with_json(
                "gallery/all?username=amy&offset=0&limit=24",
                json!({"has_more": true, "next_offset": 2,
                       "results": [deviation("D1"), deviation("D2")]}),
            )
            .with_json(
                "gallery/all?username=amy&offset=2&limit=24",
                json!({"has_more": false, "results": [deviation("D2"), deviation("D3")]}),
            );
        let stats =
            crawl_gallery(&api, &cfg, &ProgressContext::hidden(), &["amy".to_string()]).unwrap();
        assert_eq!(stats.rows_for(Dataset::Gallery), 3);
        assert_eq!(lines(&cfg.csv(Dataset::Gallery)).len(), 4);
    }

    #[test]
    fn offset_advances_by_result_count_without_next_offset() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let api = FakeApi::new()
            .with_json(
                "gallery/all?username=amy&offset=0&limit=24",
                json!({"has_more": true, "results": [deviation("D1")]}),
            )
            .with_json(
                "gallery/all?username=amy&offset=1&limit=24",
                json!({"has_more": false, "results": [deviation("D2")]}),
            );
        let stats =
            crawl_gallery(&api, &cfg, &ProgressContext::hidden(), &["amy".to_string()]).unwrap();
        assert_eq!(stats.rows_for(Dataset::Gallery), 2);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn stops_after_consecutive_empty_pages() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let api = FakeApi::new().with_json(
            "gallery/all?username=amy&offset=0&limit=24",
            json!({"has_more": true, "results": []}),
        );
        crawl_gallery(&api, &cfg, &ProgressContext::hidden(), &["amy".to_string()]).unwrap();
        assert_eq!(api.calls_to("gallery/all").len(), MAX_EMPTY_PAGES);
    }

    #[test]
    fn stopped_gallery_paged_again_next_run() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let api = FakeApi::new()
            .with_json(
                "gallery/all?username=amy&offset=0&limit=24",
                json!({"has_more": true, "next_offset": 2,
                       "results": [deviation("D1"), deviation("D2")]}),
            )
            .with_json(
                "gallery/all?username=amy&offset=2&limit=24",
                json!({"has_more": false, "results": [deviation("D3")]}),
            );
        let names = ["amy".to_string()];

        let stop = || !api.calls_to("gallery/all").is_empty();
        let stats =
            crawl_gallery_until(&api, &cfg, &ProgressContext::hidden(), &names, &stop).unwrap();
        assert!(stats.interrupted);
        assert_eq!(stats.processed, 0);
        assert_eq!(stats.rows_for(Dataset::Gallery), 2);

        let stats = crawl_gallery(&api, &cfg, &ProgressContext::hidden(), &names).unwrap();
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.rows_for(Dataset::Gallery), 1);
        // header plus D1, D2, D3 once each
        assert_eq!(lines(&cfg.csv(Dataset::Gallery)).len(), 4);
    }

    #[test]
    fn stop_after_last_gallery_reported() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let api = FakeApi::new().with_json(
            "gallery/all?username=amy&offset=0&limit=24",
            json!({"has_more": false, "results": [deviation("D1")]}),
        );
        let stop = || !api.calls_to("gallery/all").is_empty();
        let names = ["amy".to_string()];
        let stats =
            crawl_gallery_until(&api, &cfg, &ProgressContext::hidden(), &names, &stop).unwrap();
        assert_eq!(stats.processed, 1);
        assert!(stats.interrupted);
    }

    #[test]
    fn authors_in_output_are_skipped() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let api = FakeApi::new().with_json(
            "gallery/all?username=amy&offset=0&limit=24",
            json!({"has_more": false, "results": [deviation("D1")]}),
        );
        crawl_gallery(&api, &cfg, &ProgressContext::hidden(), &["amy".to_string()]).unwrap();
        std::fs::remove_dir_all(dir.path().join(".state")).unwrap();

        let api = FakeApi::new();
        let stats =
            crawl_gallery(&api, &cfg, &ProgressContext::hidden(), &["amy".to_string()]).unwrap();
        assert_eq!(stats.skipped, 1);
        assert!(api.calls.borrow().is_empty());
    }
}
