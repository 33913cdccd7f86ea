//! Deviants found by browsing tags

use anyhow::Context;
use devline_core::{CsvSink, ProgressContext, is_shutdown_requested, pace, read_column};
use rustc_hash::FxHashSet;

use crate::api::{DeviantApi, TAG_PAGE_LIMIT};
use crate::config::CrawlConfig;
use crate::crawl::profiles::open_sink;
use crate::crawl::{VisitedGuard, normalize_names};
use crate::state::{CrawlKind, Dataset};
use crate::stats::CrawlStats;
use crate::transform::{TagDeviantRow, parse_tag_page, split_tag_cursor};

/// Tags browsed between appends
pub const TAG_FLUSH_EVERY: usize = 10;

/// How browsing one tag ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagEnd {
    Done,
    Failed,
    Stopped,
}

/// All `(username, tag)` rows of one tag, following `next_offset`
fn browse_tag<A: DeviantApi + ?Sized>(
    api: &A,
    config: &CrawlConfig,
    tag: &str,
    stop: &dyn Fn() -> bool,
) -> (Vec<TagDeviantRow>, TagEnd) {
    let mut rows = Vec::new();
    let mut offset = 0usize;
    loop {
        let body = match api.tag_page(tag, offset, TAG_PAGE_LIMIT) {
            Ok(body) => body,
            Err(e) if e.is_user_done() => return (rows, TagEnd::Done),
            Err(e) => {
                log::warn!("tag {tag}: stopped at offset {offset}: {e}");
                return (rows, TagEnd::Failed);
            }
        };
        let page = parse_tag_page(body, tag);
        rows.extend(page.rows);
        match page.next_offset.map(|n| n as usize) {
            Some(next) if next > offset => offset = next,
            _ => return (rows, TagEnd::Done),
        }
        pace(config.pacing.tag_page_delay);
        if stop() {
            return (rows, TagEnd::Stopped);
        }
    }
}

fn flush(
    sink: &mut CsvSink,
    pending: &mut Vec<TagDeviantRow>,
    known: &mut FxHashSet<String>,
    visited: &VisitedGuard,
    stats: &mut CrawlStats,
) -> anyhow::Result<()> {
    let rows = std::mem::take(pending);
    let n = sink
        .append_unique(rows, |r| r.username.as_str(), known)
        .with_context(|| format!("Failed to append to {}", sink.path().display()))?;
    stats.add_rows(Dataset::TagDeviants, n);
    visited.checkpoint();
    Ok(())
}

/// Browse each tag and record deviants not already in the output.
///
/// Entries like `cats?cursor=..` are reduced to their tag. Rows are
/// deduplicated on `username` and appended every [`TAG_FLUSH_EVERY`] tags.
/// A tag stopped part way is marked unfinished and browsed again next run.
pub fn crawl_tags<A: DeviantApi + ?Sized>(
    api: &A,
    config: &CrawlConfig,
    progress: &ProgressContext,
    tags: &[String],
) -> anyhow::Result<CrawlStats> {
    crawl_tags_until(api, config, progress, tags, &is_shutdown_requested)
}

pub(crate) fn crawl_tags_until<A: DeviantApi + ?Sized>(
    api: &A,
    config: &CrawlConfig,
    progress: &ProgressContext,
    tags: &[String],
    stop: &dyn Fn() -> bool,
) -> anyhow::Result<CrawlStats> {
    let mut stats = CrawlStats::new(CrawlKind::Tags);
    let out = config.csv(Dataset::TagDeviants);
    let mut visited = VisitedGuard::load(config, CrawlKind::Tags);
    visited.union_column(&out, "tag")?;
    let mut known = read_column(&out, Dataset::TagDeviants.deviant_column())
        .with_context(|| format!("Failed to read {}", out.display()))?;
    let mut sink = open_sink(config, Dataset::TagDeviants)?;

    let tags = normalize_names(tags.iter().map(|t| split_tag_cursor(t)));
    let todo: Vec<&String> = tags.iter().filter(|t| !visited.contains(t)).collect();
    stats.skipped = tags.len() - todo.len();
    log::info!(
        "tags: {} to browse, {} deviants known",
        todo.len(),
        known.len()
    );
    let bar = progress.deviant_bar("tags", todo.len() as u64);
    let mut pending = Vec::new();

    for (i, tag) in todo.iter().enumerate() {
        if i > 0 {
            pace(config.pacing.tag_delay);
        }
        if stop() {
            stats.interrupted = true;
            break;
        }
        if let Err(e) = api.refresh_if_stale() {
            log::warn!("Token refresh failed: {e}");
        }
        visited.insert(tag);
        bar.set_message((*tag).clone());

        let (rows, end) = browse_tag(api, config, tag, stop);
        log::debug!("tag {tag}: {} deviations", rows.len());
        pending.extend(rows);
        match end {
            TagEnd::Done => {}
            TagEnd::Failed => stats.failed += 1,
            TagEnd::Stopped => {
                visited.mark_unfinished(tag);
                stats.interrupted = true;
                break;
            }
        }
        stats.processed += 1;
        if stats.processed % TAG_FLUSH_EVERY == 0 {
            flush(&mut sink, &mut pending, &mut known, &visited, &mut stats)?;
        }
        bar.inc(1);
    }
    stats.interrupted |= stop();

    flush(&mut sink, &mut pending, &mut known, &visited, &mut stats)?;
    bar.finish_and_clear();
    stats.finish();
    Ok(stats)
}
