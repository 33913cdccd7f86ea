//! Deviation metadata for collected galleries

use std::path::Path;

use anyhow::Context;
use devline_core::{ProgressContext, is_shutdown_requested, pace, read_column, read_column_pairs};
use rustc_hash::FxHashSet;

use crate::api::{DeviantApi, METADATA_BATCH};
use crate::config::CrawlConfig;
use crate::crawl::profiles::open_sink;
use crate::crawl::{VisitedGuard, group_pairs};
use crate::state::{CrawlKind, Dataset};
use crate::stats::CrawlStats;
use crate::transform::parse_metadata;

/// Metadata for every deviation in `gallery_csv` not yet in the metadata output.
///
/// Authors already in the output's `Author_Name` column (or the state file)
/// are skipped; ids already in `Devtn_Id` are never requested again. An
/// author stopped between batches is marked unfinished and resumed next run.
pub fn crawl_metadata<A: DeviantApi + ?Sized>(
    api: &A,
    config: &CrawlConfig,
    progress: &ProgressContext,
    gallery_csv: &Path,
) -> anyhow::Result<CrawlStats> {
    crawl_metadata_until(api, config, progress, gallery_csv, &is_shutdown_requested)
}

pub(crate) fn crawl_metadata_until<A: DeviantApi + ?Sized>(
    api: &A,
    config: &CrawlConfig,
    progress: &ProgressContext,
    gallery_csv: &Path,
    stop: &dyn Fn() -> bool,
) -> anyhow::Result<CrawlStats> {
    let mut stats = CrawlStats::new(CrawlKind::Metadata);
    let out = config.csv(Dataset::Metadata);
    let mut visited = VisitedGuard::load(config, CrawlKind::Metadata);
    visited.union_column(&out, Dataset::Metadata.deviant_column())?;
    let mut known_ids = read_column(&out, "Devtn_Id")
        .with_context(|| format!("Failed to read {}", out.display()))?;

    let pairs = read_column_pairs(
        gallery_csv,
        Dataset::Gallery.deviant_column(),
        "Deviation_id",
    )
    .with_context(|| format!("Failed to read {}", gallery_csv.display()))?;
    let groups = group_pairs(pairs);
    let mut sink = open_sink(config, Dataset::Metadata)?;
    log::info!(
        "metadata: {} authors in {}, {} known deviations",
        groups.len(),
        gallery_csv.display(),
        known_ids.len()
    );
    let bar = progress.deviant_bar("metadata", groups.len() as u64);
    let mut started = false;

    'authors: for (author, ids) in &groups {
        if visited.contains(author) {
            stats.skipped += 1;
            bar.inc(1);
            continue;
        }
        if stop() {
            stats.interrupted = true;
            break;
        }
        if let Err(e) = api.refresh_if_stale() {
            log::warn!("Token refresh failed: {e}");
        }
        visited.insert(author);
        visited.checkpoint();
        bar.set_message(author.clone());

        let mut seen = FxHashSet::default();
        let pending: Vec<String> = ids
            .iter()
            .filter(|id| !known_ids.contains(*id) && seen.insert(id.as_str()))
            .cloned()
            .collect();
        let mut author_failed = false;
        for batch in pending.chunks(METADATA_BATCH) {
            if started {
                pace(config.pacing.metadata_delay);
            }
            if stop() {
                visited.mark_unfinished(author);
                stats.interrupted = true;
                break 'authors;
            }
            started = true;
            match api.deviation_metadata(batch) {
                Ok(body) => {
                    let rows = parse_metadata(body);
                    let n = sink
                        .append_unique(rows, |r| r.id.as_str(), &mut known_ids)
                        .with_context(|| format!("Failed to append to {}", out.display()))?;
                    stats.add_rows(Dataset::Metadata, n);
                }
                Err(e) => {
                    log::warn!("{author}: metadata batch of {}: {e}", batch.len());
                    author_failed = true;
                }
            }
        }
        stats.processed += 1;
        if author_failed {
            stats.failed += 1;
        }
        bar.inc(1);
    }
    stats.interrupted |= stop();

    bar.finish_and_clear();
    stats.finish();
    Ok(stats)
}
