//! Image download for gallery rows

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use devline_core::{
    DelayRange, FetchError, ProgressContext, download_to_file, is_shutdown_requested, pace,
    read_column_pairs,
};

use crate::crawl::group_pairs;
use crate::state::{CrawlKind, Dataset};
use crate::stats::CrawlStats;

/// Marker written into an artist directory once all its images are stored
pub const PROCESSED_FLAG: &str = ".processed";

/// Directory name for an artist, without path separators
fn artist_dir(out_dir: &Path, artist: &str) -> PathBuf {
    let safe: String = artist
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    out_dir.join(safe.trim_start_matches('.'))
}

/// Last path segment of a URL, query and fragment removed
fn url_basename(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    path.rsplit('/').next().filter(|name| !name.is_empty())
}

/// Download every `Deviation_source` of `gallery_csv` into `out_dir/<artist>/`.
///
/// Existing files are kept. An artist whose images all arrived gets a
/// [`PROCESSED_FLAG`] file and is skipped on later runs.
pub fn download_gallery(
    gallery_csv: &Path,
    out_dir: &Path,
    delay: DelayRange,
    progress: &ProgressContext,
) -> anyhow::Result<CrawlStats> {
    download_gallery_with(
        gallery_csv,
        out_dir,
        delay,
        progress,
        download_to_file,
        &is_shutdown_requested,
    )
}

pub(crate) fn download_gallery_with<F>(
    gallery_csv: &Path,
    out_dir: &Path,
    delay: DelayRange,
    progress: &ProgressContext,
    mut fetch: F,
    stop: &dyn Fn() -> bool,
) -> anyhow::Result<CrawlStats>
where
    F: FnMut(&str, &Path) -> Result<u64, FetchError>,
{
    let mut stats = CrawlStats::new(CrawlKind::Download);
    let pairs = read_column_pairs(
        gallery_csv,
        Dataset::Gallery.deviant_column(),
        "Deviation_source",
    )
    .with_context(|| format!("Failed to read {}", gallery_csv.display()))?;
    let artists = group_pairs(pairs);
    log::info!(
        "download: {} artists from {}",
        artists.len(),
        gallery_csv.display()
    );
    let bar = progress.deviant_bar("download", artists.len() as u64);
    let mut started = false;

    'artists: for (artist, urls) in &artists {
        let dir = artist_dir(out_dir, artist);
        if dir.join(PROCESSED_FLAG).exists() {
            stats.skipped += 1;
            bar.inc(1);
            continue;
        }
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        bar.set_message(artist.clone());

        let mut errors = 0usize;
        for url in urls {
            let Some(name) = url_basename(url) else {
                log::debug!("{artist}: no file name in {url}");
                continue;
            };
            let dest = dir.join(name);
            if dest.exists() {
                continue;
            }
            if started {
                pace(delay);
            }
            if stop() {
                stats.interrupted = true;
                break 'artists;
            }
            started = true;
            match fetch(url, &dest) {
                Ok(bytes) => {
                    stats.files += 1;
                    stats.bytes += bytes;
                }
                Err(e) => {
                    log::warn!("{artist}: {url}: {e}");
                    errors += 1;
                }
            }
        }

        stats.processed += 1;
        if errors == 0 {
            fs::write(dir.join(PROCESSED_FLAG), "")
                .with_context(|| format!("Failed to flag {}", dir.display()))?;
        } else {
            stats.failed += 1;
        }
        bar.inc(1);
    }
    stats.interrupted |= stop();

    bar.finish_and_clear();
    stats.finish();
    Ok(stats)
}
