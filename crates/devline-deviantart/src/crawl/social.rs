//! Watcher and friend lists

use std::path::Path;

use anyhow::Context;
use devline_core::{
    CsvSink, DelayRange, FetchError, ProgressContext, is_shutdown_requested, pace,
    read_column_pairs,
};
use rustc_hash::FxHashSet;

use crate::api::DeviantApi;
use crate::config::CrawlConfig;
use crate::crawl::{VisitedGuard, normalize_names};
use crate::state::{CrawlKind, Dataset};
use crate::stats::CrawlStats;
use crate::transform::{FriendRow, WatcherRow, parse_friends, parse_watchers};

/// Pages fetched per list in a watchers/friends crawl
pub const MAX_SOCIAL_PAGES: usize = 10;

/// Dedup key of one watcher or friend row
fn edge_key(deviant: &str, name: &str) -> String {
    format!("{deviant}\u{1f}{name}")
}

/// `(Deviant, name)` edges already in a social output
fn known_edges(path: &Path, name_column: &str) -> anyhow::Result<FxHashSet<String>> {
    let pairs = read_column_pairs(path, "Deviant", name_column)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(pairs
        .iter()
        .map(|(deviant, name)| edge_key(deviant, name))
        .collect())
}

/// Append handles for the two social outputs.
///
/// Rows are deduplicated on `(Deviant, name)` against everything already
/// written, so a deviant paged again after a stop adds only new edges.
#[derive(Debug)]
pub struct SocialSinks {
    pub watchers: CsvSink,
    pub friends: CsvSink,
    known_watchers: FxHashSet<String>,
    known_friends: FxHashSet<String>,
}

impl SocialSinks {
    pub fn open(config: &CrawlConfig) -> anyhow::Result<Self> {
        let open = |dataset: Dataset| {
            let path = config.csv(dataset);
            CsvSink::open(&path).with_context(|| format!("Failed to open {}", path.display()))
        };
        Ok(Self {
            known_watchers: known_edges(&config.csv(Dataset::Watchers), "Watchers name")?,
            known_friends: known_edges(&config.csv(Dataset::Friends), "Friends name")?,
            watchers: open(Dataset::Watchers)?,
            friends: open(Dataset::Friends)?,
        })
    }

    fn append_watchers(&mut self, mut rows: Vec<WatcherRow>) -> anyhow::Result<usize> {
        let known = &mut self.known_watchers;
        rows.retain(|r| known.insert(edge_key(&r.deviant, &r.name)));
        self.watchers
            .append(&rows)
            .with_context(|| format!("Failed to append to {}", self.watchers.path().display()))
    }

    fn append_friends(&mut self, mut rows: Vec<FriendRow>) -> anyhow::Result<usize> {
        let known = &mut self.known_friends;
        rows.retain(|r| known.insert(edge_key(&r.deviant, &r.name)));
        self.friends
            .append(&rows)
            .with_context(|| format!("Failed to append to {}", self.friends.path().display()))
    }
}

/// Names seen on one deviant's watcher and friend lists
#[derive(Debug, Default)]
pub struct SocialLinks {
    pub watchers: Vec<String>,
    pub friends: Vec<String>,
    /// A list ended on an error other than "user done"
    pub failed: bool,
    /// The stop check fired before both lists ended
    pub stopped: bool,
}

impl SocialLinks {
    /// Watchers then friends, without repeats
    pub fn neighbours(&self) -> Vec<String> {
        normalize_names(self.watchers.iter().chain(&self.friends))
    }
}

/// Record why a list ended
fn end_of_list(deviant: &str, list: &str, err: &FetchError, links: &mut SocialLinks) {
    if err.is_user_done() {
        log::debug!("{deviant}: {list} done");
    } else {
        log::warn!("{deviant}: {list} stopped: {err}");
        links.failed = true;
    }
}

/// Page a deviant's watchers and friends together, appending rows as they come.
///
/// Each list stops on `has_more = false` or any error; 404 counts as a normal
/// end. Sleeps `page_delay` between pages; when `stop` fires first the links
/// come back with `stopped` set.
pub fn fetch_social<A: DeviantApi + ?Sized>(
    api: &A,
    deviant: &str,
    max_pages: usize,
    page_delay: DelayRange,
    sinks: &mut SocialSinks,
    stats: &mut CrawlStats,
    stop: &dyn Fn() -> bool,
) -> anyhow::Result<SocialLinks> {
    let mut links = SocialLinks::default();
    let (mut watchers_open, mut friends_open) = (true, true);

    for page in 0..max_pages {
        if !watchers_open && !friends_open {
            break;
        }
        if page > 0 {
            pace(page_delay);
        }
        if stop() {
            links.stopped = true;
            break;
        }

        if watchers_open {
            match api.watchers_page(deviant, page) {
                Ok(body) => {
                    let (more, rows) = parse_watchers(body, deviant);
                    links.watchers.extend(rows.iter().map(|r| r.name.clone()));
                    stats.add_rows(Dataset::Watchers, sinks.append_watchers(rows)?);
                    watchers_open = more;
                }
                Err(e) => {
                    end_of_list(deviant, "watchers", &e, &mut links);
                    watchers_open = false;
                }
            }
        }

        if friends_open {
            match api.friends_page(deviant, page) {
                Ok(body) => {
                    let (more, rows) = parse_friends(body, deviant);
                    links.friends.extend(rows.iter().map(|r| r.name.clone()));
                    stats.add_rows(Dataset::Friends, sinks.append_friends(rows)?);
                    friends_open = more;
                }
                Err(e) => {
                    end_of_list(deviant, "friends", &e, &mut links);
                    friends_open = false;
                }
            }
        }
    }

    log::debug!(
        "{deviant}: {} watchers, {} friends",
        links.watchers.len(),
        links.friends.len()
    );
    Ok(links)
}

/// Watchers and friends for each unvisited name.
///
/// Visited = state file ∪ `Deviant` column of both outputs. A deviant stopped
/// between pages is marked unfinished and paged again next run.
pub fn crawl_watchers_friends<A: DeviantApi + ?Sized>(
    api: &A,
    config: &CrawlConfig,
    progress: &ProgressContext,
    names: &[String],
) -> anyhow::Result<CrawlStats> {
    crawl_watchers_friends_until(api, config, progress, names, &is_shutdown_requested)
}

pub(crate) fn crawl_watchers_friends_until<A: DeviantApi + ?Sized>(
    api: &A,
    config: &CrawlConfig,
    progress: &ProgressContext,
    names: &[String],
    stop: &dyn Fn() -> bool,
) -> anyhow::Result<CrawlStats> {
    let mut stats = CrawlStats::new(CrawlKind::WatchersFriends);
    let mut visited = VisitedGuard::load(config, CrawlKind::WatchersFriends);
    visited.union_column(
        &config.csv(Dataset::Watchers),
        Dataset::Watchers.deviant_column(),
    )?;
    visited.union_column(
        &config.csv(Dataset::Friends),
        Dataset::Friends.deviant_column(),
    )?;
    let mut sinks = SocialSinks::open(config)?;

    let names = normalize_names(names);
    log::info!(
        "watchers-friends: {} names, {} already visited",
        names.len(),
        names.iter().filter(|n| visited.contains(n)).count()
    );
    let bar = progress.deviant_bar("watchers-friends", names.len() as u64);
    let mut started = false;

    for name in &names {
        if visited.contains(name) {
            stats.skipped += 1;
            bar.inc(1);
            continue;
        }
        if started {
            pace(config.pacing.deviant_delay);
        }
        if stop() {
            stats.interrupted = true;
            break;
        }
        started = true;

        if let Err(e) = api.refresh_if_stale() {
            log::warn!("Token refresh failed: {e}");
        }
        visited.insert(name);
        visited.checkpoint();
        bar.set_message(name.clone());

        let links = fetch_social(
            api,
            name,
            MAX_SOCIAL_PAGES,
            config.pacing.page_delay,
            &mut sinks,
            &mut stats,
            stop,
        )?;
        if links.stopped {
            visited.mark_unfinished(name);
            stats.interrupted = true;
            break;
        }
        stats.processed += 1;
        if links.failed {
            stats.failed += 1;
        }
        bar.inc(1);
    }
    stats.interrupted |= stop();

    bar.finish_and_clear();
    stats.finish();
    Ok(stats)
}
