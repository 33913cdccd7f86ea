//! Snowball sampling over the watcher/friend graph

use std::path::Path;

use anyhow::Context;
use devline_core::{ProgressContext, is_shutdown_requested, pace, read_column};
use rustc_hash::FxHashSet;

use crate::api::DeviantApi;
use crate::config::CrawlConfig;
use crate::crawl::profiles::ProfileWriter;
use crate::crawl::social::{MAX_SOCIAL_PAGES, SocialSinks, fetch_social};
use crate::crawl::{VisitedGuard, read_names};
use crate::state::{CrawlKind, Dataset};
use crate::stats::CrawlStats;

pub const DEFAULT_ROUNDS: usize = 100;

/// Every name appearing in the social and profile outputs
fn known_names(config: &CrawlConfig) -> anyhow::Result<FxHashSet<String>> {
    let columns = [
        (Dataset::Watchers, "Watchers name"),
        (Dataset::Watchers, "Deviant"),
        (Dataset::Friends, "Friends name"),
        (Dataset::Friends, "Deviant"),
        (Dataset::Profiles, "user"),
    ];
    let mut names = FxHashSet::default();
    for (dataset, column) in columns {
        let path = config.csv(dataset);
        names.extend(
            read_column(&path, column)
                .with_context(|| format!("Failed to read {}", path.display()))?,
        );
    }
    Ok(names)
}

/// Expand from the seed files until no new names appear or `rounds` is hit.
///
/// Each round's frontier is (all known names) minus visited, sorted. New
/// deviants are marked visited before their profile, watchers and friends
/// are fetched, so a failing deviant is tried once.
pub fn snowball<A: DeviantApi + ?Sized>(
    api: &A,
    config: &CrawlConfig,
    progress: &ProgressContext,
    seed_files: &[impl AsRef<Path>],
    rounds: usize,
) -> anyhow::Result<CrawlStats> {
    snowball_until(
        api,
        config,
        progress,
        seed_files,
        rounds,
        &is_shutdown_requested,
    )
}

pub(crate) fn snowball_until<A: DeviantApi + ?Sized>(
    api: &A,
    config: &CrawlConfig,
    progress: &ProgressContext,
    seed_files: &[impl AsRef<Path>],
    rounds: usize,
    stop: &dyn Fn() -> bool,
) -> anyhow::Result<CrawlStats> {
    let mut stats = CrawlStats::new(CrawlKind::Snowball);
    let mut visited = VisitedGuard::load(config, CrawlKind::Snowball);
    // Deviants whose lists were already collected
    visited.union_column(&config.csv(Dataset::Watchers), "Deviant")?;
    visited.union_column(&config.csv(Dataset::Friends), "Deviant")?;

    let mut seeds = FxHashSet::default();
    for file in seed_files {
        seeds.extend(read_names(file.as_ref(), Dataset::Profiles.deviant_column())?);
    }
    log::info!("snowball: {} seeds, {} visited", seeds.len(), visited.len());

    let mut sinks = SocialSinks::open(config)?;
    let mut profiles = ProfileWriter::open(config)?;
    let bar = progress.deviant_bar("snowball", 0);
    let mut started = false;

    'rounds: for round in 1..=rounds {
        let known = known_names(config)?;
        let frontier = visited.difference(seeds.iter().chain(&known));
        if frontier.is_empty() {
            log::info!("snowball: no new deviants after {} rounds", round - 1);
            break;
        }
        log::info!("snowball round {round}: {} new deviants", frontier.len());
        bar.inc_length(frontier.len() as u64);

        for name in &frontier {
            if started {
                pace(config.pacing.deviant_delay);
            }
            if stop() {
                stats.interrupted = true;
                break 'rounds;
            }
            started = true;

            if let Err(e) = api.refresh_if_stale() {
                log::warn!("Token refresh failed: {e}");
            }
            visited.insert(name);
            visited.checkpoint();
            bar.set_message(format!("round {round}: {name}"));

            profiles.fetch_new(api, name, &mut stats)?;
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
                break 'rounds;
            }
            stats.processed += 1;
            if links.failed {
                stats.failed += 1;
            }
            bar.inc(1);
        }
    }
    stats.interrupted |= stop();

    bar.finish_and_clear();
    stats.finish();
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::crawl_profiles;
    use crate::crawl::fake::FakeApi;
    use crate::crawl::test_util::{config, lines};
    use serde_json::json;
    use tempfile::TempDir;

    fn page(names: &[&str]) -> serde_json::Value {
        let results: Vec<_> = names
            .iter()
            .map(|n| json!({"user": {"username": n}}))
            .collect();
        json!({"has_more": false, "results": results})
    }

    /// amy ← watched by bo; amy's friend is cy; bo and cy have no lists
    fn graph() -> FakeApi {
        FakeApi::new()
            .with_json("user/watchers/amy?offset=0&limit=50", page(&["bo"]))
            .with_json("user/friends/amy?offset=0&limit=50", page(&["cy"]))
            .with_json(
                "user/profile/amy?ext_collections=0&ext_galleries=0",
                json!({"user": {"userid": "U1"}}),
            )
    }

    #[test]
    fn expands_until_no_new_names() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let seeds = dir.path().join("seeds.txt");
        std::fs::write(&seeds, "amy\n").unwrap();

        let api = graph();
        let stats = snowball(&api, &cfg, &ProgressContext::hidden(), &[&seeds], 10).unwrap();
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.rows_for(Dataset::Watchers), 1);
        assert_eq!(stats.rows_for(Dataset::Profiles), 1);
        // round 2 visits the frontier in sorted order
        let profile_calls = api.calls_to("user/profile");
        assert_eq!(profile_calls.len(), 3);
        assert!(profile_calls[1].starts_with("user/profile/bo"));
        assert!(profile_calls[2].starts_with("user/profile/cy"));
    }

    #[test]
    fn stored_profiles_not_written_twice() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let seeds = dir.path().join("seeds.txt");
        std::fs::write(&seeds, "amy\n").unwrap();

        let api = graph();
        crawl_profiles(&api, &cfg, &ProgressContext::hidden(), &["amy".to_string()]).unwrap();
        api.calls.borrow_mut().clear();

        let stats = snowball(&api, &cfg, &ProgressContext::hidden(), &[&seeds], 1).unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.rows_for(Dataset::Profiles), 0);
        assert!(api.calls_to("user/profile/amy").is_empty());
        // amy's lists were still collected
        assert_eq!(api.calls_to("user/watchers/amy").len(), 1);

        let out = lines(&cfg.csv(Dataset::Profiles));
        assert_eq!(out.iter().filter(|l| l.starts_with("amy,")).count(), 1);
    }

    #[test]
    fn stop_during_last_deviant_reported() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let seeds = dir.path().join("seeds.txt");
        std::fs::write(&seeds, "amy\n").unwrap();

        let api = graph();
        let stop = || !api.calls_to("user/friends").is_empty();
        let progress = ProgressContext::hidden();
        let stats = snowball_until(&api, &cfg, &progress, &[&seeds], 1, &stop).unwrap();
        assert_eq!(stats.processed, 1);
        assert!(stats.interrupted);
    }

    #[test]
    fn round_limit_stops_expansion() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let seeds = dir.path().join("seeds.txt");
        std::fs::write(&seeds, "amy\n").unwrap();

        let stats = snowball(&graph(), &cfg, &ProgressContext::hidden(), &[&seeds], 1).unwrap();
        assert_eq!(stats.processed, 1);

        // resuming picks up the frontier left by the first run
        let api = graph();
        let stats = snowball(&api, &cfg, &ProgressContext::hidden(), &[&seeds], 1).unwrap();
        assert_eq!(stats.processed, 2);
        assert!(api.calls_to("user/profile/amy").is_empty());
    }
}
