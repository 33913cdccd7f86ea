//! Random walks seeded from daily deviations

use chrono::{Days, NaiveDate};
use devline_core::{ProgressContext, is_shutdown_requested, pace};
use rand::seq::SliceRandom;

use crate::api::DeviantApi;
use crate::config::CrawlConfig;
use crate::crawl::profiles::ProfileWriter;
use crate::crawl::social::{SocialSinks, fetch_social};
use crate::crawl::{VisitedGuard, normalize_names};
use crate::state::{CrawlKind, Dataset};
use crate::stats::CrawlStats;
use crate::transform::daily_authors;

#[derive(Debug, Clone)]
pub struct RandomWalkOptions {
    pub start: NaiveDate,
    /// Inclusive
    pub end: NaiveDate,
    /// Days between sampled dates
    pub day_step: u64,
    /// Authors sampled from each day's daily deviations
    pub seeds_per_day: usize,
    /// Hops per walk, the seed included
    pub walk_length: usize,
    /// Watcher/friend pages per visited deviant
    pub pages: usize,
}

impl RandomWalkOptions {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            day_step: 1,
            seeds_per_day: 3,
            walk_length: 10,
            pages: 5,
        }
    }
}

/// Walk the graph from authors of each day's daily deviations.
///
/// At every hop the deviant's profile and first `pages` pages of watchers
/// and friends are stored, then the walk moves to a uniformly random
/// unvisited neighbour, ending when there is none.
pub fn random_walk<A: DeviantApi + ?Sized>(
    api: &A,
    config: &CrawlConfig,
    progress: &ProgressContext,
    options: &RandomWalkOptions,
) -> anyhow::Result<CrawlStats> {
    random_walk_until(api, config, progress, options, &is_shutdown_requested)
}

pub(crate) fn random_walk_until<A: DeviantApi + ?Sized>(
    api: &A,
    config: &CrawlConfig,
    progress: &ProgressContext,
    options: &RandomWalkOptions,
    stop: &dyn Fn() -> bool,
) -> anyhow::Result<CrawlStats> {
    let mut stats = CrawlStats::new(CrawlKind::RandomWalk);
    let mut visited = VisitedGuard::load(config, CrawlKind::RandomWalk);
    visited.union_column(&config.csv(Dataset::Watchers), "Deviant")?;
    visited.union_column(&config.csv(Dataset::Friends), "Deviant")?;
    let mut sinks = SocialSinks::open(config)?;
    let mut profiles = ProfileWriter::open(config)?;

    let mut rng = rand::thread_rng();
    let step = Days::new(options.day_step.max(1));
    let line = progress.stage_line("walk");
    let mut started = false;
    let mut date = options.start;

    'dates: while date <= options.end {
        if stop() {
            stats.interrupted = true;
            break;
        }
        line.set_message(format!("{date}"));
        let authors = match api.daily_deviations(date) {
            Ok(body) => normalize_names(daily_authors(&body)),
            Err(e) => {
                log::warn!("{date}: daily deviations: {e}");
                Vec::new()
            }
        };
        let candidates: Vec<String> = authors
            .into_iter()
            .filter(|a| !visited.contains(a))
            .collect();
        let seeds: Vec<String> = candidates
            .choose_multiple(&mut rng, options.seeds_per_day)
            .cloned()
            .collect();
        log::info!(
            "{date}: {} seeds from {} unvisited authors",
            seeds.len(),
            candidates.len()
        );

        for seed in seeds {
            let mut current = Some(seed);
            let mut hops = 0;
            while let Some(name) = current.take() {
                if hops >= options.walk_length || visited.contains(&name) {
                    break;
                }
                if started {
                    pace(config.pacing.deviant_delay);
                }
                if stop() {
                    stats.interrupted = true;
                    break 'dates;
                }
                started = true;

                if let Err(e) = api.refresh_if_stale() {
                    log::warn!("Token refresh failed: {e}");
                }
                visited.insert(&name);
                visited.checkpoint();
                line.set_message(format!("{date} hop {hops}: {name}"));

                profiles.fetch_new(api, &name, &mut stats)?;
                let links = fetch_social(
                    api,
                    &name,
                    options.pages,
                    config.pacing.walk_page_delay,
                    &mut sinks,
                    &mut stats,
                    stop,
                )?;
                if links.stopped {
                    visited.mark_unfinished(&name);
                    stats.interrupted = true;
                    break 'dates;
                }
                stats.processed += 1;
                if links.failed {
                    stats.failed += 1;
                }
                hops += 1;

                let unvisited: Vec<String> = links
                    .neighbours()
                    .into_iter()
                    .filter(|n| !visited.contains(n))
                    .collect();
                current = unvisited.choose(&mut rng).cloned();
                if current.is_none() {
                    log::debug!("{name}: walk ends, no unvisited neighbours");
                }
            }
        }

        match date.checked_add_days(step) {
            Some(next) => date = next,
            None => break,
        }
    }
    stats.interrupted |= stop();

    line.finish_and_clear();
    stats.finish();
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::fake::FakeApi;
    use crate::crawl::test_util::config;
    use serde_json::json;
    use tempfile::TempDir;

    fn page(names: &[&str]) -> serde_json::Value {
        let results: Vec<_> = names
            .iter()
            .map(|n| json!({"user": {"username": n}}))
            .collect();
        json!({"has_more": false, "results": results})
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    /// Chain amy → bo → cy, cy's only neighbour is amy
    fn chain() -> FakeApi {
        FakeApi::new()
            .with_json(
                "browse/dailydeviations?date=2024-03-01",
                json!({"results": [{"author": {"username": "amy"}}]}),
            )
            .with_json("user/watchers/amy?offset=0&limit=50", page(&["bo"]))
            .with_json("user/friends/bo?offset=0&limit=50", page(&["cy"]))
            .with_json("user/watchers/cy?offset=0&limit=50", page(&["amy"]))
    }

    #[test]
    fn walk_follows_unvisited_neighbours() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let mut opts = RandomWalkOptions::new(day(1), day(1));
        opts.seeds_per_day = 5;
        let api = chain();
        let stats = random_walk(&api, &cfg, &ProgressContext::hidden(), &opts).unwrap();
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.rows_for(Dataset::Watchers), 2);
        assert_eq!(stats.rows_for(Dataset::Friends), 1);
    }

    #[test]
    fn walk_length_caps_hops() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let mut opts = RandomWalkOptions::new(day(1), day(1));
        opts.walk_length = 2;
        let stats = random_walk(&chain(), &cfg, &ProgressContext::hidden(), &opts).unwrap();
        assert_eq!(stats.processed, 2);
    }

    #[test]
    fn stop_during_last_hop_reported() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let mut opts = RandomWalkOptions::new(day(1), day(1));
        opts.walk_length = 1;
        let api = chain();
        let stop = || !api.calls_to("user/watchers").is_empty();
        let stats =
            random_walk_until(&api, &cfg, &ProgressContext::hidden(), &opts, &stop).unwrap();
        assert_eq!(stats.processed, 1);
        assert!(stats.interrupted);
    }

    #[test]
    fn dates_stepped_inclusively() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let mut opts = RandomWalkOptions::new(day(1), day(7));
        opts.day_step = 3;
        let api = FakeApi::new();
        let stats = random_walk(&api, &cfg, &ProgressContext::hidden(), &opts).unwrap();
        assert_eq!(stats.processed, 0);
        assert_eq!(
            api.calls_to("browse/dailydeviations"),
            vec![
                "browse/dailydeviations?date=2024-03-01".to_string(),
                "browse/dailydeviations?date=2024-03-04".to_string(),
                "browse/dailydeviations?date=2024-03-07".to_string(),
            ]
        );
    }

    #[test]
    fn pages_per_deviant_limited() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let mut api = FakeApi::new().with_json(
            "browse/dailydeviations?date=2024-03-01",
            json!({"results": [{"author": {"username": "amy"}}]}),
        );
        for p in 0..10 {
            let name = format!("w{p}");
            api = api.with_json(
                &format!("user/watchers/amy?offset={}&limit=50", p * 50),
                json!({"has_more": true, "results": [{"user": {"username": name}}]}),
            );
        }
        let mut opts = RandomWalkOptions::new(day(1), day(1));
        opts.walk_length = 1;
        random_walk(&api, &cfg, &ProgressContext::hidden(), &opts).unwrap();
        assert_eq!(api.calls_to("user/watchers/amy").len(), 5);
    }
}
