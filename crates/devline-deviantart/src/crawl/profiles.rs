//! User profiles

use anyhow::Context;
use devline_core::{CsvSink, ProgressContext, is_shutdown_requested, pace, read_column};
use rustc_hash::FxHashSet;

use crate::api::DeviantApi;
use crate::config::CrawlConfig;
use crate::crawl::{VisitedGuard, normalize_names};
use crate::state::{CrawlKind, Dataset};
use crate::stats::CrawlStats;
use crate::transform::{ProfileRow, parse_profile};

/// Fetch one profile; errors of any kind skip the deviant.
pub(crate) fn fetch_profile<A: DeviantApi + ?Sized>(api: &A, username: &str) -> Option<ProfileRow> {
    match api.user_profile(username) {
        Ok(body) => parse_profile(username, body),
        Err(e) => {
            log::warn!("{username}: profile: {e}");
            None
        }
    }
}

pub(crate) fn open_sink(config: &CrawlConfig, dataset: Dataset) -> anyhow::Result<CsvSink> {
    let path = config.csv(dataset);
    CsvSink::open(&path).with_context(|| format!("Failed to open {}", path.display()))
}

/// Profile output shared by the graph crawlers, keyed on `user`.
///
/// A deviant whose profile is already stored is not fetched again, even
/// when its watcher and friend lists are still to be collected.
pub(crate) struct ProfileWriter {
    sink: CsvSink,
    known: FxHashSet<String>,
}

impl ProfileWriter {
    pub fn open(config: &CrawlConfig) -> anyhow::Result<Self> {
        let path = config.csv(Dataset::Profiles);
        let known = read_column(&path, Dataset::Profiles.deviant_column())
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self {
            sink: open_sink(config, Dataset::Profiles)?,
            known,
        })
    }

    /// Fetch and append `name`'s profile unless it is stored already
    pub fn fetch_new<A: DeviantApi + ?Sized>(
        &mut self,
        api: &A,
        name: &str,
        stats: &mut CrawlStats,
    ) -> anyhow::Result<()> {
        if self.known.contains(name) {
            return Ok(());
        }
        let Some(row) = fetch_profile(api, name) else {
            log::debug!("{name}: no profile");
            return Ok(());
        };
        let n = self
            .sink
            .append_unique(vec![row], |r| r.user.as_str(), &mut self.known)
            .with_context(|| format!("Failed to append to {}", self.sink.path().display()))?;
        stats.add_rows(Dataset::Profiles, n);
        Ok(())
    }
}

/// Profiles for each name not yet in the profile output.
///
/// Visited = state file ∪ `user` column. Sleeps `profile_delay` between requests.
pub fn crawl_profiles<A: DeviantApi + ?Sized>(
    api: &A,
    config: &CrawlConfig,
    progress: &ProgressContext,
    names: &[String],
) -> anyhow::Result<CrawlStats> {
    crawl_profiles_until(api, config, progress, names, &is_shutdown_requested)
}

pub(crate) fn crawl_profiles_until<A: DeviantApi + ?Sized>(
    api: &A,
    config: &CrawlConfig,
    progress: &ProgressContext,
    names: &[String],
    stop: &dyn Fn() -> bool,
) -> anyhow::Result<CrawlStats> {
    let mut stats = CrawlStats::new(CrawlKind::Profiles);
    let out = config.csv(Dataset::Profiles);
    let mut visited = VisitedGuard::load(config, CrawlKind::Profiles);
    visited.union_column(&out, Dataset::Profiles.deviant_column())?;
    let mut sink = open_sink(config, Dataset::Profiles)?;

    let names = normalize_names(names);
    let todo = visited.difference(&names);
    stats.skipped = names.len() - todo.len();
    log::info!(
        "profiles: {} to fetch, {} already done",
        todo.len(),
        stats.skipped
    );
    let bar = progress.deviant_bar("profiles", todo.len() as u64);

    for (i, name) in todo.iter().enumerate() {
        if i > 0 {
            pace(config.pacing.profile_delay);
        }
        if stop() {
            stats.interrupted = true;
            break;
        }
        if let Err(e) = api.refresh_if_stale() {
            log::warn!("Token refresh failed: {e}");
        }
        visited.insert(name);
        bar.set_message(name.clone());

        match fetch_profile(api, name) {
            Some(row) => {
                let n = sink
                    .append(std::slice::from_ref(&row))
                    .with_context(|| format!("Failed to append to {}", out.display()))?;
                stats.add_rows(Dataset::Profiles, n);
            }
            None => stats.failed += 1,
        }
        stats.processed += 1;
        visited.checkpoint();
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

    fn profile(id: &str) -> serde_json::Value {
        json!({"user": {"userid": id, "type": "regular"}, "country": "Germany",
               "stats": {"user_deviations": 4}})
    }

    #[test]
    fn error_bodies_do_not_write_rows() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let api = FakeApi::new()
            .with_json(
                "user/profile/amy?ext_collections=0&ext_galleries=0",
                profile("U1"),
            )
            .with_json(
                "user/profile/ghost?ext_collections=0&ext_galleries=0",
                json!({"error": "invalid_request", "error_description": "User not found."}),
            );
        let names = vec!["amy".to_string(), "ghost".to_string()];
        let stats = crawl_profiles(&api, &cfg, &ProgressContext::hidden(), &names).unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.rows_for(Dataset::Profiles), 1);

        let out = lines(&cfg.csv(Dataset::Profiles));
        assert_eq!(out.len(), 2);
        assert!(out[1].starts_with("amy,U1,regular,"));
    }

    #[test]
    fn stop_before_next_profile_keeps_rest() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let api = FakeApi::new()
            .with_json(
                "user/profile/amy?ext_collections=0&ext_galleries=0",
                profile("U1"),
            )
            .with_json(
                "user/profile/bo?ext_collections=0&ext_galleries=0",
                profile("U2"),
            );
        let names = vec!["amy".to_string(), "bo".to_string()];

        let stop = || !api.calls_to("user/profile").is_empty();
        let stats =
            crawl_profiles_until(&api, &cfg, &ProgressContext::hidden(), &names, &stop).unwrap();
        assert!(stats.interrupted);
        assert_eq!(stats.processed, 1);

        let stats = crawl_profiles(&api, &cfg, &ProgressContext::hidden(), &names).unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.processed, 1);
        assert_eq!(lines(&cfg.csv(Dataset::Profiles)).len(), 3);
    }

    #[test]
    fn stop_during_last_profile_reported() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let api = FakeApi::new().with_json(
            "user/profile/amy?ext_collections=0&ext_galleries=0",
            profile("U1"),
        );
        let stop = || !api.calls_to("user/profile").is_empty();
        let names = vec!["amy".to_string()];
        let stats =
            crawl_profiles_until(&api, &cfg, &ProgressContext::hidden(), &names, &stop).unwrap();
        assert_eq!(stats.processed, 1);
        assert!(stats.interrupted);
    }

    #[test]
    fn existing_users_not_refetched() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let api = FakeApi::new().with_json(
            "user/profile/zed?ext_collections=0&ext_galleries=0",
            profile("U2"),
        );
        let names = vec!["amy".to_string(), "zed".to_string()];
        crawl_profiles(&api, &cfg, &ProgressContext::hidden(), &names[..1]).unwrap();
        api.calls.borrow_mut().clear();

        let stats = crawl_profiles(&api, &cfg, &ProgressContext::hidden(), &names).unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.processed, 1);
        assert_eq!(
            *api.calls.borrow(),
            vec!["user/profile/zed?ext_collections=0&ext_galleries=0".to_string()]
        );
        // header written once across both runs
        let out = lines(&cfg.csv(Dataset::Profiles));
        assert_eq!(out.iter().filter(|l| l.starts_with("user,")).count(), 1);
    }
}
