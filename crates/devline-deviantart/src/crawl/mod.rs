//! Resumable crawl runners
//!
//! Every runner follows the same shape: load its visited set, union it with
//! the names already present in its outputs, walk the remaining deviants in
//! order and persist the visited set after each one. Runners return
//! [`CrawlStats`]; a shutdown request ends the run early with
//! `stats.interrupted` set.

mod about;
mod download;
mod gallery;
mod merge;
mod metadata;
mod profiles;
mod random_walk;
mod snowball;
mod social;
mod tags;

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use anyhow::Context;
use devline_core::{VisitedSet, read_column};

use crate::config::CrawlConfig;
use crate::state::CrawlKind;

pub use about::{ABOUT_BATCH_SIZE, crawl_about};
pub use download::{PROCESSED_FLAG, download_gallery};
pub use gallery::{MAX_EMPTY_PAGES, crawl_gallery};
pub use merge::{MergeSummary, merge_csvs};
pub use metadata::crawl_metadata;
pub use profiles::crawl_profiles;
pub use random_walk::{RandomWalkOptions, random_walk};
pub use snowball::{DEFAULT_ROUNDS, snowball};
pub use social::{MAX_SOCIAL_PAGES, SocialLinks, SocialSinks, crawl_watchers_friends, fetch_social};
pub use tags::{TAG_FLUSH_EVERY, crawl_tags};

/// Visited set bound to its state file.
///
/// Saved on [`VisitedGuard::checkpoint`] and again when dropped, so error
/// exits keep the progress made so far.
#[derive(Debug)]
pub struct VisitedGuard {
    path: PathBuf,
    set: VisitedSet,
}

impl VisitedGuard {
    pub fn load(config: &CrawlConfig, kind: CrawlKind) -> Self {
        let path = config.state_path(kind);
        let set = VisitedSet::load(&path, kind.name());
        log::debug!("{kind}: {} names in {}", set.len(), path.display());
        Self { path, set }
    }

    /// Add the distinct values of `column` in an existing output
    pub fn union_column(&mut self, csv: &Path, column: &str) -> anyhow::Result<usize> {
        let names = read_column(csv, column)
            .with_context(|| format!("Failed to read {} from {}", column, csv.display()))?;
        let added = self.set.union(names);
        if added > 0 {
            log::info!("Recovered {added} visited names from {}", csv.display());
        }
        Ok(added)
    }

    /// Persist now; failures are logged, not fatal
    pub fn checkpoint(&self) {
        if let Err(e) = self.set.save(&self.path) {
            log::warn!("Failed to save {}: {e}", self.path.display());
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Deref for VisitedGuard {
    type Target = VisitedSet;

    fn deref(&self) -> &VisitedSet {
        &self.set
    }
}

impl DerefMut for VisitedGuard {
    fn deref_mut(&mut self) -> &mut VisitedSet {
        &mut self.set
    }
}

impl Drop for VisitedGuard {
    fn drop(&mut self) {
        self.checkpoint();
    }
}

/// Trim, drop empties and repeats, keep first-seen order
pub fn normalize_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = rustc_hash::FxHashSet::default();
    names
        .into_iter()
        .filter_map(|n| {
            let n = n.as_ref().trim();
            (!n.is_empty() && seen.insert(n.to_string())).then(|| n.to_string())
        })
        .collect()
}

/// Names from an input file: the `column` of a `.csv`/`.csv.gz` (sorted),
/// otherwise one name per line in file order. Normalized with [`normalize_names`].
pub fn read_names(path: &Path, column: &str) -> anyhow::Result<Vec<String>> {
    let is_csv = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(".csv") || n.ends_with(".csv.gz"));
    if is_csv {
        if !path.exists() {
            anyhow::bail!("{} does not exist", path.display());
        }
        let mut names: Vec<String> = read_column(path, column)
            .with_context(|| format!("Failed to read names from {}", path.display()))?
            .into_iter()
            .collect();
        names.sort();
        return Ok(normalize_names(names));
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read names from {}", path.display()))?;
    Ok(normalize_names(text.lines()))
}

/// Values grouped by key, keys in first-seen order
pub(crate) fn group_pairs(pairs: Vec<(String, String)>) -> Vec<(String, Vec<String>)> {
    let mut index: rustc_hash::FxHashMap<String, usize> = rustc_hash::FxHashMap::default();
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for (key, value) in pairs {
        match index.get(&key) {
            Some(&i) => groups[i].1.push(value),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![value]));
            }
        }
    }
    groups
}


#[cfg(test)]
pub(crate) mod test_util {
    use std::path::Path;

    use tempfile::TempDir;

    use crate::config::{CrawlConfig, Pacing};

    pub fn config(dir: &TempDir) -> CrawlConfig {
        let mut cfg = CrawlConfig::new(dir.path());
        cfg.pacing = Pacing::none();
        cfg
    }

    /// All lines of a plain CSV output
    pub fn lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn guard_saves_on_drop() {
        let dir = TempDir::new().unwrap();
        let cfg = test_util::config(&dir);
        {
            let mut guard = VisitedGuard::load(&cfg, CrawlKind::Profiles);
            guard.insert("amy");
        }
        let again = VisitedGuard::load(&cfg, CrawlKind::Profiles);
        assert!(again.contains("amy"));
        assert!(again.path().ends_with(".state/profiles.json"));
    }

    #[test]
    fn guard_unions_output_column() {
        let dir = TempDir::new().unwrap();
        let cfg = test_util::config(&dir);
        let csv = dir.path().join("profiles.csv");
        std::fs::write(&csv, "user,country\namy,DE\nzed,FR\namy,DE\n").unwrap();
        let mut guard = VisitedGuard::load(&cfg, CrawlKind::Profiles);
        assert_eq!(guard.union_column(&csv, "user").unwrap(), 2);
        assert_eq!(guard.union_column(&csv, "user").unwrap(), 0);
        assert!(guard.contains("zed"));
    }

    #[test]
    fn groups_keep_first_seen_order() {
        let groups = group_pairs(vec![
            ("zed".into(), "1".into()),
            ("amy".into(), "2".into()),
            ("zed".into(), "3".into()),
        ]);
        assert_eq!(
            groups[0],
            ("zed".to_string(), vec!["1".to_string(), "3".to_string()])
        );
        assert_eq!(groups[1].0, "amy");
    }

    #[test]
    fn names_from_csv_column_or_lines() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("artists.csv");
        std::fs::write(&csv, "user,country\nzed,DE\namy,FR\n").unwrap();
        assert_eq!(read_names(&csv, "user").unwrap(), vec!["amy", "zed"]);
        let txt = dir.path().join("seeds.txt");
        std::fs::write(&txt, "zed\n\n amy\nzed\n").unwrap();
        assert_eq!(read_names(&txt, "user").unwrap(), vec!["zed", "amy"]);
        assert!(read_names(&dir.path().join("missing.csv"), "user").is_err());
    }

    #[test]
    fn names_normalized_in_order() {
        assert_eq!(
            normalize_names([" zed", "amy", "", "zed", "bo "]),
            vec!["zed".to_string(), "amy".to_string(), "bo".to_string()]
        );
    }
}
