//! Persisted set of already-processed names
//!
//! Each crawl keeps one JSON state file. On start the runner loads it and
//! unions in the names found in its existing output, so progress survives
//! both a lost state file and a lost output file.

use std::fs;
use std::io;
use std::path::Path;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct StateFile {
    dataset: String,
    updated_at: String,
    names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    unfinished: Vec<String>,
}

#[derive(Debug, Default, Clone)]
pub struct VisitedSet {
    dataset: String,
    names: FxHashSet<String>,
    /// Stopped part way; output columns must not mark these visited
    unfinished: FxHashSet<String>,
}

impl VisitedSet {
    pub fn new(dataset: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            names: FxHashSet::default(),
            unfinished: FxHashSet::default(),
        }
    }

    /// Load from `path`. Missing, empty or unreadable files give an empty set.
    pub fn load(path: &Path, dataset: &str) -> Self {
        let mut set = Self::new(dataset);
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return set,
            Err(e) => {
                log::warn!("Cannot read {}: {e}, starting fresh", path.display());
                return set;
            }
        };
        if text.trim().is_empty() {
            return set;
        }
        match serde_json::from_str::<StateFile>(&text) {
            Ok(state) => {
                if state.dataset != dataset {
                    log::warn!(
                        "{} belongs to '{}', expected '{dataset}'",
                        path.display(),
                        state.dataset
                    );
                }
                set.names.extend(state.names);
                set.unfinished.extend(state.unfinished);
                log::debug!(
                    "Loaded {} visited names from {} (saved {})",
                    set.names.len(),
                    path.display(),
                    state.updated_at
                );
            }
            Err(e) => {
                log::warn!("Corrupt state file {}: {e}, starting fresh", path.display());
            }
        }
        set
    }

    /// Write the set via tmp → rename, names sorted.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut names: Vec<String> = self.names.iter().cloned().collect();
        names.sort_unstable();
        let mut unfinished: Vec<String> = self.unfinished.iter().cloned().collect();
        unfinished.sort_unstable();
        let state = StateFile {
            dataset: self.dataset.clone(),
            updated_at: chrono::Utc::now().to_rfc3339(),
            names,
            unfinished,
        };
        let json = serde_json::to_string_pretty(&state).map_err(io::Error::other)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)
    }

    /// Add names recovered from output files. Returns how many were new.
    ///
    /// Names marked unfinished are left out.
    pub fn union<I, S>(&mut self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let before = self.names.len();
        let unfinished = &self.unfinished;
        self.names.extend(
            names
                .into_iter()
                .map(Into::into)
                .filter(|n| !unfinished.contains(n)),
        );
        self.names.len() - before
    }

    /// Mark as visited; `false` if it already was.
    pub fn insert(&mut self, name: &str) -> bool {
        self.unfinished.remove(name);
        if self.names.contains(name) {
            return false;
        }
        self.names.insert(name.to_string())
    }

    /// Undo the visit of a deviant whose crawl was stopped part way, so the
    /// next run picks it up again.
    pub fn mark_unfinished(&mut self, name: &str) {
        self.names.remove(name);
        self.unfinished.insert(name.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Candidates not yet visited, sorted and deduplicated
    pub fn difference<I, S>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = candidates
            .into_iter()
            .filter_map(|c| {
                let c = c.as_ref().trim();
                (!c.is_empty() && !self.names.contains(c)).then(|| c.to_string())
            })
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}
