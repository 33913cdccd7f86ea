//! Output datasets and crawl kinds

use std::path::{Path, PathBuf};

/// CSV outputs written by the crawlers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dataset {
    Profiles,
    Watchers,
    Friends,
    Gallery,
    Metadata,
    About,
    TagDeviants,
}

impl Dataset {
    /// Filename prefix for output files
    pub fn file_prefix(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Watchers => "watchers",
            Self::Friends => "friends",
            Self::Gallery => "gallery",
            Self::Metadata => "metadata",
            Self::About => "about",
            Self::TagDeviants => "tag_deviants",
        }
    }

    /// Column naming the deviant a row was collected for
    pub fn deviant_column(self) -> &'static str {
        match self {
            Self::Profiles => "user",
            Self::Watchers | Self::Friends => "Deviant",
            Self::Gallery => "Author_name",
            Self::Metadata => "Author_Name",
            Self::About | Self::TagDeviants => "username",
        }
    }

    /// `<dir>/<prefix>.csv`, or `.csv.gz` when `gzip` is set.
    ///
    /// If only the other variant exists on disk it is used instead, so a
    /// change of the gzip setting keeps appending to the existing file.
    pub fn csv_path(self, dir: &Path, gzip: bool) -> PathBuf {
        let plain = dir.join(format!("{}.csv", self.file_prefix()));
        let gz = dir.join(format!("{}.csv.gz", self.file_prefix()));
        let (preferred, other) = if gzip { (gz, plain) } else { (plain, gz) };
        if !preferred.exists() && other.exists() {
            other
        } else {
            preferred
        }
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_prefix())
    }
}

/// Crawl runners; each API runner owns one visited-state file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrawlKind {
    Profiles,
    WatchersFriends,
    Snowball,
    RandomWalk,
    Gallery,
    Metadata,
    About,
    Tags,
    /// Image download; progress is kept in per-artist flags
    Download,
}

impl CrawlKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::WatchersFriends => "watchers-friends",
            Self::Snowball => "snowball",
            Self::RandomWalk => "random-walk",
            Self::Gallery => "gallery",
            Self::Metadata => "metadata",
            Self::About => "about",
            Self::Tags => "tags",
            Self::Download => "download",
        }
    }

    /// `<dir>/.state/<name>.json`
    pub fn state_path(self, dir: &Path) -> PathBuf {
        dir.join(".state").join(format!("{}.json", self.name()))
    }
}

impl std::fmt::Display for CrawlKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn csv_path_prefers_configured_variant() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            Dataset::Gallery.csv_path(dir.path(), false),
            dir.path().join("gallery.csv")
        );
        assert_eq!(
            Dataset::Gallery.csv_path(dir.path(), true),
            dir.path().join("gallery.csv.gz")
        );
    }

    #[test]
    fn csv_path_falls_back_to_existing_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("watchers.csv"), "x\n").unwrap();
        assert_eq!(
            Dataset::Watchers.csv_path(dir.path(), true),
            dir.path().join("watchers.csv")
        );
    }

    #[test]
    fn state_paths_are_distinct() {
        let dir = Path::new("/data");
        let kinds = [
            CrawlKind::Profiles,
            CrawlKind::WatchersFriends,
            CrawlKind::Snowball,
            CrawlKind::RandomWalk,
            CrawlKind::Gallery,
            CrawlKind::Metadata,
            CrawlKind::About,
            CrawlKind::Tags,
            CrawlKind::Download,
        ];
        let paths: rustc_hash::FxHashSet<_> = kinds.iter().map(|k| k.state_path(dir)).collect();
        assert_eq!(paths.len(), kinds.len());
        assert_eq!(
            CrawlKind::WatchersFriends.state_path(dir),
            Path::new("/data/.state/watchers-friends.json")
        );
    }

    #[test]
    fn deviant_columns_match_legacy_headers() {
        assert_eq!(Dataset::Profiles.deviant_column(), "user");
        assert_eq!(Dataset::Friends.deviant_column(), "Deviant");
        assert_eq!(Dataset::Metadata.deviant_column(), "Author_Name");
    }
}
