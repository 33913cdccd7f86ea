//! Crawler runtime configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use devline_core::DelayRange;
use serde::Deserialize;

use crate::auth::Credentials;
use crate::state::{CrawlKind, Dataset};

pub const DEFAULT_BASE_URL: &str = "https://www.deviantart.com/api/v1/oauth2/";
pub const DEFAULT_TOKEN_URL: &str = "https://www.deviantart.com/oauth2/token";

/// Where and how to reach the API
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub token_url: String,
    pub credentials: Credentials,
    pub max_retries: u32,
    pub token_ttl: Duration,
}

impl ApiSettings {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            credentials,
            max_retries: 5,
            token_ttl: Duration::from_secs(20 * 60),
        }
    }
}

/// Sleep windows between requests.
///
/// The first four are exposed in `[pacing]`; the rest have fixed defaults
/// but may be overridden under the same table.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Pacing {
    /// Between watcher/friend pages of one deviant
    pub page_delay: DelayRange,
    /// Between deviants in watcher/friend crawls
    pub deviant_delay: DelayRange,
    /// Per about-page scrape
    pub scrape_delay: DelayRange,
    /// Between profile requests
    pub profile_delay: DelayRange,
    pub gallery_page_delay: DelayRange,
    pub metadata_delay: DelayRange,
    pub tag_page_delay: DelayRange,
    pub tag_delay: DelayRange,
    pub download_delay: DelayRange,
    /// Between neighbour pages during a random walk
    pub walk_page_delay: DelayRange,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            page_delay: DelayRange::new(3.0, 7.0),
            deviant_delay: DelayRange::new(10.0, 20.0),
            scrape_delay: DelayRange::new(5.0, 15.0),
            profile_delay: DelayRange::fixed(3.0),
            gallery_page_delay: DelayRange::fixed(1.0),
            metadata_delay: DelayRange::new(1.0, 2.0),
            tag_page_delay: DelayRange::new(1.0, 3.0),
            tag_delay: DelayRange::new(2.0, 5.0),
            download_delay: DelayRange::new(1.0, 3.0),
            walk_page_delay: DelayRange::new(1.0, 3.0),
        }
    }
}

impl Pacing {
    /// No sleeping at all (tests, replaying fixtures)
    pub fn none() -> Self {
        let z = DelayRange::zero();
        Self {
            page_delay: z,
            deviant_delay: z,
            scrape_delay: z,
            profile_delay: z,
            gallery_page_delay: z,
            metadata_delay: z,
            tag_page_delay: z,
            tag_delay: z,
            download_delay: z,
            walk_page_delay: z,
        }
    }
}

/// Runtime configuration shared by all crawl runners
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub output_dir: PathBuf,
    pub gzip: bool,
    pub pacing: Pacing,
}

impl CrawlConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            gzip: false,
            pacing: Pacing::default(),
        }
    }

    /// Output CSV for a dataset
    pub fn csv(&self, dataset: Dataset) -> PathBuf {
        dataset.csv_path(&self.output_dir, self.gzip)
    }

    /// Visited-state file for a crawl
    pub fn state_path(&self, kind: CrawlKind) -> PathBuf {
        kind.state_path(&self.output_dir)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pacing_matches_crawl_etiquette() {
        let p = Pacing::default();
        assert_eq!(p.page_delay, DelayRange::new(3.0, 7.0));
        assert_eq!(p.deviant_delay, DelayRange::new(10.0, 20.0));
        assert_eq!(p.profile_delay, DelayRange::fixed(3.0));
    }

    #[test]
    fn pacing_partial_override() {
        let p: Pacing =
            serde_json::from_str(r#"{"page_delay": [1, 2], "profile_delay": 0}"#).unwrap();
        assert_eq!(p.page_delay, DelayRange::new(1.0, 2.0));
        assert_eq!(p.profile_delay, DelayRange::zero());
        assert_eq!(p.scrape_delay, DelayRange::new(5.0, 15.0));
    }

    #[test]
    fn crawl_config_paths() {
        let mut cfg = CrawlConfig::new("/tmp/devline-test-none");
        cfg.gzip = true;
        assert_eq!(
            cfg.csv(Dataset::Friends),
            PathBuf::from("/tmp/devline-test-none/friends.csv.gz")
        );
        assert_eq!(
            cfg.state_path(CrawlKind::Gallery),
            PathBuf::from("/tmp/devline-test-none/.state/gallery.json")
        );
    }
}
