//! Crawl subcommand - resumable DeviantArt crawlers

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Subcommand};

use devline_core::SharedProgress;
use devline_deviantart::crawl::{
    self, ABOUT_BATCH_SIZE, DEFAULT_ROUNDS, RandomWalkOptions, normalize_names, read_names,
};
use devline_deviantart::{ApiClient, CrawlConfig, CrawlStats, Dataset};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct CrawlArgs {
    #[command(subcommand)]
    pub target: CrawlTarget,

    /// Output directory (default: [output] dir from the config)
    #[arg(short, long, global = true)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum CrawlTarget {
    /// Fetch user profiles
    Profiles(NamesArgs),
    /// Page through watchers and friends
    WatchersFriends(NamesArgs),
    /// Expand from seed names over watcher/friend edges
    Snowball(SnowballArgs),
    /// Random walks seeded from daily deviations
    RandomWalk(RandomWalkArgs),
    /// Page through galleries
    Gallery(NamesArgs),
    /// Fetch deviation metadata for a gallery output
    Metadata(MetadataArgs),
    /// Scrape about pages
    About(AboutArgs),
    /// Browse tags for the deviants using them
    Tags(TagsArgs),
}

#[derive(Args, Debug)]
pub struct NamesArgs {
    /// Name files: CSVs (read from --column) or one name per line
    #[arg(short, long, required = true)]
    pub input: Vec<PathBuf>,

    /// Column holding names in CSV inputs
    #[arg(long, default_value = "user")]
    pub column: String,
}

#[derive(Args, Debug)]
pub struct SnowballArgs {
    /// Seed files: profile CSVs or one name per line
    #[arg(short, long, required = true)]
    pub input: Vec<PathBuf>,

    /// Maximum number of expansion rounds
    #[arg(long, default_value_t = DEFAULT_ROUNDS)]
    pub rounds: usize,
}

#[derive(Args, Debug)]
pub struct RandomWalkArgs {
    /// First day to sample (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub start: NaiveDate,

    /// Last day to sample, inclusive (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub end: NaiveDate,

    /// Days between sampled dates
    #[arg(long, default_value_t = 1)]
    pub day_step: u64,

    /// Authors sampled per day
    #[arg(long, default_value_t = 3)]
    pub seeds_per_day: usize,

    /// Hops per walk, the seed included
    #[arg(long, default_value_t = 10)]
    pub walk_length: usize,

    /// Watcher/friend pages per visited deviant
    #[arg(long, default_value_t = 5)]
    pub pages: usize,
}

#[derive(Args, Debug)]
pub struct MetadataArgs {
    /// Gallery CSV (default: the gallery output in the output directory)
    #[arg(short, long)]
    pub input: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AboutArgs {
    #[command(flatten)]
    pub names: NamesArgs,

    /// Rows appended per write
    #[arg(long, default_value_t = ABOUT_BATCH_SIZE)]
    pub batch_size: usize,
}

#[derive(Args, Debug)]
pub struct TagsArgs {
    /// Tags to browse (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// File with one tag per line
    #[arg(short, long)]
    pub input: Option<PathBuf>,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("Invalid date format: {e}"))
}

/// Names from every input file, first occurrence kept
fn collect_names(args: &NamesArgs) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for path in &args.input {
        names.extend(read_names(path, &args.column)?);
    }
    let names = normalize_names(names);
    log::info!(
        "{} names from {} input file(s)",
        names.len(),
        args.input.len()
    );
    Ok(names)
}

fn collect_tags(args: &TagsArgs) -> Result<Vec<String>> {
    let mut tags = args.tags.clone();
    if let Some(path) = &args.input {
        tags.extend(read_names(path, "tag")?);
    }
    let tags = normalize_names(tags);
    if tags.is_empty() {
        anyhow::bail!("No tags given: pass --tags or --input");
    }
    Ok(tags)
}

pub fn run(args: CrawlArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let crawl_config = config.crawl_config(args.output_dir);
    let api = ApiClient::new(&config.api_settings()?)?;

    log::info!("Output: {}", crawl_config.output_dir.display());

    let stats = dispatch(&api, args.target, &crawl_config, progress)?;

    if progress.is_tty() {
        stats.print();
    } else {
        stats.log();
    }
    Ok(super::exit_code(stats.interrupted))
}

fn dispatch(
    api: &ApiClient,
    target: CrawlTarget,
    config: &CrawlConfig,
    progress: &SharedProgress,
) -> Result<CrawlStats> {
    match target {
        CrawlTarget::Profiles(args) => {
            crawl::crawl_profiles(api, config, progress, &collect_names(&args)?)
        }
        CrawlTarget::WatchersFriends(args) => {
            crawl::crawl_watchers_friends(api, config, progress, &collect_names(&args)?)
        }
        CrawlTarget::Snowball(args) => {
            crawl::snowball(api, config, progress, &args.input, args.rounds)
        }
        CrawlTarget::RandomWalk(args) => {
            if args.end < args.start {
                anyhow::bail!("--end {} is before --start {}", args.end, args.start);
            }
            let mut options = RandomWalkOptions::new(args.start, args.end);
            options.day_step = args.day_step.max(1);
            options.seeds_per_day = args.seeds_per_day;
            options.walk_length = args.walk_length;
            options.pages = args.pages;
            crawl::random_walk(api, config, progress, &options)
        }
        CrawlTarget::Gallery(args) => {
            crawl::crawl_gallery(api, config, progress, &collect_names(&args)?)
        }
        CrawlTarget::Metadata(args) => {
            let gallery = args.input.unwrap_or_else(|| config.csv(Dataset::Gallery));
            if !gallery.exists() {
                anyhow::bail!("Gallery CSV {} does not exist", gallery.display());
            }
            crawl::crawl_metadata(api, config, progress, &gallery)
        }
        CrawlTarget::About(args) => crawl::crawl_about(
            api,
            config,
            progress,
            &collect_names(&args.names)?,
            args.batch_size.max(1),
        ),
        CrawlTarget::Tags(args) => crawl::crawl_tags(api, config, progress, &collect_tags(&args)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn dates_parse_as_iso_days() {
        assert_eq!(
            parse_date("2024-02-29").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(parse_date("29/02/2024").is_err());
    }

    #[test]
    fn names_merged_across_inputs() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("profiles.csv");
        std::fs::write(&csv, "user,country\nbo,FR\namy,DE\n").unwrap();
        let txt = dir.path().join("more.txt");
        std::fs::write(&txt, "cy\namy\n").unwrap();
        let args = NamesArgs {
            input: vec![csv, txt],
            column: "user".to_string(),
        };
        assert_eq!(collect_names(&args).unwrap(), vec!["amy", "bo", "cy"]);
    }

    #[test]
    fn tags_required() {
        let args = TagsArgs {
            tags: vec!["oil".to_string(), " oil ".to_string()],
            input: None,
        };
        assert_eq!(collect_tags(&args).unwrap(), vec!["oil"]);
        let empty = TagsArgs {
            tags: Vec::new(),
            input: None,
        };
        assert!(collect_tags(&empty).is_err());
    }
}
