//! Load subcommand - crawl CSVs into SQLite

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};
use comfy_table::Cell;

use devline_core::{SharedProgress, fmt_num, is_shutdown_requested};
use devline_db::{Database, InteractionKind, LoadSummary};
use devline_deviantart::Dataset;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct LoadArgs {
    #[command(subcommand)]
    pub target: LoadTarget,

    /// SQLite database (default: [database] path from the config)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// CSV rows per transaction
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum LoadTarget {
    /// Profiles CSV into artists
    Artists(InputArgs),
    /// Watchers CSV into watchers_v1
    Watchers(InputArgs),
    /// Friends CSV into friends_v1
    Friends(InputArgs),
    /// Watcher, friend or watching edges into artist_interactions
    Interactions(InteractionArgs),
    /// About CSV into watchings
    Watchings(InputArgs),
    /// Gallery CSV into imgs_date
    ImgsDate(InputArgs),
    /// Metadata CSV into imgs_dscrpt
    ImgsDscrpt(InputArgs),
    /// Metadata CSV into imgs_tags
    ImgsTags(InputArgs),
    /// Every crawl output found in a directory, in dependency order
    All(AllArgs),
}

#[derive(Args, Debug)]
pub struct InputArgs {
    /// CSV file (.csv or .csv.gz)
    #[arg(short, long)]
    pub input: PathBuf,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum KindArg {
    Watcher,
    Friend,
    Watching,
}

impl From<KindArg> for InteractionKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Watcher => InteractionKind::Watcher,
            KindArg::Friend => InteractionKind::Friend,
            KindArg::Watching => InteractionKind::Watching,
        }
    }
}

#[derive(Args, Debug)]
pub struct InteractionArgs {
    /// Edge kind; `watching` reads the watchings table instead of a CSV
    #[arg(long, value_enum)]
    pub kind: KindArg,

    /// Watchers or friends CSV
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Column naming the interactor (default: "Watchers name" or "Friends name")
    #[arg(long)]
    pub from_column: Option<String>,

    /// Column with the interaction date
    #[arg(long, default_value = "last_visit")]
    pub date_column: String,
}

#[derive(Args, Debug)]
pub struct AllArgs {
    /// Crawl output directory (default: [output] dir from the config)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

pub fn run(args: LoadArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let db_path = args.db.unwrap_or_else(|| config.database.path.clone());
    let chunk_size = args.chunk_size.unwrap_or(config.database.chunk_size);
    log::info!("Loading into {}", db_path.display());

    let mut db = Database::open(&db_path)?.with_chunk_size(chunk_size);
    let summaries = match args.target {
        LoadTarget::Artists(a) => vec![db.load_artists(&a.input)?],
        LoadTarget::Watchers(a) => vec![db.load_watchers(&a.input)?],
        LoadTarget::Friends(a) => vec![db.load_friends(&a.input)?],
        LoadTarget::Interactions(a) => vec![load_interactions(&mut db, a)?],
        LoadTarget::Watchings(a) => vec![db.load_watchings(&a.input)?],
        LoadTarget::ImgsDate(a) => vec![db.load_imgs_date(&a.input)?],
        LoadTarget::ImgsDscrpt(a) => vec![db.load_imgs_dscrpt(&a.input)?],
        LoadTarget::ImgsTags(a) => vec![db.load_imgs_tags(&a.input)?],
        LoadTarget::All(a) => {
            let dir = a.dir.unwrap_or_else(|| config.output.dir.clone());
            load_all(&mut db, &dir, config.output.gzip)?
        }
    };

    if progress.is_tty() {
        print_summaries(&summaries);
    }
    Ok(super::exit_code(summaries.iter().any(|s| s.interrupted)))
}

fn load_interactions(db: &mut Database, args: InteractionArgs) -> Result<LoadSummary> {
    let default_from = match args.kind {
        KindArg::Watching => return db.load_watching_interactions(),
        KindArg::Watcher => "Watchers name",
        KindArg::Friend => "Friends name",
    };
    let Some(input) = args.input else {
        anyhow::bail!(
            "--input is required for {} interactions",
            InteractionKind::from(args.kind)
        );
    };
    let from = args.from_column.unwrap_or_else(|| default_from.to_string());
    db.load_interactions(&input, args.kind.into(), &from, Some(&args.date_column))
}

/// A `load all` step reading one crawl output
type LoadStep = fn(&mut Database, &Path) -> Result<LoadSummary>;

fn watcher_edges(db: &mut Database, csv: &Path) -> Result<LoadSummary> {
    let kind = InteractionKind::Watcher;
    db.load_interactions(csv, kind, "Watchers name", Some("last_visit"))
}

fn friend_edges(db: &mut Database, csv: &Path) -> Result<LoadSummary> {
    let kind = InteractionKind::Friend;
    db.load_interactions(csv, kind, "Friends name", Some("last_visit"))
}

/// Reads the `watchings` table loaded from the same about output
fn watching_edges(db: &mut Database, _about: &Path) -> Result<LoadSummary> {
    db.load_watching_interactions()
}

/// Outputs loaded after the artists, in order
const LOAD_ORDER: [Dataset; 5] = [
    Dataset::Watchers,
    Dataset::Friends,
    Dataset::About,
    Dataset::Gallery,
    Dataset::Metadata,
];

fn load_steps(dataset: Dataset) -> Vec<LoadStep> {
    match dataset {
        Dataset::Watchers => vec![Database::load_watchers, watcher_edges],
        Dataset::Friends => vec![Database::load_friends, friend_edges],
        Dataset::About => vec![Database::load_watchings, watching_edges],
        Dataset::Gallery => vec![Database::load_imgs_date as LoadStep],
        Dataset::Metadata => vec![Database::load_imgs_dscrpt, Database::load_imgs_tags],
        _ => Vec::new(),
    }
}

/// Load every output present in `dir`: artists first, since the other
/// tables map names through them.
fn load_all(db: &mut Database, dir: &Path, gzip: bool) -> Result<Vec<LoadSummary>> {
    let profiles = Dataset::Profiles.csv_path(dir, gzip);
    if !profiles.exists() {
        anyhow::bail!(
            "No profiles output in {}; artists must be loaded first",
            dir.display()
        );
    }
    let mut summaries = vec![db.load_artists(&profiles)?];

    for dataset in LOAD_ORDER {
        let csv = dataset.csv_path(dir, gzip);
        if !csv.exists() {
            log::info!(
                "No {} output in {}, skipped",
                dataset.file_prefix(),
                dir.display()
            );
            continue;
        }
        for step in load_steps(dataset) {
            if summaries.iter().any(|s| s.interrupted) || is_shutdown_requested() {
                return Ok(summaries);
            }
            summaries.push(step(db, &csv)?);
        }
    }
    Ok(summaries)
}

fn print_summaries(summaries: &[LoadSummary]) {
    let mut table = super::summary_table(&[
        "Table",
        "Inserted",
        "Updated",
        "Unmapped",
        "Duplicates",
        "Chunks skipped",
        "Bad lines",
    ]);
    for s in summaries {
        let name = if s.interrupted {
            format!("{} (interrupted)", s.table)
        } else {
            s.table.clone()
        };
        table.add_row(vec![
            Cell::new(name),
            Cell::new(fmt_num(s.processed)),
            Cell::new(fmt_num(s.updated)),
            Cell::new(fmt_num(s.skipped_unmapped)),
            Cell::new(fmt_num(s.skipped_duplicates)),
            Cell::new(s.chunks_skipped),
            Cell::new(fmt_num(s.bad_lines)),
        ]);
    }
    eprintln!("\n{table}");
}
