//! devline - Crawl DeviantArt's social graph and load it into SQLite
//!
//! Collects profiles, watchers, friends, galleries and metadata into
//! append-only CSVs, then loads them incrementally into a relational store.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use devline_core::SharedProgress;

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "devline")]
#[command(about = "Crawl DeviantArt's social graph and load it into SQLite")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./devline.toml or ~/.config/devline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a resumable crawler
    Crawl(cmd::crawl::CrawlArgs),
    /// Download gallery images
    Download(cmd::download::DownloadArgs),
    /// Merge CSVs matching a glob, first row per key wins
    Merge(cmd::merge::MergeArgs),
    /// Convert crawl CSVs to Parquet
    Export(cmd::export::ExportArgs),
    /// Load crawl outputs into the SQLite database
    Load(cmd::load::LoadArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let progress = Arc::new(devline_core::ProgressContext::new());

    // TTY: quiet unless --debug, the bars show activity. Otherwise logs are the progress.
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    devline_core::init_logging(quiet, cli.debug, multi);

    if let Err(e) = devline_core::install_signal_handlers() {
        log::warn!("Failed to install signal handlers: {e}");
    }

    match run(cli, &progress) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, progress: &SharedProgress) -> Result<ExitCode> {
    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Crawl(args) => cmd::crawl::run(args, &config, progress),
        Command::Download(args) => cmd::download::run(args, &config, progress),
        Command::Merge(args) => cmd::merge::run(args, progress),
        Command::Export(args) => cmd::export::run(args, &config, progress),
        Command::Load(args) => cmd::load::run(args, &config, progress),
        Command::Config => {
            print_config(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_config(config: &Config) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    let secret = |value: &Option<String>| {
        if value.as_deref().is_some_and(|v| !v.trim().is_empty()) {
            "set"
        } else {
            "not set"
        }
    };
    table.add_row(vec!["Client ID", secret(&config.credentials.client_id)]);
    table.add_row(vec!["Client secret", secret(&config.credentials.client_secret)]);
    table.add_row(vec!["API base URL", &config.api.base_url]);
    table.add_row(vec!["Token URL", &config.api.token_url]);
    table.add_row(vec!["Max retries", &config.api.max_retries.to_string()]);
    table.add_row(vec!["Token TTL", &format!("{}s", config.api.token_ttl_secs)]);
    table.add_row(vec![
        "Output directory",
        &config.output.dir.display().to_string(),
    ]);
    table.add_row(vec![
        "Compression level",
        &config.output.compression_level.to_string(),
    ]);
    table.add_row(vec!["Gzip outputs", &config.output.gzip.to_string()]);
    table.add_row(vec!["Page delay", &config.pacing.page_delay.to_string()]);
    table.add_row(vec!["Deviant delay", &config.pacing.deviant_delay.to_string()]);
    table.add_row(vec!["Scrape delay", &config.pacing.scrape_delay.to_string()]);
    table.add_row(vec!["Profile delay", &config.pacing.profile_delay.to_string()]);
    table.add_row(vec![
        "Database",
        &config.database.path.display().to_string(),
    ]);
    table.add_row(vec!["Chunk size", &config.database.chunk_size.to_string()]);

    eprintln!("\n{table}");
}
