//! Download subcommand - gallery images to disk

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use devline_core::SharedProgress;
use devline_deviantart::Dataset;
use devline_deviantart::crawl::download_gallery;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Gallery CSV with Deviation_source URLs (default: the gallery output)
    #[arg(short, long)]
    pub gallery: Option<PathBuf>,

    /// Image directory, one subdirectory per artist (default: <output dir>/images)
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

pub fn run(args: DownloadArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let crawl_config = config.crawl_config(None);
    let gallery = args
        .gallery
        .unwrap_or_else(|| crawl_config.csv(Dataset::Gallery));
    let out = args.out.unwrap_or_else(|| config.output.dir.join("images"));

    if !gallery.exists() {
        anyhow::bail!("Gallery CSV {} does not exist", gallery.display());
    }
    log::info!("Downloading images from {}", gallery.display());
    log::info!("  Output: {}", out.display());

    let stats = download_gallery(&gallery, &out, config.pacing.download_delay, progress)?;

    if progress.is_tty() {
        stats.print();
    } else {
        stats.log();
    }
    Ok(super::exit_code(stats.interrupted))
}
