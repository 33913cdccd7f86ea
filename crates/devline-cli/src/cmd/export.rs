//! Export subcommand - crawl CSVs to Parquet

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Cell;

use devline_core::{
    SharedProgress, cleanup_tmp_files, export_csv_to_parquet, fmt_num, is_export_current,
    is_shutdown_requested,
};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// CSV files (.csv or .csv.gz)
    #[arg(short, long, required = true)]
    pub input: Vec<PathBuf>,

    /// Output directory (default: <output dir>/parquet)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Zstd compression level (1-22)
    #[arg(short, long)]
    pub zstd_level: Option<i32>,

    /// Export again even when the Parquet file is newer than its CSV
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: ExportArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let output_dir = args
        .output_dir
        .unwrap_or_else(|| config.output.dir.join("parquet"));
    let zstd_level = args.zstd_level.unwrap_or(config.output.compression_level);

    log::info!(
        "Exporting {} file(s) to {}",
        args.input.len(),
        output_dir.display()
    );
    if output_dir.is_dir() {
        cleanup_tmp_files(&output_dir)
            .with_context(|| format!("Failed to clean {}", output_dir.display()))?;
    }

    let mut exported = Vec::with_capacity(args.input.len());
    for csv in &args.input {
        if is_shutdown_requested() {
            break;
        }
        if !args.force && is_export_current(csv, &output_dir) {
            log::info!("{}: export up to date, skipped", csv.display());
            exported.push((csv, None));
            continue;
        }
        let rows = export_csv_to_parquet(csv, &output_dir, zstd_level)
            .with_context(|| format!("Failed to export {}", csv.display()))?;
        log::info!("{}: {rows} rows", csv.display());
        exported.push((csv, Some(rows)));
    }

    if progress.is_tty() {
        let mut table = super::summary_table(&["File", "Rows"]);
        for (csv, rows) in &exported {
            let rows = rows.map_or_else(|| "up to date".to_string(), fmt_num);
            table.add_row(vec![Cell::new(csv.display()), Cell::new(rows)]);
        }
        eprintln!("\n{table}");
    }
    Ok(super::exit_code(exported.len() < args.input.len()))
}
