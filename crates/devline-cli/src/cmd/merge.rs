//! Merge subcommand - concatenate CSVs keeping the first row per key

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use devline_core::{SharedProgress, fmt_num};
use devline_deviantart::crawl::merge_csvs;

use super::print_summary;

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Glob of CSVs to merge (quote it), e.g. 'data/*/about.csv'
    #[arg(short, long)]
    pub pattern: String,

    /// Merged CSV
    #[arg(short, long)]
    pub output: PathBuf,

    /// Column deduplicated on
    #[arg(short, long, default_value = "username")]
    pub key: String,
}

pub fn run(args: MergeArgs, progress: &SharedProgress) -> Result<ExitCode> {
    let summary = merge_csvs(&args.pattern, &args.output, &args.key)?;

    if progress.is_tty() {
        print_summary(
            "Merge",
            &[
                ("Files", summary.files.to_string()),
                ("Rows read", fmt_num(summary.rows_read)),
                ("Rows written", fmt_num(summary.rows_written)),
                ("Duplicates", fmt_num(summary.duplicates)),
                ("Without key", fmt_num(summary.missing_key)),
                ("Output", args.output.display().to_string()),
            ],
        );
    } else {
        summary.log(&args.output);
    }
    Ok(ExitCode::SUCCESS)
}
