//! Merge many crawl outputs into one CSV

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use devline_core::csv_io::{column_index, is_well_formed};
use devline_core::open_csv_reader;
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MergeSummary {
    pub files: usize,
    pub rows_read: usize,
    pub rows_written: usize,
    pub duplicates: usize,
    /// Rows without a value in the key column
    pub missing_key: usize,
}

impl MergeSummary {
    pub fn log(&self, output: &Path) {
        log::info!(
            "merge: {} files, {} rows read, {} written to {} ({} duplicates, {} without key)",
            self.files,
            self.rows_read,
            self.rows_written,
            output.display(),
            self.duplicates,
            self.missing_key
        );
    }
}

/// Files matching `pattern`, sorted, without `output` however it is spelled
fn matching_files(pattern: &str, output: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let output = fs::canonicalize(output).ok();
    let is_output = |path: &Path| output.is_some() && fs::canonicalize(path).ok() == output;
    let mut files = Vec::new();
    for entry in glob::glob(pattern).with_context(|| format!("Invalid pattern '{pattern}'"))? {
        match entry {
            Ok(path) if path.is_file() && !is_output(&path) => files.push(path),
            Ok(_) => {}
            Err(e) => log::warn!("Skipping unreadable path: {e}"),
        }
    }
    files.sort();
    Ok(files)
}

/// Concatenate the CSVs matching `pattern` into `output`, keeping the first
/// row seen for each value of `key`.
///
/// Files are read in path order. Columns are the union of all headers in
/// first-seen order; cells missing from a file are left empty.
pub fn merge_csvs(pattern: &str, output: &Path, key: &str) -> anyhow::Result<MergeSummary> {
    let files = matching_files(pattern, output)?;
    if files.is_empty() {
        bail!("No files match '{pattern}'");
    }

    let mut columns: Vec<String> = Vec::new();
    let mut seen_columns = FxHashSet::default();
    for path in &files {
        let mut reader = open_csv_reader(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let headers = reader
            .headers()
            .with_context(|| format!("Failed to read header of {}", path.display()))?;
        for h in headers {
            if seen_columns.insert(h.to_string()) {
                columns.push(h.to_string());
            }
        }
    }
    let Some(key_out) = columns.iter().position(|c| c == key) else {
        bail!("No input has a '{key}' column");
    };
    let out_index: FxHashMap<&str, usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect();

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp = output.with_extension("csv.tmp");
    let mut writer = csv::Writer::from_path(&tmp)
        .with_context(|| format!("Failed to create {}", tmp.display()))?;
    writer.write_record(&columns)?;

    let mut summary = MergeSummary {
        files: files.len(),
        ..Default::default()
    };
    let mut keys = FxHashSet::default();
    for path in &files {
        let mut reader = open_csv_reader(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let headers = reader.headers()?.clone();
        // input column → output column
        let mapping: Vec<usize> = headers.iter().map(|h| out_index[h]).collect();
        let key_in = column_index(&headers, key);

        for record in reader.records() {
            let Ok(record) = record else { continue };
            if !is_well_formed(&headers, &record) {
                continue;
            }
            summary.rows_read += 1;
            let value = key_in.and_then(|i| record.get(i)).map(str::trim).unwrap_or("");
            if value.is_empty() {
                summary.missing_key += 1;
                continue;
            }
            if !keys.insert(value.to_string()) {
                summary.duplicates += 1;
                continue;
            }
            let mut row = vec![""; columns.len()];
            for (i, cell) in record.iter().enumerate() {
                row[mapping[i]] = cell;
            }
            row[key_out] = value;
            writer.write_record(&row)?;
            summary.rows_written += 1;
        }
    }
    writer.flush()?;
    drop(writer);
    fs::rename(&tmp, output)
        .with_context(|| format!("Failed to move {} into place", tmp.display()))?;

    summary.log(output);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn first_row_per_key_wins() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("a_part1.csv"),
            "username,tag\namy,cats\nbo,cats\n",
        ).unwrap();
        fs::write(
            dir.path().join("a_part2.csv"),
            "username,tag,extra\namy,ink,x\ncy,ink,y\n,ink,z\n",
        )
        .unwrap();
        let out = dir.path().join("merged.csv");
        let pattern = format!("{}/a_part*.csv", dir.path().display());

        let summary = merge_csvs(&pattern, &out, "username").unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.rows_read, 5);
        assert_eq!(summary.rows_written, 3);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.missing_key, 1);
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "username,tag,extra\namy,cats,\nbo,cats,\ncy,ink,y\n"
        );
    }

    #[test]
    fn output_excluded_from_inputs() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("x.csv"), "username\namy\n").unwrap();
        let out = dir.path().join("all.csv");
        let pattern = format!("{}/*.csv", dir.path().display());
        merge_csvs(&pattern, &out, "username").unwrap();
        let again = merge_csvs(&pattern, &out, "username").unwrap();
        assert_eq!(again.files, 1);
        assert_eq!(again.rows_written, 1);
    }

    #[test]
    fn output_excluded_when_spelled_differently() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("x.csv"), "username\namy\n").unwrap();
        let out = dir.path().join(".").join("all.csv");
        let pattern = format!("{}/*.csv", dir.path().display());
        merge_csvs(&pattern, &out, "username").unwrap();
        let again = merge_csvs(&pattern, &out, "username").unwrap();
        assert_eq!(again.files, 1);
        assert_eq!(again.duplicates, 0);
    }

    #[test]
    fn missing_key_column_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("x.csv"), "name\namy\n").unwrap();
        let pattern = format!("{}/*.csv", dir.path().display());
        let err = merge_csvs(&pattern, &dir.path().join("out.csv"), "username").unwrap_err();
        assert!(err.to_string().contains("username"));
    }

    #[test]
    fn no_matches_is_an_error() {
        let dir = TempDir::new().unwrap();
        let pattern = format!("{}/*.csv", dir.path().display());
        assert!(merge_csvs(&pattern, &dir.path().join("out.csv"), "username").is_err());
    }
}
