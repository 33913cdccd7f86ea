//! Append-only CSV output and lenient CSV readers
//!
//! Outputs are plain `.csv` or gzip `.csv.gz`. Every append to a gzip output
//! adds a new gzip member; readers use `MultiGzDecoder`, so a file built
//! over several runs reads back as one stream.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use rustc_hash::FxHashSet;
use serde::Serialize;

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// A file counts as new when it is missing or holds no data.
///
/// A gzip file made only of empty members (a run that wrote no rows) is new.
fn is_new_file(path: &Path) -> bool {
    if fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true) {
        return true;
    }
    if !is_gzip(path) {
        return false;
    }
    let Ok(file) = File::open(path) else {
        return true;
    };
    let mut first = [0u8; 1];
    matches!(
        MultiGzDecoder::new(BufReader::new(file)).read(&mut first),
        Ok(0)
    )
}

/// Appending CSV writer.
///
/// The header comes from the row type's serde field names and is only
/// written when the file is new, so re-running a crawl keeps appending to
/// the same file without repeating it. Each `append` on a gzip output is
/// one complete gzip member, so a process killed between appends leaves a
/// file that still decodes.
pub struct CsvSink {
    path: PathBuf,
    file: BufWriter<File>,
    gzip: bool,
    header_pending: bool,
}

impl std::fmt::Debug for CsvSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSink")
            .field("path", &self.path)
            .field("gzip", &self.gzip)
            .finish_non_exhaustive()
    }
}

impl CsvSink {
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let header_pending = is_new_file(path);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: BufWriter::new(file),
            gzip: is_gzip(path),
            header_pending,
        })
    }

    /// Append rows and flush. Returns the number of rows written.
    pub fn append<S: Serialize>(&mut self, rows: &[S]) -> io::Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(self.header_pending)
            .from_writer(Vec::new());
        for row in rows {
            writer.serialize(row)?;
        }
        let bytes = writer.into_inner().map_err(|e| e.into_error())?;

        if self.gzip {
            let mut encoder = GzEncoder::new(&mut self.file, Compression::default());
            encoder.write_all(&bytes)?;
            encoder.finish()?;
        } else {
            self.file.write_all(&bytes)?;
        }
        self.file.flush()?;
        self.header_pending = false;
        Ok(rows.len())
    }

    /// Append only rows whose key is not in `known`, recording the new keys.
    ///
    /// Duplicates within `rows` are dropped as well.
    pub fn append_unique<S, F>(
        &mut self,
        rows: Vec<S>,
        key: F,
        known: &mut FxHashSet<String>,
    ) -> io::Result<usize>
    where
        S: Serialize,
        F: Fn(&S) -> &str,
    {
        let fresh: Vec<S> = rows
            .into_iter()
            .filter(|row| known.insert(key(row).to_string()))
            .collect();
        self.append(&fresh)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Open a CSV (plain or gzip) with a flexible reader.
///
/// Records with the wrong field count are not rejected by the reader; use
/// [`is_well_formed`] to skip them.
pub fn open_csv_reader(path: &Path) -> io::Result<csv::Reader<Box<dyn Read>>> {
    let file = File::open(path)?;
    let inner: Box<dyn Read> = if is_gzip(path) {
        Box::new(MultiGzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(csv::ReaderBuilder::new().flexible(true).from_reader(inner))
}

/// Record length matches the header
pub fn is_well_formed(headers: &csv::StringRecord, record: &csv::StringRecord) -> bool {
    record.len() == headers.len()
}

/// Position of a named column in the header
pub fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

/// Distinct non-empty values of `column`.
///
/// A missing file yields an empty set. A missing column logs a warning and
/// yields an empty set. Malformed lines are skipped.
pub fn read_column(path: &Path, column: &str) -> io::Result<FxHashSet<String>> {
    let mut out = FxHashSet::default();
    if !path.exists() {
        return Ok(out);
    }
    let mut reader = open_csv_reader(path)?;
    let headers = reader.headers()?.clone();
    let Some(idx) = column_index(&headers, column) else {
        log::warn!("{}: no column '{column}'", path.display());
        return Ok(out);
    };

    let mut bad = 0usize;
    for record in reader.records() {
        match record {
            Ok(r) if is_well_formed(&headers, &r) => {
                if let Some(v) = r.get(idx).map(str::trim).filter(|v| !v.is_empty()) {
                    out.insert(v.to_string());
                }
            }
            _ => bad += 1,
        }
    }
    if bad > 0 {
        log::debug!("{}: skipped {bad} malformed lines", path.display());
    }
    Ok(out)
}

/// `(key, value)` pairs in file order, for rows where both cells are non-empty.
pub fn read_column_pairs(
    path: &Path,
    key_col: &str,
    val_col: &str,
) -> io::Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    if !path.exists() {
        return Ok(out);
    }
    let mut reader = open_csv_reader(path)?;
    let headers = reader.headers()?.clone();
    let (Some(ki), Some(vi)) = (
        column_index(&headers, key_col),
        column_index(&headers, val_col),
    ) else {
        log::warn!(
            "{}: missing column '{key_col}' or '{val_col}'",
            path.display()
        );
        return Ok(out);
    };

    for record in reader.records().flatten() {
        if !is_well_formed(&headers, &record) {
            continue;
        }
        let (Some(k), Some(v)) = (record.get(ki), record.get(vi)) else {
            continue;
        };
        let (k, v) = (k.trim(), v.trim());
        if !k.is_empty() && !v.is_empty() {
            out.push((k.to_string(), v.to_string()));
        }
    }
    Ok(out)
}
