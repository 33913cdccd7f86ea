//! Parquet output: atomic file writer and CSV → Parquet export

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

use crate::accumulator::{Accumulator, StringColumnsAccumulator};
use crate::csv_io::open_csv_reader;

/// Buffered parquet writer with atomic tmp→rename
pub struct ParquetSink {
    writer: ArrowWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    row_count: usize,
}

impl std::fmt::Debug for ParquetSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetSink")
            .field("final_path", &self.final_path)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl ParquetSink {
    /// Create a sink for `<output_dir>/<stem>.parquet`, writing to a tmp file first
    pub fn new(
        stem: &str,
        output_dir: &Path,
        schema: SchemaRef,
        zstd_level: i32,
    ) -> io::Result<Self> {
        fs::create_dir_all(output_dir)?;
        let filename = format!("{stem}.parquet");
        let final_path = output_dir.join(&filename);
        let tmp_path = output_dir.join(format!("{filename}.tmp"));

        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let file = File::create(&tmp_path)?;
        let level = ZstdLevel::try_new(zstd_level)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(level))
            .set_max_row_group_size(1024 * 1024)
            .build();

        let writer = ArrowWriter::try_new(file, schema, Some(props)).map_err(io::Error::other)?;

        Ok(Self {
            writer,
            tmp_path,
            final_path,
            row_count: 0,
        })
    }

    pub fn write_batch(&mut self, batch: &RecordBatch) -> io::Result<()> {
        self.row_count += batch.num_rows();
        self.writer.write(batch).map_err(io::Error::other)
    }

    /// Finalize: flush footer and atomically rename tmp → final
    pub fn finalize(self) -> io::Result<usize> {
        let row_count = self.row_count;
        self.writer.close().map_err(io::Error::other)?;
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(row_count)
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }
}

/// Check if a completed parquet file exists and has a valid footer
pub fn is_valid_parquet(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return false,
    };
    parquet::file::reader::SerializedFileReader::new(file).is_ok()
}

/// Remove stale .tmp files in the output directory
pub fn cleanup_tmp_files(output_dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(output_dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "tmp") {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// `watchers.csv.gz` → `watchers`
fn csv_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    name.strip_suffix(".csv").unwrap_or(name).to_string()
}

/// Parquet file [`export_csv_to_parquet`] writes for `csv`
pub fn exported_parquet_path(csv: &Path, out_dir: &Path) -> PathBuf {
    out_dir.join(format!("{}.parquet", csv_stem(csv)))
}

/// A valid export of `csv` exists and is not older than the CSV
pub fn is_export_current(csv: &Path, out_dir: &Path) -> bool {
    let parquet = exported_parquet_path(csv, out_dir);
    if !is_valid_parquet(&parquet) {
        return false;
    }
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(csv), modified(&parquet)) {
        (Some(csv_time), Some(parquet_time)) => parquet_time >= csv_time,
        _ => false,
    }
}

/// Convert a crawl CSV to `<out_dir>/<stem>.parquet` with one nullable Utf8
/// column per header. Rows with more cells than the header are skipped.
/// Returns the number of rows written.
pub fn export_csv_to_parquet(csv: &Path, out_dir: &Path, zstd_level: i32) -> io::Result<usize> {
    let mut reader = open_csv_reader(csv)?;
    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} has no header", csv.display()),
        ));
    }
    let names: Vec<&str> = headers.iter().collect();
    let mut acc = StringColumnsAccumulator::new(names.as_slice());
    let mut sink = ParquetSink::new(&csv_stem(csv), out_dir, acc.schema(), zstd_level)?;

    let mut skipped = 0usize;
    for record in reader.records() {
        match record {
            Ok(r) if r.len() <= headers.len() => acc.push(r),
            _ => skipped += 1,
        }
        if acc.is_full() {
            sink.write_batch(&acc.take_batch().map_err(io::Error::other)?)?;
        }
    }
    if !acc.is_empty() {
        sink.write_batch(&acc.take_batch().map_err(io::Error::other)?)?;
    }
    if skipped > 0 {
        log::warn!("{}: skipped {skipped} malformed rows", csv.display());
    }
    let path = sink.final_path().to_path_buf();
    let rows = sink.finalize()?;
    log::info!("Exported {rows} rows to {}", path.display());
    Ok(rows)
}
