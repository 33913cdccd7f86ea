//! Chunked CSV → table loads through a staging table

use std::path::Path;

use anyhow::{Context, bail};
use csv::StringRecord;
use devline_core::csv_io::is_well_formed;
use devline_core::{is_shutdown_requested, open_csv_reader};
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::checkpoint::ChunkCheckpoint;
use crate::sql;

/// Rows read per transaction
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// Unmapped names logged per chunk
const UNMAPPED_EXAMPLES: usize = 5;

/// Target table of a load
#[derive(Debug, Clone, Copy)]
pub(crate) struct TableSpec {
    pub table: &'static str,
    /// Inserted columns, in row order
    pub columns: &'static [&'static str],
    /// Unique key; rows whose key exists are not inserted again
    pub key: &'static [&'static str],
    /// Columns rewritten on existing rows when the new value differs
    pub refresh: &'static [&'static str],
}

pub(crate) type Row = Vec<Value>;

/// Outcome of mapping one CSV record
pub(crate) enum Mapped {
    Rows(Vec<Row>),
    /// Deviant name not present in `artists`
    Unmapped(String),
    Skip,
}

/// Cells of one record by header name; missing columns read as ""
pub(crate) struct Cells<'a> {
    index: &'a FxHashMap<String, usize>,
    record: &'a StringRecord,
}

impl<'a> Cells<'a> {
    pub fn get(&self, column: &str) -> &'a str {
        self.index
            .get(column)
            .and_then(|&i| self.record.get(i))
            .unwrap_or("")
    }
}

pub(crate) fn text(s: &str) -> Value {
    if s.is_empty() {
        Value::Null
    } else {
        Value::Text(s.to_string())
    }
}

pub(crate) fn opt_int(v: Option<i64>) -> Value {
    v.map_or(Value::Null, Value::Integer)
}

pub(crate) fn opt_bool(v: Option<bool>) -> Value {
    v.map_or(Value::Null, |b| Value::Integer(i64::from(b)))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadSummary {
    pub table: String,
    /// Rows inserted
    pub processed: usize,
    /// Existing rows rewritten
    pub updated: usize,
    pub skipped_unmapped: usize,
    /// Repeats within a chunk plus rows already in the table
    pub skipped_duplicates: usize,
    pub chunks_skipped: usize,
    pub bad_lines: usize,
    pub interrupted: bool,
}

impl LoadSummary {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Default::default()
        }
    }

    pub fn log(&self) {
        log::info!(
            "{}: processed {}, skipped unmapped {}, skipped duplicates {}{}",
            self.table,
            self.processed,
            self.skipped_unmapped,
            self.skipped_duplicates,
            if self.chunks_skipped > 0 {
                format!(", {} chunks already loaded", self.chunks_skipped)
            } else {
                String::new()
            }
        );
    }
}

/// Artist name → id from `artists`
pub(crate) fn artist_ids(conn: &Connection) -> anyhow::Result<FxHashMap<String, i64>> {
    let mut stmt = conn
        .prepare("SELECT artist_name, id FROM artists WHERE artist_name IS NOT NULL")
        .context("Failed to prepare artist query")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    let mut map = FxHashMap::default();
    for row in rows {
        let (name, id) = row.context("Failed to read artist")?;
        map.insert(name, id);
    }
    log::info!("Loaded {} existing artists", map.len());
    Ok(map)
}

fn key_text(value: &Value) -> String {
    match value {
        Value::Null => "\u{0}".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => format!("{b:?}"),
    }
}

/// Keep the first row per key; returns how many were dropped
pub(crate) fn dedup(spec: &TableSpec, rows: &mut Vec<Row>) -> usize {
    let positions: Vec<usize> = spec
        .key
        .iter()
        .filter_map(|k| spec.columns.iter().position(|c| c == k))
        .collect();
    let before = rows.len();
    let mut seen = FxHashSet::default();
    rows.retain(|row| {
        let key: Vec<String> = positions.iter().map(|&i| key_text(&row[i])).collect();
        seen.insert(key.join("\u{1f}"))
    });
    before - rows.len()
}

/// Stage `rows` and move the new ones into the table, in one transaction.
///
/// Returns `(inserted, updated)`.
pub(crate) fn insert_rows(
    conn: &mut Connection,
    spec: &TableSpec,
    rows: &[Row],
) -> anyhow::Result<(usize, usize)> {
    let tx = conn.transaction().context("Failed to start transaction")?;
    tx.execute_batch(&sql::create_temp(spec))
        .with_context(|| format!("Failed to create {}", sql::temp_table(spec)))?;
    {
        let mut stmt = tx
            .prepare(&sql::insert_temp(spec))
            .context("Failed to prepare staging insert")?;
        for row in rows {
            stmt.execute(params_from_iter(row.iter()))
                .with_context(|| format!("Failed to stage row for {}", spec.table))?;
        }
    }
    let updated = match sql::refresh_existing(spec) {
        Some(update) => tx
            .execute(&update, [])
            .with_context(|| format!("Failed to refresh {}", spec.table))?,
        None => 0,
    };
    let inserted = tx
        .execute(&sql::insert_new(spec), [])
        .with_context(|| format!("Failed to insert into {}", spec.table))?;
    tx.execute_batch(&sql::drop_temp(spec))?;
    tx.commit().context("Failed to commit transaction")?;
    Ok((inserted, updated))
}

/// Load `csv` into `spec.table`, `chunk_size` records per transaction.
///
/// `required` names the CSV columns the load cannot do without. Chunks up
/// to the checkpoint are skipped; the checkpoint moves after each full
/// chunk commits. A partial last chunk is read again next time, since rows
/// appended later land in it. A shutdown request stops the load between
/// chunks.
pub(crate) fn load_csv<F>(
    conn: &mut Connection,
    csv: &Path,
    spec: &TableSpec,
    checkpoint: &ChunkCheckpoint,
    chunk_size: usize,
    required: &[&str],
    mut map: F,
) -> anyhow::Result<LoadSummary>
where
    F: FnMut(&Cells<'_>) -> Mapped,
{
    let mut reader =
        open_csv_reader(csv).with_context(|| format!("Failed to open {}", csv.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", csv.display()))?
        .clone();
    let index: FxHashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.to_string(), i))
        .collect();
    for column in required {
        if !index.contains_key(*column) {
            bail!("{} has no '{column}' column", csv.display());
        }
    }

    let last = checkpoint.last();
    let mut summary = LoadSummary::new(spec.table);
    if last >= 0 {
        log::info!(
            "{}: resuming {} after chunk {}",
            spec.table,
            csv.display(),
            last + 1
        );
    }
    let mut records = reader.records();
    let chunk_size = chunk_size.max(1);

    for chunk_no in 0usize.. {
        let chunk: Vec<_> = records.by_ref().take(chunk_size).collect();
        if chunk.is_empty() {
            break;
        }
        let full = chunk.len() == chunk_size;
        if (chunk_no as i64) <= last {
            summary.chunks_skipped += 1;
            continue;
        }
        if is_shutdown_requested() {
            summary.interrupted = true;
            break;
        }

        let mut rows = Vec::new();
        let mut unmapped = 0usize;
        let mut examples: Vec<String> = Vec::new();
        for record in chunk {
            let record = match record {
                Ok(r) if is_well_formed(&headers, &r) => r,
                Ok(r) => {
                    log::debug!("{}: skipping malformed line {:?}", spec.table, r.position());
                    summary.bad_lines += 1;
                    continue;
                }
                Err(e) => {
                    log::debug!("{}: skipping bad line: {e}", spec.table);
                    summary.bad_lines += 1;
                    continue;
                }
            };
            let cells = Cells {
                index: &index,
                record: &record,
            };
            match map(&cells) {
                Mapped::Rows(mut r) => rows.append(&mut r),
                Mapped::Unmapped(name) => {
                    unmapped += 1;
                    if examples.len() < UNMAPPED_EXAMPLES && !examples.contains(&name) {
                        examples.push(name);
                    }
                }
                Mapped::Skip => {}
            }
        }
        if unmapped > 0 {
            log::warn!(
                "{}: skipping {unmapped} rows in chunk {} with unmapped deviants, e.g. {examples:?}",
                spec.table,
                chunk_no + 1
            );
            summary.skipped_unmapped += unmapped;
        }

        let repeats = dedup(spec, &mut rows);
        if !rows.is_empty() {
            let (inserted, updated) = insert_rows(conn, spec, &rows)?;
            let existing = rows.len() - inserted;
            log::info!(
                "{}: chunk {}: {inserted} inserted, {existing} already present",
                spec.table,
                chunk_no + 1
            );
            summary.processed += inserted;
            summary.updated += updated;
            summary.skipped_duplicates += repeats + existing;
        } else {
            summary.skipped_duplicates += repeats;
        }
        if full {
            checkpoint.save(chunk_no)?;
        }
    }

    summary.log();
    Ok(summary)
}
