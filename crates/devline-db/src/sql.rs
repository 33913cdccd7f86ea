//! SQL generation for temp-table loads.
//!
//! A chunk is staged in `<table>_temp` (same columns, no constraints), then
//! copied into the main table where no row with the same key exists.

use crate::loader::TableSpec;

fn quoted(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `m.k IS t.k AND ..` over the unique key
fn key_match(spec: &TableSpec, main: &str, temp: &str) -> String {
    spec.key
        .iter()
        .map(|k| format!("{main}.\"{k}\" IS {temp}.\"{k}\""))
        .collect::<Vec<_>>()
        .join(" AND ")
}

pub fn temp_table(spec: &TableSpec) -> String {
    format!("{}_temp", spec.table)
}

/// Drop any leftover staging table and create an empty one
pub fn create_temp(spec: &TableSpec) -> String {
    let temp = temp_table(spec);
    format!(
        "DROP TABLE IF EXISTS \"{temp}\"; \
         CREATE TEMP TABLE \"{temp}\" AS SELECT {cols} FROM \"{table}\" WHERE 0;",
        cols = quoted(spec.columns),
        table = spec.table,
    )
}

pub fn insert_temp(spec: &TableSpec) -> String {
    let placeholders: Vec<String> = (1..=spec.columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO \"{}\" ({}) VALUES ({})",
        temp_table(spec),
        quoted(spec.columns),
        placeholders.join(", ")
    )
}

/// Copy staged rows whose key is not yet in the main table
pub fn insert_new(spec: &TableSpec) -> String {
    let cols = quoted(spec.columns);
    format!(
        "INSERT INTO \"{table}\" ({cols}) \
         SELECT {cols} FROM \"{temp}\" AS t \
         WHERE NOT EXISTS (SELECT 1 FROM \"{table}\" AS m WHERE {cond})",
        table = spec.table,
        temp = temp_table(spec),
        cond = key_match(spec, "m", "t"),
    )
}

/// Rewrite `spec.refresh` columns of existing rows that differ from the staged row
pub fn refresh_existing(spec: &TableSpec) -> Option<String> {
    if spec.refresh.is_empty() {
        return None;
    }
    let table = format!("\"{}\"", spec.table);
    let set: Vec<String> = spec
        .refresh
        .iter()
        .map(|c| format!("\"{c}\" = t.\"{c}\""))
        .collect();
    let changed: Vec<String> = spec
        .refresh
        .iter()
        .map(|c| format!("{table}.\"{c}\" IS NOT t.\"{c}\""))
        .collect();
    Some(format!(
        "UPDATE {table} SET {} FROM \"{}\" AS t WHERE {} AND ({})",
        set.join(", "),
        temp_table(spec),
        key_match(spec, &table, "t"),
        changed.join(" OR ")
    ))
}

pub fn drop_temp(spec: &TableSpec) -> String {
    format!("DROP TABLE IF EXISTS \"{}\"", temp_table(spec))
}
