//! Batch accumulator trait and a string-column accumulator for CSV rows

use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;

/// Default batch size for flushing accumulated rows into a `RecordBatch`.
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// Accumulator trait for batch processing of parsed rows into Arrow `RecordBatch`.
pub trait Accumulator {
    type Row;

    /// Push a row into the accumulator
    fn push(&mut self, row: Self::Row);

    /// Number of rows currently buffered
    fn len(&self) -> usize;

    /// Check if buffer is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if buffer is full and should be flushed
    fn is_full(&self) -> bool {
        self.len() >= DEFAULT_BATCH_SIZE
    }

    /// Take buffered rows as a RecordBatch, resetting internal state
    fn take_batch(&mut self) -> Result<RecordBatch, ArrowError>;
}

/// One nullable Utf8 column per CSV header. Empty cells become nulls,
/// missing trailing cells too.
pub struct StringColumnsAccumulator {
    schema: SchemaRef,
    columns: Vec<StringBuilder>,
    len: usize,
}

impl StringColumnsAccumulator {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        let fields: Vec<Field> = names
            .iter()
            .map(|n| Field::new(n.as_ref(), DataType::Utf8, true))
            .collect();
        let columns = (0..fields.len())
            .map(|_| StringBuilder::with_capacity(DEFAULT_BATCH_SIZE, DEFAULT_BATCH_SIZE * 16))
            .collect();
        Self {
            schema: Arc::new(Schema::new(fields)),
            columns,
            len: 0,
        }
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }
}

impl Accumulator for StringColumnsAccumulator {
    type Row = csv::StringRecord;

    fn push(&mut self, row: csv::StringRecord) {
        for (i, col) in self.columns.iter_mut().enumerate() {
            match row.get(i) {
                Some(v) if !v.is_empty() => col.append_value(v),
                _ => col.append_null(),
            }
        }
        self.len += 1;
    }

    fn len(&self) -> usize {
        self.len
    }

    fn take_batch(&mut self) -> Result<RecordBatch, ArrowError> {
        let arrays: Vec<ArrayRef> = self
            .columns
            .iter_mut()
            .map(|b| Arc::new(b.finish()) as ArrayRef)
            .collect();
        self.len = 0;
        RecordBatch::try_new(self.schema(), arrays)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, StringArray};

    #[test]
    fn empty_cells_are_null() {
        let mut acc = StringColumnsAccumulator::new(&["user", "country"]);
        acc.push(csv::StringRecord::from(vec!["alice", ""]));
        acc.push(csv::StringRecord::from(vec!["bob"]));
        assert_eq!(acc.len(), 2);

        let batch = acc.take_batch().unwrap();
        assert_eq!(batch.num_rows(), 2);
        let country = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(country.null_count(), 2);
        assert!(acc.is_empty());
    }

    #[test]
    fn batches_reset_between_takes() {
        let mut acc = StringColumnsAccumulator::new(&["id"]);
        acc.push(csv::StringRecord::from(vec!["1"]));
        let _ = acc.take_batch().unwrap();
        acc.push(csv::StringRecord::from(vec!["2"]));
        acc.push(csv::StringRecord::from(vec!["3"]));
        let batch = acc.take_batch().unwrap();
        let ids = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(ids.value(0), "2");
        assert_eq!(batch.num_rows(), 2);
    }

    #[test]
    fn schema_is_nullable_utf8() {
        let acc = StringColumnsAccumulator::new(&["a", "b"]);
        let schema = acc.schema();
        assert_eq!(schema.fields().len(), 2);
        assert!(schema
            .fields()
            .iter()
            .all(|f| f.is_nullable() && f.data_type() == &DataType::Utf8));
    }
}
