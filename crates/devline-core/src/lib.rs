//! Devline Core - Common infrastructure for scraping pipelines
//!
//! This crate provides reusable components for calling rate-limited
//! HTTP APIs, persisting rows to append-only CSV, remembering what has
//! already been processed, and exporting results to Parquet.

pub mod accumulator;
pub mod csv_io;
pub mod error;
pub mod logging;
pub mod pacing;
pub mod progress;
pub mod retry;
pub mod shutdown;
pub mod sink;
pub mod stream;
pub mod visited;

// Re-exports for convenience
pub use accumulator::{Accumulator, DEFAULT_BATCH_SIZE, StringColumnsAccumulator};
pub use csv_io::{CsvSink, open_csv_reader, read_column, read_column_pairs};
pub use error::FetchError;
pub use logging::{IndicatifLogger, init_logging};
pub use pacing::{DelayRange, pace};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use retry::{backoff_duration, jittered_backoff, retry_with_backoff};
pub use shutdown::{install_signal_handlers, is_shutdown_requested};
pub use sink::{
    ParquetSink, cleanup_tmp_files, export_csv_to_parquet, exported_parquet_path,
    is_export_current, is_valid_parquet,
};
pub use stream::{SHARED_RUNTIME, download_to_file, http_client, send_text};
pub use visited::VisitedSet;
