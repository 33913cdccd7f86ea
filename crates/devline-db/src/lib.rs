//! devline-db: Incremental SQLite loads of crawl outputs
//!
//! Each loader reads one CSV in chunks, maps deviant names onto the
//! `artists` table and moves new rows in through a temp table, so running
//! the same load twice changes nothing.

pub mod checkpoint;
pub mod convert;
mod loader;
mod registry;
pub mod schema;
mod sql;
mod tables;

pub use checkpoint::ChunkCheckpoint;
pub use loader::{DEFAULT_CHUNK_SIZE, LoadSummary};
pub use registry::InteractorIds;
pub use tables::{Database, InteractionKind, WATCHING_BATCH};
