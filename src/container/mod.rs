//! Target container output
//!
//! The output handler only sees two traits:
//! - [`WriterFactory`]: creates a fresh container at a path
//! - [`ContainerWriter`]: accepts whole translated records and is closed once
//!
//! The shipped backend stores the read table in a single SQLite file.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────────┐     ┌─────────────────┐
//! │  run_info    │◀────│  reads               │◀────│  signal_chunks  │
//! │  (one per    │     │  (one per record)    │     │  (one per chunk)│
//! │  acquisition)│     └──────────────────────┘     └─────────────────┘
//! └──────────────┘
//! ```

pub mod schema;
pub mod writer;

pub use schema::{create_container, keys, read_count};
pub use writer::{SqliteWriter, SqliteWriterFactory};

use crate::error::OutputResult;
use crate::model::TranslatedRecord;
use std::path::Path;

/// Extension of converted containers
pub const TARGET_EXTENSION: &str = "pod5";

/// An open target container
pub trait ContainerWriter: Send {
    /// Append records in order
    fn append(&mut self, records: &[TranslatedRecord]) -> OutputResult<()>;

    /// Flush and close; further appends fail, further closes are no-ops
    fn close(&mut self) -> OutputResult<()>;

    /// Records appended so far
    fn records_written(&self) -> u64;
}

/// Creates target containers
pub trait WriterFactory: Send + Sync {
    /// Create a new container at `path`, which must not exist
    fn open(&self, path: &Path) -> OutputResult<Box<dyn ContainerWriter>>;
}
