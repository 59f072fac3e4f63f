//! Error types for pod5-convert
//!
//! This module defines the error hierarchy for the conversion pipeline:
//! - Legacy container reader errors
//! - Record translation errors
//! - Output (target container) errors
//! - Flow-control and pipeline errors
//! - Configuration and CLI errors
//!
//! Per-file errors ([`LegacyError`], [`TranslateError`]) travel back to the
//! orchestrator inside a `FileError` message and only fail the run in strict
//! mode. Everything wrapped by [`PipelineError`] and [`OutputError`] is fatal.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for a conversion run
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Legacy container errors
    #[error("Legacy container error: {0}")]
    Legacy(#[from] LegacyError),

    /// Record translation errors
    #[error("Translation error: {0}")]
    Translate(#[from] TranslateError),

    /// Output container errors
    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    /// Credit pool errors
    #[error("Flow control error: {0}")]
    Flow(#[from] FlowError),

    /// Pipeline / orchestration errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    /// Check if this error must abort the whole run even outside strict mode
    pub fn is_fatal(&self) -> bool {
        match self {
            ConvertError::Flow(FlowError::Stalled { .. }) => true,
            ConvertError::Legacy(_) | ConvertError::Translate(_) | ConvertError::Io(_) => false,
            _ => true,
        }
    }
}

/// Legacy container reader errors
#[derive(Error, Debug)]
pub enum LegacyError {
    /// File could not be opened
    #[error("Failed to open '{path}': {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    /// File content is not a valid container
    #[error("Malformed container '{path}': {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// Child group lookup failed
    #[error("Unable to open group '{name}'")]
    GroupNotFound { name: String },

    /// Group has no raw signal dataset
    #[error("Group '{name}' has no signal dataset")]
    NoSignal { name: String },
}

/// Record translation errors
#[derive(Error, Debug)]
pub enum TranslateError {
    /// A legacy read lacks a required attribute
    #[error("Missing required attribute '{key}' on group '{group}'")]
    MissingAttribute { group: String, key: String },

    /// Attribute is present with an unusable type
    #[error("Attribute '{key}' on group '{group}' is not {expected}")]
    WrongType {
        group: String,
        key: String,
        expected: &'static str,
    },

    /// Read id is not a UUID
    #[error("Invalid read id '{value}': {reason}")]
    InvalidReadId { value: String, reason: String },

    /// End reason has no counterpart in the target enumeration
    #[error("Unknown end reason value {0}")]
    UnknownEndReason(i64),

    /// Required legacy group is absent
    #[error("Legacy structure error: {0}")]
    Structure(#[from] LegacyError),

    /// Signal codec failure
    #[error("Signal compression failed: {0}")]
    Codec(#[from] std::io::Error),
}

/// Output container errors
#[derive(Error, Debug)]
pub enum OutputError {
    /// Destination exists and overwrite is not permitted
    #[error("Output '{path}' already exists and overwrite is not enabled")]
    AlreadyExists { path: PathBuf },

    /// Target already flushed and closed
    #[error("Trying to re-open a closed writer to '{path}'")]
    ReopenClosed { path: PathBuf },

    /// Mirror root is not an ancestor of an input
    #[error("One-to-one directory '{root}' must be a parent of all inputs, '{input}' is not under it")]
    NotUnderRoot { input: PathBuf, root: PathBuf },

    /// SQLite error from the container writer
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Run metadata could not be serialised
    #[error("Failed to encode run metadata: {0}")]
    Encode(#[from] serde_json::Error),

    /// Failed to create an output file or directory
    #[error("Failed to create '{path}': {reason}")]
    CreateFailed { path: PathBuf, reason: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Credit pool errors
#[derive(Error, Debug, Clone)]
pub enum FlowError {
    /// No credit became available within the timeout
    #[error("No credit available after {}s - writer appears stalled", .waited.as_secs())]
    Stalled { waited: Duration },

    /// Pool closed by an aborting run
    #[error("Credit pool closed")]
    Closed,
}

/// Pipeline / orchestration errors
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Nothing arrived on the data channel within the timeout
    #[error("No progress in {} seconds - quitting", .waited.as_secs())]
    NoProgress { waited: Duration },

    /// A message arrived that the protocol does not allow
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// A file failed while running in strict mode
    #[error("Failed to convert '{path}': {source}")]
    StrictFailure {
        path: PathBuf,
        #[source]
        source: Box<ConvertError>,
    },

    /// A worker thread could not be started
    #[error("Failed to spawn worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },

    /// A worker thread panicked
    #[error("Worker {id} panicked")]
    WorkerPanicked { id: usize },

    /// Every worker hung up before all files were accounted for
    #[error("All workers have terminated with {remaining} files outstanding")]
    WorkersGone { remaining: usize },

    /// Interrupted by signal
    #[error("Operation interrupted by signal")]
    Interrupted,
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid signal chunk size
    #[error("Invalid signal chunk size {0}: must be at least 1")]
    InvalidChunkSize(usize),

    /// Invalid timeout
    #[error("Invalid timeout {0}s: must be at least 1")]
    InvalidTimeout(u64),

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },

    /// Discovery found nothing to convert
    #[error("Found no legacy inputs to process")]
    NoInputs,
}

/// Result type alias for ConvertError
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Result type alias for LegacyError
pub type LegacyResult<T> = std::result::Result<T, LegacyError>;

/// Result type alias for TranslateError
pub type TranslateResult<T> = std::result::Result<T, TranslateError>;

/// Result type alias for OutputError
pub type OutputResult<T> = std::result::Result<T, OutputError>;

/// Format an error and its source chain, one cause per line
pub fn format_trace(err: &(dyn std::error::Error + 'static)) -> String {
    let mut trace = err.to_string();
    let mut source = err.source();
    let mut depth = 1;
    while let Some(cause) = source {
        trace.push_str(&format!("\n  {}: {}", depth, cause));
        source = cause.source();
        depth += 1;
    }
    trace
}
