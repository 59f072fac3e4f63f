//! pod5-convert - Bulk Legacy Container Converter
//!
//! Converts many independent multi-read legacy containers into pod5-style
//! read tables using a fixed pool of worker threads, with memory bounded
//! regardless of input size.
//!
//! # Features
//!
//! - **Credit-Based Flow Control**: Workers must take a credit before
//!   starting a file; credits come back only as the writer consumes output,
//!   so a slow writer throttles every worker.
//!
//! - **Fault Isolation**: A corrupt input fails only itself unless running
//!   in strict mode. Stalls and protocol violations abort the whole run.
//!
//! - **Merge or Mirror Output**: Every input merged into one file, or one
//!   output per input mirrored under an output directory.
//!
//! - **Schema Reconciliation**: Legacy reads are translated with shared
//!   per-acquisition run info, remapped end reasons and fixed defaults for
//!   missing optional fields.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────────────┐
//!                    │   Input discovery    │
//!                    │ (walkdir + filter)   │
//!                    └──────────┬───────────┘
//!                               │ round-robin
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Worker Threads                              │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐      │
//! │  │Worker 1 │  │Worker 2 │  │Worker 3 │  ...    │Worker N │      │
//! │  │ reader  │  │ reader  │  │ reader  │         │ reader  │      │
//! │  │translate│  │translate│  │translate│         │translate│      │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘      │
//! │       └────────────┴─────┬──────┴────────────────────┘          │
//! │                          │ Batch / FileDone / FileError         │
//! │                          ▼                                      │
//! │            ┌──────────────────────────┐      ┌──────────────┐   │
//! │            │      Converter loop      │─────▶│  CreditPool  │   │
//! │            │  status + failure policy │      │  (release)   │   │
//! │            └────────────┬─────────────┘      └──────────────┘   │
//! │                         ▼                                       │
//! │            ┌──────────────────────────┐                         │
//! │            │      OutputHandler       │                         │
//! │            │ Unopened → Open → Closed │                         │
//! │            └────────────┬─────────────┘                         │
//! └─────────────────────────┼───────────────────────────────────────┘
//!                           ▼
//!                ┌──────────────────┐
//!                │   *.pod5 files   │
//!                └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Merge everything under runs/ into one file
//! pod5-convert runs/ -r -o converted.pod5
//!
//! # One output per input, mirrored under out/
//! pod5-convert runs/ -r --one-to-one runs/ -o out/
//! ```

pub mod codec;
pub mod config;
pub mod container;
pub mod converter;
pub mod discovery;
pub mod error;
pub mod flow;
pub mod legacy;
pub mod model;
pub mod output;
pub mod status;
pub mod translate;
pub mod worker;

pub use codec::{DeflateCodec, SignalCodec};
pub use config::{CliArgs, ConvertConfig};
pub use container::{ContainerWriter, SqliteWriterFactory, WriterFactory};
pub use converter::{ConvertSummary, Converter};
pub use error::{ConvertError, Result};
pub use legacy::{JsonReader, LegacyFile, LegacyReader, MemoryReader};
