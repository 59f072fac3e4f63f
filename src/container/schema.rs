//! Target container schema definitions and creation
//!
//! A converted container is a single SQLite file holding the read table,
//! the per-acquisition run info table and the compressed signal chunks.

use crate::error::OutputResult;
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: u32 = 1;

/// One row per acquisition referenced by the file's reads
const CREATE_RUN_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS run_info (
    acquisition_id TEXT PRIMARY KEY,
    acquisition_start_time TEXT NOT NULL,   -- RFC 3339
    adc_max INTEGER NOT NULL,
    adc_min INTEGER NOT NULL,
    context_tags TEXT NOT NULL,             -- JSON object
    experiment_name TEXT NOT NULL,
    flow_cell_id TEXT NOT NULL,
    flow_cell_product_code TEXT NOT NULL,
    protocol_name TEXT NOT NULL,
    protocol_run_id TEXT NOT NULL,
    protocol_start_time TEXT NOT NULL,
    sample_id TEXT NOT NULL,
    sample_rate INTEGER NOT NULL,
    sequencing_kit TEXT NOT NULL,
    sequencer_position TEXT NOT NULL,
    sequencer_position_type TEXT NOT NULL,
    software TEXT NOT NULL,
    system_name TEXT NOT NULL,
    system_type TEXT NOT NULL,
    tracking_id TEXT NOT NULL               -- JSON object
)
"#;

/// The read table
/// Scaling columns are NULL when no estimate was recorded.
const CREATE_READS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS reads (
    id INTEGER PRIMARY KEY,
    read_id TEXT NOT NULL,
    read_number INTEGER NOT NULL,
    start_sample INTEGER NOT NULL,
    median_before REAL NOT NULL,
    channel INTEGER NOT NULL,
    well INTEGER NOT NULL,
    pore_type TEXT NOT NULL,
    calibration_offset REAL NOT NULL,
    calibration_scale REAL NOT NULL,
    end_reason INTEGER NOT NULL,
    end_reason_forced INTEGER NOT NULL,
    run_info TEXT NOT NULL,
    num_minknow_events INTEGER NOT NULL,
    tracked_scaling_shift REAL,
    tracked_scaling_scale REAL,
    predicted_scaling_shift REAL,
    predicted_scaling_scale REAL,
    num_reads_since_mux_change INTEGER NOT NULL,
    time_since_mux_change REAL NOT NULL,
    num_samples INTEGER NOT NULL,

    FOREIGN KEY (run_info) REFERENCES run_info(acquisition_id)
)
"#;

/// Compressed signal, one row per chunk
const CREATE_SIGNAL_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS signal_chunks (
    id INTEGER PRIMARY KEY,
    read_row INTEGER NOT NULL,
    chunk_index INTEGER NOT NULL,
    samples INTEGER NOT NULL,
    data BLOB NOT NULL,

    FOREIGN KEY (read_row) REFERENCES reads(id)
)
"#;

/// File-level metadata
const CREATE_FILE_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS file_info (
    key TEXT PRIMARY KEY,
    value TEXT
)
"#;

/// Indexes created once the file is complete
const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_reads_read_id ON reads(read_id)",
    "CREATE INDEX IF NOT EXISTS idx_reads_channel ON reads(channel)",
    "CREATE INDEX IF NOT EXISTS idx_signal_read ON signal_chunks(read_row, chunk_index)",
];

/// Pragmas for bulk writing
const WRITE_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = OFF;
PRAGMA cache_size = -64000;      -- 64MB cache
PRAGMA temp_store = MEMORY;
PRAGMA page_size = 4096;
PRAGMA locking_mode = EXCLUSIVE;
"#;

/// Pragmas applied when closing
const FINAL_PRAGMAS: &str = r#"
PRAGMA synchronous = FULL;
PRAGMA locking_mode = NORMAL;
"#;

/// Create and configure a new container for writing
pub fn create_container(conn: &Connection) -> OutputResult<()> {
    conn.execute_batch(WRITE_PRAGMAS)?;

    conn.execute(CREATE_RUN_INFO_TABLE, [])?;
    conn.execute(CREATE_READS_TABLE, [])?;
    conn.execute(CREATE_SIGNAL_TABLE, [])?;
    conn.execute(CREATE_FILE_INFO_TABLE, [])?;

    Ok(())
}

/// Create indexes and switch to durable settings
pub fn finalize(conn: &Connection) -> OutputResult<()> {
    for sql in CREATE_INDEXES {
        conn.execute(sql, [])?;
    }
    conn.execute_batch(FINAL_PRAGMAS)?;
    Ok(())
}

/// Store file metadata
pub fn set_file_info(conn: &Connection, key: &str, value: &str) -> OutputResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO file_info (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Get file metadata
pub fn get_file_info(conn: &Connection, key: &str) -> OutputResult<Option<String>> {
    let result = conn.query_row(
        "SELECT value FROM file_info WHERE key = ?1",
        [key],
        |row| row.get(0),
    );

    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Number of reads stored in a container
pub fn read_count(conn: &Connection) -> OutputResult<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM reads", [], |row| row.get(0))?;
    Ok(count as u64)
}

/// File metadata keys
pub mod keys {
    /// Random identifier of this file
    pub const FILE_IDENTIFIER: &str = "file_identifier";

    /// Schema version
    pub const SCHEMA_VERSION: &str = "schema_version";

    /// Writing software and version
    pub const SOFTWARE: &str = "software";

    /// "writing" while open, "complete" once closed
    pub const STATUS: &str = "status";

    /// Reads written when the file was closed
    pub const READ_COUNT: &str = "read_count";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_container() {
        let conn = Connection::open_in_memory().unwrap();
        create_container(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' \
                 AND name IN ('run_info', 'reads', 'signal_chunks', 'file_info')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 4);
        assert_eq!(read_count(&conn).unwrap(), 0);
    }

    #[test]
    fn test_file_info() {
        let conn = Connection::open_in_memory().unwrap();
        create_container(&conn).unwrap();

        set_file_info(&conn, keys::STATUS, "writing").unwrap();
        set_file_info(&conn, keys::STATUS, "complete").unwrap();

        assert_eq!(
            get_file_info(&conn, keys::STATUS).unwrap(),
            Some("complete".to_string())
        );
        assert_eq!(get_file_info(&conn, "nonexistent").unwrap(), None);
    }

    #[test]
    fn test_finalize_creates_indexes() {
        let conn = Connection::open_in_memory().unwrap();
        create_container(&conn).unwrap();
        finalize(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 3);
    }
}
