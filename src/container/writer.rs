//! SQLite container writer
//!
//! Each `append` call is one transaction with cached prepared statements.
//! Run info rows are written the first time an acquisition id is seen in
//! this file and referenced by every later read.

use super::schema::{self, keys};
use super::{ContainerWriter, WriterFactory};
use crate::error::{OutputError, OutputResult};
use crate::model::{RunInfo, ShiftScalePair, TranslatedRecord};
use crate::translate::SOFTWARE_NAME;
use rusqlite::{params, Connection, Statement};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

const INSERT_RUN_INFO: &str = "INSERT OR IGNORE INTO run_info (
    acquisition_id, acquisition_start_time, adc_max, adc_min, context_tags,
    experiment_name, flow_cell_id, flow_cell_product_code, protocol_name,
    protocol_run_id, protocol_start_time, sample_id, sample_rate, sequencing_kit,
    sequencer_position, sequencer_position_type, software, system_name,
    system_type, tracking_id)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)";

const INSERT_READ: &str = "INSERT INTO reads (
    read_id, read_number, start_sample, median_before, channel, well, pore_type,
    calibration_offset, calibration_scale, end_reason, end_reason_forced, run_info,
    num_minknow_events, tracked_scaling_shift, tracked_scaling_scale,
    predicted_scaling_shift, predicted_scaling_scale, num_reads_since_mux_change,
    time_since_mux_change, num_samples)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)";

const INSERT_CHUNK: &str =
    "INSERT INTO signal_chunks (read_row, chunk_index, samples, data) VALUES (?1, ?2, ?3, ?4)";

/// Statistics about write operations
#[derive(Debug, Default, Clone, Copy)]
pub struct WriterStats {
    /// Reads written
    pub reads: u64,

    /// Signal chunks written
    pub chunks: u64,

    /// Compressed signal bytes written
    pub signal_bytes: u64,

    /// Transactions committed
    pub batches: u64,
}

/// Creates [`SqliteWriter`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteWriterFactory;

impl SqliteWriterFactory {
    pub fn new() -> Self {
        Self
    }
}

impl WriterFactory for SqliteWriterFactory {
    fn open(&self, path: &Path) -> OutputResult<Box<dyn ContainerWriter>> {
        Ok(Box::new(SqliteWriter::create(path)?))
    }
}

/// Writer for one SQLite container
pub struct SqliteWriter {
    path: PathBuf,

    /// `None` once closed
    conn: Option<Connection>,

    /// Acquisition ids already stored
    run_infos: HashSet<String>,

    stats: WriterStats,
}

impl SqliteWriter {
    /// Create a new container at `path`
    pub fn create(path: &Path) -> OutputResult<Self> {
        let conn = Connection::open(path)?;
        schema::create_container(&conn)?;

        schema::set_file_info(&conn, keys::FILE_IDENTIFIER, &Uuid::new_v4().to_string())?;
        schema::set_file_info(&conn, keys::SCHEMA_VERSION, &schema::SCHEMA_VERSION.to_string())?;
        schema::set_file_info(
            &conn,
            keys::SOFTWARE,
            &format!("{} {}", SOFTWARE_NAME, env!("CARGO_PKG_VERSION")),
        )?;
        schema::set_file_info(&conn, keys::STATUS, "writing")?;

        debug!(path = %path.display(), "Created container");

        Ok(Self {
            path: path.to_path_buf(),
            conn: Some(conn),
            run_infos: HashSet::new(),
            stats: WriterStats::default(),
        })
    }

    /// Path of the container
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> WriterStats {
        self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }
}

impl ContainerWriter for SqliteWriter {
    fn append(&mut self, records: &[TranslatedRecord]) -> OutputResult<()> {
        let conn = self.conn.as_ref().ok_or_else(|| OutputError::ReopenClosed {
            path: self.path.clone(),
        })?;

        if records.is_empty() {
            return Ok(());
        }

        let tx = conn.unchecked_transaction()?;
        let mut new_run_infos = Vec::new();
        let mut stats = WriterStats::default();

        {
            let mut run_stmt = tx.prepare_cached(INSERT_RUN_INFO)?;
            let mut read_stmt = tx.prepare_cached(INSERT_READ)?;
            let mut chunk_stmt = tx.prepare_cached(INSERT_CHUNK)?;

            for record in records {
                let run_info = &record.run_info;
                if !self.run_infos.contains(&run_info.acquisition_id)
                    && !new_run_infos.contains(&run_info.acquisition_id)
                {
                    insert_run_info(&mut run_stmt, run_info)?;
                    new_run_infos.push(run_info.acquisition_id.clone());
                }

                let (tracked_shift, tracked_scale) = scaling_columns(&record.tracked_scaling);
                let (predicted_shift, predicted_scale) = scaling_columns(&record.predicted_scaling);

                read_stmt.execute(params![
                    record.read_id.to_string(),
                    record.read_number as i64,
                    record.start_sample as i64,
                    record.median_before as f64,
                    record.pore.channel as i64,
                    record.pore.well as i64,
                    record.pore.pore_type,
                    record.calibration.offset as f64,
                    record.calibration.scale as f64,
                    record.end_reason.kind.as_db_int(),
                    record.end_reason.forced,
                    run_info.acquisition_id,
                    record.num_minknow_events as i64,
                    tracked_shift,
                    tracked_scale,
                    predicted_shift,
                    predicted_scale,
                    record.num_reads_since_mux_change as i64,
                    record.time_since_mux_change as f64,
                    record.sample_count() as i64,
                ])?;
                let read_row = tx.last_insert_rowid();

                for (index, (data, samples)) in record
                    .signal
                    .chunks
                    .iter()
                    .zip(&record.signal.chunk_lengths)
                    .enumerate()
                {
                    chunk_stmt.execute(params![read_row, index as i64, *samples as i64, data])?;
                    stats.chunks += 1;
                    stats.signal_bytes += data.len() as u64;
                }

                stats.reads += 1;
            }
        }

        tx.commit()?;

        self.run_infos.extend(new_run_infos);
        self.stats.reads += stats.reads;
        self.stats.chunks += stats.chunks;
        self.stats.signal_bytes += stats.signal_bytes;
        self.stats.batches += 1;

        Ok(())
    }

    fn close(&mut self) -> OutputResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };

        schema::set_file_info(&conn, keys::READ_COUNT, &self.stats.reads.to_string())?;
        schema::set_file_info(&conn, keys::STATUS, "complete")?;
        schema::finalize(&conn)?;
        conn.close().map_err(|(_, e)| OutputError::Sqlite(e))?;

        debug!(
            path = %self.path.display(),
            reads = self.stats.reads,
            acquisitions = self.run_infos.len(),
            "Closed container"
        );
        Ok(())
    }

    fn records_written(&self) -> u64 {
        self.stats.reads
    }
}

fn insert_run_info(stmt: &mut Statement<'_>, info: &RunInfo) -> OutputResult<()> {
    stmt.execute(params![
        info.acquisition_id,
        info.acquisition_start_time.to_rfc3339(),
        info.adc_max,
        info.adc_min,
        serde_json::to_string(&info.context_tags)?,
        info.experiment_name,
        info.flow_cell_id,
        info.flow_cell_product_code,
        info.protocol_name,
        info.protocol_run_id,
        info.protocol_start_time.to_rfc3339(),
        info.sample_id,
        info.sample_rate,
        info.sequencing_kit,
        info.sequencer_position,
        info.sequencer_position_type,
        info.software,
        info.system_name,
        info.system_type,
        serde_json::to_string(&info.tracking_id)?,
    ])?;
    Ok(())
}

/// Missing estimates are stored as NULL
fn scaling_columns(pair: &ShiftScalePair) -> (Option<f64>, Option<f64>) {
    let column = |value: f32| (!value.is_nan()).then_some(value as f64);
    (column(pair.shift), column(pair.scale))
}
