//! Conversion orchestrator
//!
//! The converter is responsible for:
//! - Discovering and filtering inputs
//! - Spawning the worker pool and seeding the credit pool
//! - Consuming worker messages and routing records to the output handler
//! - Progress accounting and the per-file failure policy
//! - Stall detection and the abort path
//!
//! # Message flow
//!
//! ```text
//!  worker 0 ─┐                      ┌────────────────┐
//!  worker 1 ─┼─ Batch / FileDone ──▶│  process loop  │──▶ OutputHandler
//!  worker N ─┘   / FileError        └───────┬────────┘
//!      ▲                                    │ release() per message
//!      └───────── acquire() per file ── CreditPool
//! ```
//!
//! Aborting is a hard stop: workers are told to stop and are not waited for.

use crate::codec::SignalCodec;
use crate::config::ConvertConfig;
use crate::container::WriterFactory;
use crate::discovery::{filter_multi_read, iterate_inputs};
use crate::error::{ConfigError, ConvertError, OutputError, PipelineError, Result};
use crate::flow::CreditPool;
use crate::legacy::LegacyReader;
use crate::output::OutputHandler;
use crate::status::StatusMonitor;
use crate::worker::{aggregate_stats, distribute, Worker, WorkerContext, WorkerMessage};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often the loop wakes to check the shutdown flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of a completed conversion
#[derive(Debug, Clone)]
pub struct ConvertSummary {
    /// Inputs converted successfully
    pub files: usize,

    /// Inputs that failed (non-strict runs only)
    pub failed: usize,

    /// Records written across all outputs
    pub records: u64,

    /// Wall time of the conversion
    pub duration: Duration,

    /// Output files written, in open order
    pub outputs: Vec<PathBuf>,
}

/// Per-message accounting of the process loop
#[derive(Debug, Default)]
struct LoopCounts {
    done: usize,
    failed: usize,
}

/// Orchestrates a conversion run
pub struct Converter {
    config: Arc<ConvertConfig>,
    reader: Arc<dyn LegacyReader>,
    codec: Arc<dyn SignalCodec>,
    factory: Arc<dyn WriterFactory>,
    shutdown: Arc<AtomicBool>,
}

impl Converter {
    pub fn new(
        config: ConvertConfig,
        reader: Arc<dyn LegacyReader>,
        codec: Arc<dyn SignalCodec>,
        factory: Arc<dyn WriterFactory>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            reader,
            codec,
            factory,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Discover the inputs and convert them
    pub fn run(&self) -> Result<ConvertSummary> {
        let files = self.discover()?;
        self.prepare_output()?;
        self.convert_files(files)
    }

    /// Create the directory the output lives in
    pub fn prepare_output(&self) -> Result<()> {
        if let Some(parent) = self.config.output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| OutputError::CreateFailed {
                    path: parent.to_path_buf(),
                    reason: e.to_string(),
                })?;
            }
        }
        Ok(())
    }

    /// Expand and filter the configured inputs
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let candidates = iterate_inputs(
            &self.config.inputs,
            self.config.recursive,
            self.reader.extension(),
        );
        let files = filter_multi_read(
            &candidates,
            self.reader.as_ref(),
            self.config.worker_count * 2,
            self.config.show_progress,
        );

        if files.is_empty() {
            return Err(ConfigError::NoInputs.into());
        }
        Ok(files)
    }

    /// Convert an already filtered list of inputs
    pub fn convert_files(&self, files: Vec<PathBuf>) -> Result<ConvertSummary> {
        if files.is_empty() {
            return Err(ConfigError::NoInputs.into());
        }

        let start = Instant::now();
        let worker_count = self.config.worker_count.clamp(1, files.len());

        info!(
            files = files.len(),
            workers = worker_count,
            output = %self.config.output.display(),
            "Starting conversion"
        );

        let pool = CreditPool::for_workers(worker_count);
        let (tx, rx) = unbounded();
        let mut output = OutputHandler::new(
            self.config.output.clone(),
            self.config.one_to_one.clone(),
            self.config.force_overwrite,
            Arc::clone(&self.factory),
        );
        let mut status = StatusMonitor::new(&files, self.config.show_progress);

        let mut workers = Vec::with_capacity(worker_count);
        for (id, assigned) in distribute(&files, worker_count).into_iter().enumerate() {
            let ctx = WorkerContext {
                reader: Arc::clone(&self.reader),
                codec: Arc::clone(&self.codec),
                chunk_size: self.config.signal_chunk_size,
                credits: pool.handle(),
                tx: tx.clone(),
                shutdown: Arc::clone(&self.shutdown),
                timeout: self.config.timeout,
            };

            match Worker::spawn(id, assigned, ctx) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    return Err(self.abort(e.into(), &pool, rx, &mut output, &status, workers));
                }
            }
        }
        drop(tx);
        debug!(count = workers.len(), "Workers spawned");

        let counts = match self.process_messages(&rx, &pool, &mut output, &mut status) {
            Ok(counts) => counts,
            Err(e) => return Err(self.abort(e, &pool, rx, &mut output, &status, workers)),
        };

        // Every file is accounted for; nothing may remain in flight
        if let Ok(message) = rx.try_recv() {
            let violation = PipelineError::ProtocolViolation(format!(
                "unfinished data for '{}' after all files completed",
                message.path().display()
            ));
            return Err(self.abort(violation.into(), &pool, rx, &mut output, &status, workers));
        }

        status.close();

        let (_, _, _, skipped) = aggregate_stats(&workers);
        for worker in workers {
            if let Err(e) = worker.join() {
                warn!(error = %e, "Worker failed to join cleanly");
            }
        }

        output.close_all()?;

        let summary = ConvertSummary {
            files: counts.done,
            failed: counts.failed,
            records: output.records_written(),
            duration: start.elapsed(),
            outputs: output.output_paths().to_vec(),
        };

        info!(
            files = summary.files,
            failed = summary.failed,
            records = summary.records,
            skipped_groups = skipped,
            duration_secs = summary.duration.as_secs(),
            "Conversion completed"
        );

        Ok(summary)
    }

    /// Consume worker messages until every file has finished
    fn process_messages(
        &self,
        rx: &Receiver<WorkerMessage>,
        pool: &CreditPool,
        output: &mut OutputHandler,
        status: &mut StatusMonitor,
    ) -> Result<LoopCounts> {
        let mut counts = LoopCounts::default();
        let mut last_progress = Instant::now();

        while status.running() {
            if self.shutdown.load(Ordering::Relaxed) {
                return Err(PipelineError::Interrupted.into());
            }

            let message = match rx.recv_timeout(POLL_INTERVAL) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) => {
                    if last_progress.elapsed() >= self.config.timeout {
                        return Err(PipelineError::NoProgress {
                            waited: self.config.timeout,
                        }
                        .into());
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(PipelineError::WorkersGone {
                        remaining: status.total_files() - status.finished_files(),
                    }
                    .into());
                }
            };
            last_progress = Instant::now();

            let path = message.path().to_path_buf();
            if !status.is_tracked(&path) {
                return Err(PipelineError::ProtocolViolation(format!(
                    "message for unknown input '{}'",
                    path.display()
                ))
                .into());
            }
            if status.is_finished(&path) {
                return Err(PipelineError::ProtocolViolation(format!(
                    "message for '{}' after it finished",
                    path.display()
                ))
                .into());
            }

            match message {
                WorkerMessage::Batch { path, records } => {
                    output.append(&path, &records)?;
                    status.increment_reads(records.len() as u64);
                    pool.release();
                    continue;
                }
                WorkerMessage::FileError { path, error, trace } => {
                    counts.failed += 1;
                    status.write(&format!("Error processing: {}", path.display()));
                    status.write(&format!("Worker trace:\n{}", trace));

                    if error.is_fatal() {
                        return Err(error);
                    }
                    if self.config.strict {
                        return Err(PipelineError::StrictFailure {
                            path,
                            source: Box::new(error),
                        }
                        .into());
                    }
                }
                WorkerMessage::FileDone { path, total } => {
                    counts.done += 1;
                    status.update_reads_total(&path, total);
                    output.ensure_open(&path)?;
                }
            }

            status.increment(&path);
            output.set_input_complete(&path)?;
            pool.release();
        }

        Ok(counts)
    }

    /// Hard stop: signal workers, close everything, keep the original error
    fn abort(
        &self,
        err: ConvertError,
        pool: &CreditPool,
        rx: Receiver<WorkerMessage>,
        output: &mut OutputHandler,
        status: &StatusMonitor,
        workers: Vec<Worker>,
    ) -> ConvertError {
        self.shutdown.store(true, Ordering::SeqCst);
        pool.close();
        drop(rx);

        status.write(&format!("An unexpected error occurred: {}", err));
        status.close();

        if let Err(e) = output.close_all() {
            warn!(error = %e, "Failed to close outputs while aborting");
        }

        for worker in workers {
            worker.detach();
        }

        error!(error = %err, "Conversion aborted");
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DeflateCodec;
    use crate::container::{read_count, ContainerWriter, SqliteWriterFactory};
    use crate::error::{FlowError, LegacyError, LegacyResult, OutputResult, TranslateError};
    use crate::legacy::{multi_read_container, Group, LegacyFile, MemoryReader, ReadBuilder};
    use crate::model::TranslatedRecord;
    use crate::translate::{RunInfoCache, Translator};
    use rusqlite::Connection;
    use std::path::Path;
    use tempfile::tempdir;

    fn converter(reader: Arc<dyn LegacyReader>, config: ConvertConfig) -> Converter {
        Converter::new(
            config,
            reader,
            Arc::new(DeflateCodec::default()),
            Arc::new(SqliteWriterFactory::new()),
        )
    }

    fn files_with_reads(reader: &MemoryReader, counts: &[usize]) -> Vec<PathBuf> {
        counts
            .iter()
            .enumerate()
            .map(|(i, &n)| {
                let path = PathBuf::from(format!("/data/batch_{}.fast5", i));
                reader.insert(&path, multi_read_container((0..n).map(|_| ReadBuilder::new())));
                path
            })
            .collect()
    }

    #[test]
    fn test_merge_writes_every_record() {
        let dir = tempdir().unwrap();
        let reader = MemoryReader::new();
        let files = files_with_reads(&reader, &[300, 0, 7, 251, 1]);

        let mut config = ConvertConfig::new(vec![], dir.path().to_path_buf());
        config.worker_count = 3;
        let summary = converter(Arc::new(reader), config).convert_files(files).unwrap();

        assert_eq!(summary.files, 5);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.records, 559);
        assert_eq!(summary.outputs, vec![dir.path().join("output.pod5")]);

        let conn = Connection::open(dir.path().join("output.pod5")).unwrap();
        assert_eq!(read_count(&conn).unwrap(), 559);
    }

    #[test]
    fn test_non_strict_skips_failed_file() {
        let dir = tempdir().unwrap();
        let reader = MemoryReader::new();
        let mut files = files_with_reads(&reader, &[4, 5]);
        reader.insert(
            "/data/broken.fast5",
            Group::new().with_group("read_x", Group::new()),
        );
        files.push(PathBuf::from("/data/broken.fast5"));

        let mut config = ConvertConfig::new(vec![], dir.path().join("out.pod5"));
        config.worker_count = 2;
        let summary = converter(Arc::new(reader), config).convert_files(files).unwrap();

        assert_eq!(summary.files, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.records, 9);
    }

    #[test]
    fn test_strict_fails_run() {
        let dir = tempdir().unwrap();
        let reader = MemoryReader::new();
        reader.insert(
            "/data/broken.fast5",
            Group::new().with_group("read_x", Group::new()),
        );

        let mut config = ConvertConfig::new(vec![], dir.path().join("out.pod5"));
        config.strict = true;
        let result = converter(Arc::new(reader), config)
            .convert_files(vec![PathBuf::from("/data/broken.fast5")]);

        match result {
            Err(ConvertError::Pipeline(PipelineError::StrictFailure { path, source })) => {
                assert_eq!(path, PathBuf::from("/data/broken.fast5"));
                assert!(matches!(*source, ConvertError::Translate(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_one_to_one_outputs() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("in");
        let out = dir.path().join("out");
        let reader = MemoryReader::new();
        let a = root.join("a/x.fast5");
        let b = root.join("b.fast5");
        reader.insert(&a, multi_read_container((0..3).map(|_| ReadBuilder::new())));
        reader.insert(&b, multi_read_container((0..2).map(|_| ReadBuilder::new())));

        let mut config = ConvertConfig::new(vec![], out.clone());
        config.one_to_one = Some(root.clone());
        config.worker_count = 2;
        let summary = converter(Arc::new(reader), config)
            .convert_files(vec![a, b])
            .unwrap();

        assert_eq!(summary.outputs.len(), 2);
        let x = Connection::open(out.join("a/x.pod5")).unwrap();
        assert_eq!(read_count(&x).unwrap(), 3);
        let b = Connection::open(out.join("b.pod5")).unwrap();
        assert_eq!(read_count(&b).unwrap(), 2);
    }

    /// Reader whose `open` blocks far longer than the test timeout
    struct SlowReader {
        inner: MemoryReader,
        delay: Duration,
    }

    impl LegacyReader for SlowReader {
        fn extension(&self) -> &str {
            "fast5"
        }

        fn open(&self, path: &Path) -> LegacyResult<Box<dyn LegacyFile>> {
            std::thread::sleep(self.delay);
            self.inner.open(path)
        }
    }

    #[test]
    fn test_silence_is_fatal_stall() {
        let dir = tempdir().unwrap();
        let inner = MemoryReader::new();
        let files = files_with_reads(&inner, &[1]);
        let reader = SlowReader {
            inner,
            delay: Duration::from_secs(2),
        };

        let mut config = ConvertConfig::new(vec![], dir.path().join("out.pod5"));
        config.timeout = Duration::from_millis(300);
        let converter = converter(Arc::new(reader), config);
        let shutdown = converter.shutdown_flag();

        let start = Instant::now();
        let result = converter.convert_files(files);
        assert!(matches!(
            result,
            Err(ConvertError::Pipeline(PipelineError::NoProgress { .. }))
        ));
        assert!(shutdown.load(Ordering::SeqCst));

        // Workers are not waited for
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    /// Writer factory whose writers are slower than the credit timeout
    struct SlowFactory {
        delay: Duration,
    }

    struct SlowWriter {
        delay: Duration,
        written: u64,
    }

    impl ContainerWriter for SlowWriter {
        fn append(&mut self, records: &[TranslatedRecord]) -> OutputResult<()> {
            std::thread::sleep(self.delay);
            self.written += records.len() as u64;
            Ok(())
        }

        fn close(&mut self) -> OutputResult<()> {
            Ok(())
        }

        fn records_written(&self) -> u64 {
            self.written
        }
    }

    impl WriterFactory for SlowFactory {
        fn open(&self, _path: &Path) -> OutputResult<Box<dyn ContainerWriter>> {
            Ok(Box::new(SlowWriter {
                delay: self.delay,
                written: 0,
            }))
        }
    }

    #[test]
    fn test_credit_stall_is_fatal() {
        let dir = tempdir().unwrap();
        let reader = MemoryReader::new();
        let files = files_with_reads(&reader, &[1, 1, 1, 1, 1]);

        let mut config = ConvertConfig::new(vec![], dir.path().join("out.pod5"));
        config.worker_count = 1;
        config.timeout = Duration::from_millis(200);
        let converter = Converter::new(
            config,
            Arc::new(reader),
            Arc::new(DeflateCodec::default()),
            Arc::new(SlowFactory {
                delay: Duration::from_millis(600),
            }),
        );

        let result = converter.convert_files(files);
        assert!(matches!(
            result,
            Err(ConvertError::Flow(FlowError::Stalled { .. }))
        ));
    }

    #[test]
    fn test_interrupted() {
        let dir = tempdir().unwrap();
        let reader = MemoryReader::new();
        let files = files_with_reads(&reader, &[1]);

        let config = ConvertConfig::new(vec![], dir.path().join("out.pod5"));
        let converter = converter(Arc::new(reader), config);
        converter.shutdown_flag().store(true, Ordering::SeqCst);

        let result = converter.convert_files(files);
        assert!(matches!(
            result,
            Err(ConvertError::Pipeline(PipelineError::Interrupted))
        ));
    }

    #[test]
    fn test_protocol_violations() {
        let dir = tempdir().unwrap();
        let config = ConvertConfig::new(vec![], dir.path().join("out.pod5"));
        let converter = converter(Arc::new(MemoryReader::new()), config);

        let files = vec![PathBuf::from("a.fast5"), PathBuf::from("b.fast5")];
        let pool = CreditPool::new(1);
        let mut output = OutputHandler::new(
            dir.path().join("out.pod5"),
            None,
            false,
            Arc::new(SqliteWriterFactory::new()),
        );

        // Message for a file already finished
        let (tx, rx) = unbounded();
        tx.send(WorkerMessage::FileDone {
            path: files[0].clone(),
            total: 0,
        })
        .unwrap();
        tx.send(WorkerMessage::FileDone {
            path: files[0].clone(),
            total: 0,
        })
        .unwrap();
        let mut status = StatusMonitor::new(&files, false);
        let result = converter.process_messages(&rx, &pool, &mut output, &mut status);
        assert!(matches!(
            result,
            Err(ConvertError::Pipeline(PipelineError::ProtocolViolation(_)))
        ));

        // Message for a file nobody asked for
        let (tx, rx) = unbounded();
        tx.send(WorkerMessage::FileError {
            path: PathBuf::from("z.fast5"),
            error: LegacyError::GroupNotFound { name: "x".into() }.into(),
            trace: String::new(),
        })
        .unwrap();
        let mut status = StatusMonitor::new(&files, false);
        let result = converter.process_messages(&rx, &pool, &mut output, &mut status);
        assert!(matches!(
            result,
            Err(ConvertError::Pipeline(PipelineError::ProtocolViolation(_)))
        ));
    }

    /// Writer that notes how many credits were free at each append
    struct CreditWatchFactory {
        pool: Arc<CreditPool>,
        seen: Arc<parking_lot::Mutex<Vec<usize>>>,
    }

    struct CreditWatchWriter {
        pool: Arc<CreditPool>,
        seen: Arc<parking_lot::Mutex<Vec<usize>>>,
        written: u64,
    }

    impl ContainerWriter for CreditWatchWriter {
        fn append(&mut self, records: &[TranslatedRecord]) -> OutputResult<()> {
            self.seen.lock().push(self.pool.available());
            self.written += records.len() as u64;
            Ok(())
        }

        fn close(&mut self) -> OutputResult<()> {
            Ok(())
        }

        fn records_written(&self) -> u64 {
            self.written
        }
    }

    impl WriterFactory for CreditWatchFactory {
        fn open(&self, _path: &Path) -> OutputResult<Box<dyn ContainerWriter>> {
            Ok(Box::new(CreditWatchWriter {
                pool: Arc::clone(&self.pool),
                seen: Arc::clone(&self.seen),
                written: 0,
            }))
        }
    }

    fn translated(count: usize) -> Vec<TranslatedRecord> {
        let codec = DeflateCodec::default();
        let translator = Translator::new(&codec, 1024);
        let mut cache = RunInfoCache::new();
        (0..count)
            .map(|_| {
                let read = ReadBuilder::new();
                let name = read.name();
                translator.translate(&name, &read.build(), &mut cache).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_credit_released_after_each_consumed_message() {
        let dir = tempdir().unwrap();
        let config = ConvertConfig::new(vec![], dir.path().to_path_buf());
        let converter = converter(Arc::new(MemoryReader::new()), config);

        let pool = Arc::new(CreditPool::new(0));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut output = OutputHandler::new(
            dir.path().to_path_buf(),
            None,
            false,
            Arc::new(CreditWatchFactory {
                pool: Arc::clone(&pool),
                seen: Arc::clone(&seen),
            }),
        );

        let a = PathBuf::from("a.fast5");
        let b = PathBuf::from("b.fast5");
        let c = PathBuf::from("c.fast5");
        let d = PathBuf::from("d.fast5");
        let files = vec![a.clone(), b.clone(), c.clone(), d.clone()];

        // a: 250 + 50 reads, b: empty, c: 7 reads, d: fails
        let (tx, rx) = unbounded();
        let messages = vec![
            WorkerMessage::Batch { path: a.clone(), records: translated(250) },
            WorkerMessage::Batch { path: a.clone(), records: translated(50) },
            WorkerMessage::FileDone { path: a, total: 300 },
            WorkerMessage::FileDone { path: b, total: 0 },
            WorkerMessage::Batch { path: c.clone(), records: translated(7) },
            WorkerMessage::FileDone { path: c, total: 7 },
            WorkerMessage::FileError {
                path: d,
                error: TranslateError::UnknownEndReason(99).into(),
                trace: String::new(),
            },
        ];
        for message in messages {
            tx.send(message).unwrap();
        }
        drop(tx);

        let mut status = StatusMonitor::new(&files, false);
        let counts = converter
            .process_messages(&rx, &pool, &mut output, &mut status)
            .unwrap();
        assert_eq!(counts.done, 3);
        assert_eq!(counts.failed, 1);

        // One release per batch plus one per file
        assert_eq!(pool.stats().released(), 3 + 4);
        assert_eq!(pool.available(), 7);

        // Each append sees only the credits of messages already consumed
        assert_eq!(*seen.lock(), vec![0, 1, 4]);
        assert_eq!(output.records_written(), 307);
    }

    #[test]
    fn test_workers_gone() {
        let dir = tempdir().unwrap();
        let config = ConvertConfig::new(vec![], dir.path().join("out.pod5"));
        let converter = converter(Arc::new(MemoryReader::new()), config);

        let files = vec![PathBuf::from("a.fast5")];
        let pool = CreditPool::new(1);
        let mut output = OutputHandler::new(
            dir.path().join("out.pod5"),
            None,
            false,
            Arc::new(SqliteWriterFactory::new()),
        );
        let mut status = StatusMonitor::new(&files, false);

        let (tx, rx) = unbounded::<WorkerMessage>();
        drop(tx);
        let result = converter.process_messages(&rx, &pool, &mut output, &mut status);
        assert!(matches!(
            result,
            Err(ConvertError::Pipeline(PipelineError::WorkersGone { remaining: 1 }))
        ));
    }

    #[test]
    fn test_no_inputs() {
        let dir = tempdir().unwrap();
        let config = ConvertConfig::new(vec![dir.path().to_path_buf()], dir.path().join("out.pod5"));
        let converter = converter(Arc::new(MemoryReader::new()), config);

        assert!(matches!(
            converter.run(),
            Err(ConvertError::Config(ConfigError::NoInputs))
        ));
    }
}
