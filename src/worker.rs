//! Worker thread logic for parallel file conversion
//!
//! Each worker:
//! - Owns its own legacy reader handles (never shared across threads)
//! - Takes one credit before starting each assigned file
//! - Translates every read group of the file, in scan order
//! - Streams records back in batches, then a terminal `FileDone`
//! - Reports any per-file failure as `FileError` and moves on

use crate::codec::SignalCodec;
use crate::error::{
    format_trace, ConvertError, FlowError, LegacyError, PipelineError, TranslateError,
};
use crate::flow::CreditHandle;
use crate::legacy::{is_read_group, LegacyReader};
use crate::model::TranslatedRecord;
use crate::translate::{RunInfoCache, Translator};
use crossbeam_channel::Sender;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Records per batch message
pub const BATCH_SIZE: usize = 250;

/// Messages sent from workers to the orchestrator
#[derive(Debug)]
pub enum WorkerMessage {
    /// Up to [`BATCH_SIZE`] translated records of one file
    Batch {
        path: PathBuf,
        records: Vec<TranslatedRecord>,
    },

    /// File fully scanned; `total` is the true record count
    FileDone { path: PathBuf, total: u64 },

    /// File failed; no further messages follow for it
    FileError {
        path: PathBuf,
        error: ConvertError,
        trace: String,
    },
}

impl WorkerMessage {
    /// Input file this message belongs to
    pub fn path(&self) -> &Path {
        match self {
            WorkerMessage::Batch { path, .. }
            | WorkerMessage::FileDone { path, .. }
            | WorkerMessage::FileError { path, .. } => path,
        }
    }
}

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Files completed
    pub files_done: AtomicU64,

    /// Files that failed
    pub files_failed: AtomicU64,

    /// Records translated
    pub records: AtomicU64,

    /// Batches sent
    pub batches: AtomicU64,

    /// Listed read groups that could not be loaded
    pub skipped: AtomicU64,
}

impl WorkerStats {
    fn record_done(&self) {
        self.files_done.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_batch(&self, records: u64) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.records.fetch_add(records, Ordering::Relaxed);
    }

    fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Everything a worker shares with the rest of the pipeline
#[derive(Clone)]
pub struct WorkerContext {
    pub reader: Arc<dyn LegacyReader>,
    pub codec: Arc<dyn SignalCodec>,
    pub chunk_size: usize,
    pub credits: CreditHandle,
    pub tx: Sender<WorkerMessage>,
    pub shutdown: Arc<AtomicBool>,

    /// Longest a worker waits for a credit
    pub timeout: Duration,
}

/// A worker thread converting its assigned files
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<()>>,

    /// Worker statistics
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread over `files`
    pub fn spawn(id: usize, files: Vec<PathBuf>, ctx: WorkerContext) -> Result<Self, PipelineError> {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("convert-{}", id))
            .spawn(move || worker_loop(id, files, ctx, stats_clone))
            .map_err(|e| PipelineError::SpawnFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), PipelineError> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| PipelineError::WorkerPanicked { id: self.id }),
            None => Ok(()),
        }
    }

    /// Let the thread run on without waiting for it
    pub fn detach(mut self) {
        self.handle.take();
    }
}

/// Why a file stopped before `FileDone`
enum Stop {
    Failed(ConvertError),
    Disconnected,
    Shutdown,
}

impl From<LegacyError> for Stop {
    fn from(err: LegacyError) -> Self {
        Stop::Failed(err.into())
    }
}

impl From<TranslateError> for Stop {
    fn from(err: TranslateError) -> Self {
        Stop::Failed(err.into())
    }
}

/// Main worker loop
fn worker_loop(id: usize, files: Vec<PathBuf>, ctx: WorkerContext, stats: Arc<WorkerStats>) {
    debug!(worker = id, files = files.len(), "Worker starting");

    let translator = Translator::new(ctx.codec.as_ref(), ctx.chunk_size);

    for path in files {
        if ctx.shutdown.load(Ordering::Relaxed) {
            break;
        }

        match ctx.credits.acquire(ctx.timeout) {
            Ok(()) => {}
            Err(FlowError::Closed) => break,
            Err(err @ FlowError::Stalled { .. }) => {
                warn!(worker = id, error = %err, "Gave up waiting for a credit");
                let error = ConvertError::from(err);
                let trace = format_trace(&error);
                let _ = ctx.tx.send(WorkerMessage::FileError { path, error, trace });
                break;
            }
        }

        trace!(worker = id, path = %path.display(), "Starting file");

        let message = match process_file(id, &path, &translator, &ctx, &stats) {
            Ok(total) => {
                stats.record_done();
                WorkerMessage::FileDone { path, total }
            }
            Err(Stop::Failed(error)) => {
                stats.record_failed();
                debug!(worker = id, path = %path.display(), error = %error, "File failed");
                let trace = format_trace(&error);
                WorkerMessage::FileError { path, error, trace }
            }
            Err(Stop::Disconnected) | Err(Stop::Shutdown) => break,
        };

        if ctx.tx.send(message).is_err() {
            break;
        }
    }

    debug!(
        worker = id,
        files = stats.files_done.load(Ordering::Relaxed),
        failed = stats.files_failed.load(Ordering::Relaxed),
        records = stats.records.load(Ordering::Relaxed),
        "Worker shutting down"
    );
}

/// Convert one file, returning its record count
fn process_file(
    worker_id: usize,
    path: &Path,
    translator: &Translator<'_>,
    ctx: &WorkerContext,
    stats: &WorkerStats,
) -> Result<u64, Stop> {
    let file = ctx.reader.open(path)?;
    let mut cache = RunInfoCache::new();
    let mut batch = Vec::with_capacity(BATCH_SIZE);
    let mut total = 0u64;

    for name in file.list_children()? {
        if !is_read_group(&name) {
            continue;
        }
        if ctx.shutdown.load(Ordering::Relaxed) {
            return Err(Stop::Shutdown);
        }

        let group = match file.group(&name) {
            Ok(group) => group,
            Err(e) => {
                stats.record_skip();
                warn!(
                    worker = worker_id,
                    path = %path.display(),
                    group = %name,
                    error = %e,
                    "Skipping unreadable read group"
                );
                continue;
            }
        };

        batch.push(translator.translate(&name, &group, &mut cache)?);
        total += 1;

        if batch.len() >= BATCH_SIZE {
            let records = std::mem::replace(&mut batch, Vec::with_capacity(BATCH_SIZE));
            send_batch(path, records, ctx, stats)?;
        }
    }

    if !batch.is_empty() {
        send_batch(path, batch, ctx, stats)?;
    }

    trace!(
        worker = worker_id,
        path = %path.display(),
        records = total,
        acquisitions = cache.len(),
        "File scanned"
    );

    Ok(total)
}

fn send_batch(
    path: &Path,
    records: Vec<TranslatedRecord>,
    ctx: &WorkerContext,
    stats: &WorkerStats,
) -> Result<(), Stop> {
    let count = records.len() as u64;
    ctx.tx
        .send(WorkerMessage::Batch {
            path: path.to_path_buf(),
            records,
        })
        .map_err(|_| Stop::Disconnected)?;
    stats.record_batch(count);
    Ok(())
}

/// Split files across `workers` lists, file `i` going to list `i % workers`
pub fn distribute(files: &[PathBuf], workers: usize) -> Vec<Vec<PathBuf>> {
    let workers = workers.max(1);
    let mut lists = vec![Vec::new(); workers];
    for (i, path) in files.iter().enumerate() {
        lists[i % workers].push(path.clone());
    }
    lists
}

/// Aggregate statistics from multiple workers: (files, failed, records, skipped)
pub fn aggregate_stats(workers: &[Worker]) -> (u64, u64, u64, u64) {
    workers.iter().fold((0, 0, 0, 0), |acc, worker| {
        let stats = worker.stats();
        (
            acc.0 + stats.files_done.load(Ordering::Relaxed),
            acc.1 + stats.files_failed.load(Ordering::Relaxed),
            acc.2 + stats.records.load(Ordering::Relaxed),
            acc.3 + stats.skipped.load(Ordering::Relaxed),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DeflateCodec;
    use crate::flow::CreditPool;
    use crate::legacy::{multi_read_container, Group, MemoryReader, ReadBuilder};
    use crossbeam_channel::{unbounded, Receiver};

    fn context(reader: MemoryReader, pool: &CreditPool) -> (WorkerContext, Receiver<WorkerMessage>) {
        let (tx, rx) = unbounded();
        let ctx = WorkerContext {
            reader: Arc::new(reader),
            codec: Arc::new(DeflateCodec::default()),
            chunk_size: 1024,
            credits: pool.handle(),
            tx,
            shutdown: Arc::new(AtomicBool::new(false)),
            timeout: Duration::from_secs(5),
        };
        (ctx, rx)
    }

    #[test]
    fn test_distribute_round_robin() {
        let files: Vec<PathBuf> = (0..5).map(|i| PathBuf::from(format!("{}.fast5", i))).collect();
        let lists = distribute(&files, 2);

        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0], vec![files[0].clone(), files[2].clone(), files[4].clone()]);
        assert_eq!(lists[1], vec![files[1].clone(), files[3].clone()]);
    }

    #[test]
    fn test_worker_batches_and_done() {
        let reader = MemoryReader::new();
        reader.insert(
            "big.fast5",
            multi_read_container((0..(BATCH_SIZE + 10)).map(|_| ReadBuilder::new())),
        );

        let pool = CreditPool::new(1);
        let (ctx, rx) = context(reader, &pool);
        let worker = Worker::spawn(0, vec![PathBuf::from("big.fast5")], ctx).unwrap();
        worker.join().unwrap();

        let messages: Vec<_> = rx.try_iter().collect();
        assert_eq!(messages.len(), 3);
        match &messages[0] {
            WorkerMessage::Batch { records, .. } => assert_eq!(records.len(), BATCH_SIZE),
            other => panic!("unexpected {:?}", other),
        }
        match &messages[1] {
            WorkerMessage::Batch { records, .. } => assert_eq!(records.len(), 10),
            other => panic!("unexpected {:?}", other),
        }
        match &messages[2] {
            WorkerMessage::FileDone { total, .. } => assert_eq!(*total, BATCH_SIZE as u64 + 10),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_worker_isolates_file_errors() {
        let reader = MemoryReader::new();
        reader.insert(
            "good.fast5",
            multi_read_container([ReadBuilder::new(), ReadBuilder::new()]),
        );
        let broken = Group::new()
            .with_attr("file_type", "multi-read")
            .with_group("read_bad", Group::new().with_attr("run_id", "r"));
        reader.insert("bad.fast5", broken);

        let pool = CreditPool::new(10);
        let (ctx, rx) = context(reader, &pool);
        let files = vec![
            PathBuf::from("bad.fast5"),
            PathBuf::from("missing.fast5"),
            PathBuf::from("good.fast5"),
        ];
        Worker::spawn(0, files, ctx).unwrap().join().unwrap();

        let messages: Vec<_> = rx.try_iter().collect();
        assert_eq!(messages.len(), 4);
        assert!(matches!(&messages[0], WorkerMessage::FileError { path, .. } if path == Path::new("bad.fast5")));
        assert!(matches!(
            &messages[1],
            WorkerMessage::FileError { error: ConvertError::Legacy(_), .. }
        ));
        assert!(matches!(&messages[2], WorkerMessage::Batch { records, .. } if records.len() == 2));
        assert!(matches!(&messages[3], WorkerMessage::FileDone { total: 2, .. }));
    }

    #[test]
    fn test_worker_skips_non_read_children() {
        let reader = MemoryReader::new();
        let root = multi_read_container([ReadBuilder::new()])
            .with_group("UniqueGlobalKey", Group::new());
        reader.insert("mixed.fast5", root);

        let pool = CreditPool::new(1);
        let (ctx, rx) = context(reader, &pool);
        Worker::spawn(3, vec![PathBuf::from("mixed.fast5")], ctx)
            .unwrap()
            .join()
            .unwrap();

        let last = rx.try_iter().last().unwrap();
        assert!(matches!(last, WorkerMessage::FileDone { total: 1, .. }));
    }

    #[test]
    fn test_worker_reports_credit_stall() {
        let reader = MemoryReader::new();
        reader.insert("a.fast5", multi_read_container([ReadBuilder::new()]));
        reader.insert("b.fast5", multi_read_container([ReadBuilder::new()]));

        let pool = CreditPool::new(1);
        let (mut ctx, rx) = context(reader, &pool);
        ctx.timeout = Duration::from_millis(50);

        let files = vec![PathBuf::from("a.fast5"), PathBuf::from("b.fast5")];
        Worker::spawn(0, files, ctx).unwrap().join().unwrap();

        let messages: Vec<_> = rx.try_iter().collect();
        let last = messages.last().unwrap();
        assert_eq!(last.path(), Path::new("b.fast5"));
        match last {
            WorkerMessage::FileError { error, .. } => assert!(error.is_fatal()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_worker_stops_when_pool_closed() {
        let reader = MemoryReader::new();
        reader.insert("a.fast5", multi_read_container([ReadBuilder::new()]));

        let pool = CreditPool::new(0);
        pool.close();
        let (ctx, rx) = context(reader, &pool);
        Worker::spawn(0, vec![PathBuf::from("a.fast5")], ctx)
            .unwrap()
            .join()
            .unwrap();

        assert!(rx.try_iter().next().is_none());
    }
}
