//! Credit-based flow control between workers and the writer
//!
//! A credit buys a worker the right to *start* one input file. Credits are
//! handed back by the orchestrator once per message it has finished
//! consuming (each batch written, each file completed or failed), never by
//! workers. A worker producing many batches for a large file therefore earns
//! credits back as fast as the writer keeps up with it, while a slow writer
//! leaves workers parked at their next per-file [`CreditHandle::acquire`].
//!
//! ```text
//!   orchestrator ── release() ──▶ ┌─────────────┐ ◀── acquire() ── worker 1
//!   (after write)                 │ CreditPool  │ ◀── acquire() ── worker 2
//!                                 │  counting   │ ◀── acquire() ── worker N
//!                                 │  semaphore  │
//!                                 └─────────────┘
//! ```
//!
//! Waiting longer than the staleness timeout is a stall, not a retry.

use crate::error::FlowError;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Initial credits per worker
pub const CREDITS_PER_WORKER: usize = 3;

/// Statistics for the credit pool
#[derive(Debug, Default)]
pub struct CreditStats {
    /// Credits taken by workers
    pub acquired: AtomicU64,

    /// Credits returned by the orchestrator
    pub released: AtomicU64,

    /// Number of acquires that had to wait
    pub waits: AtomicU64,
}

impl CreditStats {
    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    pub fn waits(&self) -> u64 {
        self.waits.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct PoolState {
    credits: usize,
    closed: bool,
}

#[derive(Debug)]
struct PoolInner {
    state: Mutex<PoolState>,
    available: Condvar,
    stats: CreditStats,
}

/// Counting semaphore owned by the orchestrator
#[derive(Debug)]
pub struct CreditPool {
    inner: Arc<PoolInner>,
    initial: usize,
}

impl CreditPool {
    /// Create a pool seeded with `initial` credits
    pub fn new(initial: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    credits: initial,
                    closed: false,
                }),
                available: Condvar::new(),
                stats: CreditStats::default(),
            }),
            initial,
        }
    }

    /// Create a pool sized for `workers` workers
    pub fn for_workers(workers: usize) -> Self {
        Self::new(workers * CREDITS_PER_WORKER)
    }

    /// Get an acquire-only handle for a worker
    pub fn handle(&self) -> CreditHandle {
        CreditHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Return one credit and wake a waiting worker
    pub fn release(&self) {
        let mut state = self.inner.state.lock();
        state.credits += 1;
        drop(state);

        self.inner.stats.released.fetch_add(1, Ordering::Relaxed);
        self.inner.available.notify_one();
    }

    /// Close the pool; every current and future acquire fails with `Closed`
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.available.notify_all();
    }

    /// Credits currently available
    pub fn available(&self) -> usize {
        self.inner.state.lock().credits
    }

    /// Credits the pool was seeded with
    pub fn initial(&self) -> usize {
        self.initial
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    pub fn stats(&self) -> &CreditStats {
        &self.inner.stats
    }
}

/// Worker side of the pool: can only take credits
#[derive(Debug, Clone)]
pub struct CreditHandle {
    inner: Arc<PoolInner>,
}

impl CreditHandle {
    /// Take one credit, waiting at most `timeout`
    pub fn acquire(&self, timeout: Duration) -> Result<(), FlowError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        let mut waited = false;
        let mut timed_out = false;

        loop {
            if state.closed {
                return Err(FlowError::Closed);
            }

            if state.credits > 0 {
                state.credits -= 1;
                self.inner.stats.acquired.fetch_add(1, Ordering::Relaxed);
                if waited {
                    self.inner.stats.waits.fetch_add(1, Ordering::Relaxed);
                }
                return Ok(());
            }

            if timed_out {
                return Err(FlowError::Stalled { waited: timeout });
            }

            waited = true;
            timed_out = self
                .inner
                .available
                .wait_until(&mut state, deadline)
                .timed_out();
        }
    }
}
