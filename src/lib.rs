//! perf-issues
//!
//! Runtime diagnostics for long-lived processes: a crash-safe, append-only
//! event log backed by a fixed-size mapped file, and a correlation tracker
//! that attributes threads to the pools that spawned them and reports
//! threads that stop making progress.
//!
//! # Data flow
//!
//! - Interception adapters turn hook callbacks into [`Observation`]s.
//! - The tracker and watchdog turn observations into [`EventRecord`]s.
//! - Records are serialized once and queued on the single log writer.
//! - The writer rotates full buffers into compressed archives, offers them
//!   for upload and trims them to a byte budget.
//!
//! No call on an instrumented thread does more than a map update and an
//! enqueue. Faults inside the subsystem are logged and swallowed.

pub mod cli;
pub mod config;
pub mod observation;
pub mod record;
pub mod store;
pub mod telemetry;
pub mod tracker;
pub mod watchdog;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

pub use config::DiagnosticsConfig;
pub use observation::Observation;
pub use record::{Category, EventRecord, Payload, RecordSink, StackTrace};
pub use store::{LogStore, StoreError, Uploader};
pub use tracker::{CorrelationTracker, KeyAllocator, ObservedThread, PoolKey, ThreadKey, WorkerKey};
pub use watchdog::{DelayLoop, StallWatchdog, StackSampler};

#[derive(Debug, Error)]
pub enum DiagnosticsError {
    #[error("Log store failed to start: {0}")]
    Store(#[from] StoreError),
    #[error("Delay loop failed to start: {0}")]
    DelayLoop(#[source] std::io::Error),
}

/// The diagnostics subsystem for one process.
///
/// Owns the log writer, the delay loop, the tracker and the watchdog.
/// Built once at startup and passed to every interception adapter.
pub struct Diagnostics {
    config: DiagnosticsConfig,
    keys: KeyAllocator,
    store: Arc<LogStore>,
    delay_loop: Arc<DelayLoop>,
    tracker: CorrelationTracker,
    watchdog: StallWatchdog,
    running: AtomicBool,
}

impl Diagnostics {
    /// Start the log writer (which recovers the log directory first) and
    /// the delay loop.
    pub fn start(config: DiagnosticsConfig) -> Result<Self, DiagnosticsError> {
        let store = Arc::new(LogStore::open(config.store_settings())?);
        let delay_loop = Arc::new(
            DelayLoop::start("perf-issues-delay").map_err(DiagnosticsError::DelayLoop)?,
        );
        let sink: Arc<dyn RecordSink> = store.clone();
        let tracker = CorrelationTracker::new(Arc::clone(&sink));
        let watchdog = StallWatchdog::new(
            Arc::clone(&delay_loop),
            config.stall_grace,
            Arc::clone(&config.sampler),
            sink,
        );

        info!(
            log_dir = %store.dir().display(),
            buffer_size = config.buffer_size,
            max_cache_bytes = config.max_cache_bytes,
            stall_grace_ms = config.stall_grace.as_millis() as u64,
            "diagnostics started"
        );
        Ok(Self {
            config,
            keys: KeyAllocator::new(),
            store,
            delay_loop,
            tracker,
            watchdog,
            running: AtomicBool::new(true),
        })
    }

    /// Dispatch one intercepted fact. Never fails and never blocks on I/O.
    pub fn submit(&self, observation: Observation) {
        if !self.is_running() {
            debug!(kind = observation.kind(), "observation after shutdown ignored");
            return;
        }
        match observation {
            Observation::PoolCreated { pool, stack } => self.tracker.pool_created(pool, stack),
            Observation::WorkerLinked { worker, pool } => self.tracker.worker_created(worker, pool),
            Observation::ThreadLinked {
                worker,
                thread,
                stack,
            } => match thread {
                Some(thread) => self.tracker.link(thread, worker, stack),
                None => self.tracker.worker_thread_resolved(worker, None),
            },
            Observation::ThreadStarted {
                thread,
                name,
                stack,
            } => self.tracker.thread_started(thread, name, stack),
            Observation::ThreadExited { thread } => self.tracker.thread_exited(thread),
            Observation::WorkStarted { thread, stack } => {
                self.watchdog.work_started(&thread, stack)
            }
            Observation::WorkEnded { thread } => self.watchdog.work_ended(thread),
            Observation::PriorityChanged { thread_name, stack } => {
                self.watchdog.priority_changed(&thread_name, stack)
            }
        }
    }

    /// Persist a record built by instrumentation code.
    pub fn record(&self, record: &EventRecord) {
        record.print(self.store.as_ref());
    }

    /// Sink that writes to this instance's log.
    pub fn sink(&self) -> Arc<dyn RecordSink> {
        self.store.clone()
    }

    /// Issue a key and a watch handle for a thread.
    pub fn observe_thread(&self, name: impl Into<String>) -> Arc<ObservedThread> {
        ObservedThread::new(self.keys.thread(), name)
    }

    /// Mark the UI thread; the watchdog ignores work on it.
    pub fn designate_main_thread(&self, thread: ThreadKey) {
        self.watchdog.designate_main_thread(thread);
    }

    /// Block until everything submitted so far is on disk.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.store.sync()
    }

    /// Stop both background threads. Records already queued are written.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.watchdog.clear();
        self.delay_loop.shutdown();
        self.store.shutdown();
        self.tracker.clear();
        info!("diagnostics stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &DiagnosticsConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeyAllocator {
        &self.keys
    }

    pub fn tracker(&self) -> &CorrelationTracker {
        &self.tracker
    }

    pub fn watchdog(&self) -> &StallWatchdog {
        &self.watchdog
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }
}

impl Drop for Diagnostics {
    fn drop(&mut self) {
        self.shutdown();
    }
}
