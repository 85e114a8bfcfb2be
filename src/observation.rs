//! Facts delivered by interception adapters.

use std::sync::Arc;

use crate::record::StackTrace;
use crate::tracker::{ObservedThread, PoolKey, ThreadKey, WorkerKey};

/// One intercepted call, as seen by the diagnostics core.
///
/// Adapters translate their hook callbacks into these and hand them to
/// [`Diagnostics::submit`](crate::Diagnostics::submit).
#[derive(Debug, Clone)]
pub enum Observation {
    /// A pool is being constructed; `stack` is the caller's stack.
    PoolCreated { pool: PoolKey, stack: StackTrace },
    /// A worker slot owned by `pool` is being constructed.
    WorkerLinked { worker: WorkerKey, pool: PoolKey },
    /// A worker slot finished construction. `thread` is `None` when the
    /// slot's thread could not be read. `stack` stands in for the pool's
    /// create trace if the pool predates tracking.
    ThreadLinked {
        worker: WorkerKey,
        thread: Option<ThreadKey>,
        stack: Option<StackTrace>,
    },
    ThreadStarted {
        thread: ThreadKey,
        name: String,
        stack: StackTrace,
    },
    ThreadExited { thread: ThreadKey },
    /// A unit of work is about to run on `thread`. `stack` is captured at
    /// the call site and reported if the work stalls.
    WorkStarted {
        thread: Arc<ObservedThread>,
        stack: StackTrace,
    },
    WorkEnded { thread: ThreadKey },
    PriorityChanged { thread_name: String, stack: StackTrace },
}

impl Observation {
    pub fn kind(&self) -> &'static str {
        match self {
            Observation::PoolCreated { .. } => "pool_created",
            Observation::WorkerLinked { .. } => "worker_linked",
            Observation::ThreadLinked { .. } => "thread_linked",
            Observation::ThreadStarted { .. } => "thread_started",
            Observation::ThreadExited { .. } => "thread_exited",
            Observation::WorkStarted { .. } => "work_started",
            Observation::WorkEnded { .. } => "work_ended",
            Observation::PriorityChanged { .. } => "priority_changed",
        }
    }
}
