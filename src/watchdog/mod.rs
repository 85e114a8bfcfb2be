//! Stall detection for units of work running on tracked threads.
//!
//! Every unit of work that starts schedules a one-shot check on the delay
//! loop. If the work has not ended when the grace period elapses, the
//! thread's stack is captured and recorded as a stall.

mod delay_loop;
mod sampler;

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use delay_loop::DelayLoop;
pub use sampler::{PublishedStackSampler, StackSampler};

use crate::record::{Category, EventRecord, Payload, RecordSink, StackTrace};
use crate::telemetry;
use crate::tracker::{ObservedThread, ThreadKey};

/// Schedules and cancels per-thread stall checks.
pub struct StallWatchdog {
    pending: DashMap<ThreadKey, CancellationToken>,
    main_thread: RwLock<Option<ThreadKey>>,
    delay_loop: Arc<DelayLoop>,
    grace: Duration,
    sampler: Arc<dyn StackSampler>,
    sink: Arc<dyn RecordSink>,
}

impl StallWatchdog {
    pub fn new(
        delay_loop: Arc<DelayLoop>,
        grace: Duration,
        sampler: Arc<dyn StackSampler>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            pending: DashMap::new(),
            main_thread: RwLock::new(None),
            delay_loop,
            grace,
            sampler,
            sink,
        }
    }

    /// Mark the UI thread. Work on it is never watched.
    pub fn designate_main_thread(&self, thread: ThreadKey) {
        *self.main_thread.write() = Some(thread);
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// A unit of work is about to run on `thread`, entered from `stack`.
    ///
    /// The stack becomes the thread's published snapshot, so a stall check
    /// has something to report even when nothing publishes a fresher one.
    pub fn work_started(&self, thread: &Arc<ObservedThread>, stack: StackTrace) {
        let key = thread.key();
        if *self.main_thread.read() == Some(key) {
            debug!(thread = %key, "work on main thread; not watched");
            return;
        }
        thread.publish_stack(stack);
        // Threads that reuse their run body start new work without ending
        // the previous one.
        if let Some((_, stale)) = self.pending.remove(&key) {
            debug!(thread = %key, "replacing stale stall check");
            stale.cancel();
        }

        let target = Arc::downgrade(thread);
        let sampler = Arc::clone(&self.sampler);
        let sink = Arc::clone(&self.sink);
        let check = self.delay_loop.schedule(self.grace, move || {
            check_stall(target, sampler.as_ref(), sink.as_ref());
        });
        self.pending.insert(key, check);
        debug!(thread = %key, pending = self.pending.len(), grace_ms = self.grace.as_millis() as u64, "stall check scheduled");
    }

    /// The unit of work on `thread` returned.
    pub fn work_ended(&self, thread: ThreadKey) {
        match self.pending.remove(&thread) {
            Some((_, check)) => check.cancel(),
            None => warn!(thread = %thread, "work ended without a pending stall check"),
        }
    }

    /// The priority of `thread_name` is changing; record where from.
    pub fn priority_changed(&self, thread_name: &str, stack: StackTrace) {
        EventRecord::new(Category::Thread, "thread priority changed")
            .with_field("thread name", thread_name)
            .with_payload(Payload::Frames(stack))
            .print(self.sink.as_ref());
    }

    pub fn pending_checks(&self) -> usize {
        self.pending.len()
    }

    /// Cancel every pending check.
    pub fn clear(&self) {
        self.pending.retain(|_, check| {
            check.cancel();
            false
        });
    }
}

fn check_stall(target: Weak<ObservedThread>, sampler: &dyn StackSampler, sink: &dyn RecordSink) {
    let Some(thread) = target.upgrade() else {
        debug!("stalled thread already released");
        return;
    };
    let stack = sampler.sample(&thread);
    telemetry::record_stall();
    EventRecord::new(Category::Thread, "thread run stalled")
        .with_field("thread key", thread.key())
        .with_field("thread name", thread.name())
        .with_payload(Payload::Frames(stack))
        .print(sink);
}
