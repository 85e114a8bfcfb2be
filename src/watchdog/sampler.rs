//! Stack capture for stalled threads.

use crate::record::StackTrace;
use crate::tracker::ObservedThread;

/// Captures the current stack of another thread.
///
/// Walking a foreign thread's stack is a host platform service; the core
/// only asks for it when a stall check fires.
pub trait StackSampler: Send + Sync {
    fn sample(&self, thread: &ObservedThread) -> StackTrace;
}

/// Returns the last stack published for the thread.
///
/// Every unit of work publishes its work-start snapshot, so a stalled thread
/// reports at least the stack its current work was entered from. Adapters
/// that can walk the thread later publish fresher stacks on top.
#[derive(Debug, Default, Clone, Copy)]
pub struct PublishedStackSampler;

impl StackSampler for PublishedStackSampler {
    fn sample(&self, thread: &ObservedThread) -> StackTrace {
        thread.last_stack().unwrap_or_default()
    }
}
