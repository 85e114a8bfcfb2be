//! Handle for a live thread, owned by the interception adapter.

use std::sync::Arc;

use parking_lot::Mutex;

use super::ThreadKey;
use crate::record::StackTrace;

/// A thread as seen by the instrumentation.
///
/// The adapter keeps an `Arc` for as long as the native thread lives; the
/// stall watchdog only ever holds a `Weak`, so a finished thread is released
/// even while a check for it is still pending.
#[derive(Debug)]
pub struct ObservedThread {
    key: ThreadKey,
    name: String,
    last_stack: Mutex<Option<StackTrace>>,
}

impl ObservedThread {
    pub fn new(key: ThreadKey, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            key,
            name: name.into(),
            last_stack: Mutex::new(None),
        })
    }

    pub fn key(&self) -> ThreadKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record the most recent stack known for this thread.
    ///
    /// Samplers that cannot walk a foreign thread's stack fall back to this.
    pub fn publish_stack(&self, stack: StackTrace) {
        *self.last_stack.lock() = Some(stack);
    }

    pub fn last_stack(&self) -> Option<StackTrace> {
        self.last_stack.lock().clone()
    }
}
