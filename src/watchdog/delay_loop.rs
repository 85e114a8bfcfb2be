//! Dedicated single-threaded loop for delayed callbacks.
//!
//! Runs a current-thread tokio runtime on its own OS thread, separate from
//! the log writer, so checks fire on time even while the writer is busy
//! compressing files.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle};
use tokio_util::sync::CancellationToken;

/// Owner of the delay thread.
pub struct DelayLoop {
    handle: Handle,
    shutdown: CancellationToken,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DelayLoop {
    /// Spawn the loop thread with the given name.
    pub fn start(name: &str) -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_time().build()?;
        let handle = runtime.handle().clone();
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                runtime.block_on(stop.cancelled());
                tracing::debug!("delay loop stopped");
            })?;

        Ok(Self {
            handle,
            shutdown,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Run `task` on the loop after `delay`.
    ///
    /// Cancelling the returned token before the delay elapses discards the
    /// task. Once the task has begun it runs to completion.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> CancellationToken
    where
        F: FnOnce() + Send + 'static,
    {
        let token = self.shutdown.child_token();
        if self.shutdown.is_cancelled() {
            return token;
        }
        let cancelled = token.clone();
        self.handle.spawn(async move {
            tokio::select! {
                biased;
                () = cancelled.cancelled() => {}
                () = tokio::time::sleep(delay) => task(),
            }
        });
        token
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Stop the loop, discarding every pending task, and join its thread.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                tracing::error!("delay loop thread panicked");
            }
        }
    }
}

impl Drop for DelayLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn scheduled_task_runs_after_delay() {
        let delay_loop = DelayLoop::start("test-delay").unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        delay_loop.schedule(Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_task_never_runs() {
        let delay_loop = DelayLoop::start("test-delay").unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        let token = delay_loop.schedule(Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        token.cancel();

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn shutdown_discards_pending_tasks() {
        let delay_loop = DelayLoop::start("test-delay").unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        delay_loop.schedule(Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        delay_loop.shutdown();
        assert!(!delay_loop.is_running());

        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
