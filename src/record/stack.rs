//! Immutable stack snapshots attached to diagnostic records.

use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;

/// An ordered, immutable list of stack frames.
///
/// Cloning is cheap: the frames are shared, so a trace captured once can be
/// stored on a tracker record and embedded in several emitted events.
#[derive(Clone, PartialEq, Eq)]
pub struct StackTrace {
    frames: Arc<[String]>,
}

impl StackTrace {
    /// Build a trace from already-rendered frames.
    pub fn new<I, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let frames: Vec<String> = frames.into_iter().map(Into::into).collect();
        Self { frames: frames.into() }
    }

    /// A trace with no frames.
    pub fn empty() -> Self {
        Self::new(Vec::<String>::new())
    }

    /// Capture the calling thread's stack.
    ///
    /// Resolution cost is paid here, so adapters should only call this on
    /// interception points that are already allowed to be slow.
    pub fn capture() -> Self {
        let rendered = Backtrace::force_capture().to_string();
        Self::new(
            rendered
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty()),
        )
    }

    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Default for StackTrace {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackTrace")
            .field("frames", &self.frames.len())
            .finish()
    }
}
