//! Diagnostic event records.
//!
//! An [`EventRecord`] is built on the thread that observed the event, then
//! finalized into its textual byte form exactly once. [`EventRecord::print`]
//! hands those bytes to a [`RecordSink`], normally the log store.

mod sink;
mod stack;

use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Local};

pub use sink::{MemorySink, RecordSink};
pub use stack::StackTrace;

/// Line that opens every formatted record block.
///
/// Blocks carry no length prefix, so offline replay splits on this marker.
pub const RECORD_SEPARATOR: &str = "\n=================================================\n";

/// Stand-in for a separator line that appears inside record text.
const ESCAPED_SEPARATOR: &str = "\n-------------------------------------------------\n";

/// Timestamp layout used in record bodies (millisecond precision).
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// What kind of problem a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    UiStall,
    FrameRate,
    CrossProcessCall,
    Thread,
    Image,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::UiStall => write!(f, "UI STALL"),
            Category::FrameRate => write!(f, "FRAME RATE"),
            Category::CrossProcessCall => write!(f, "CROSS PROCESS CALL"),
            Category::Thread => write!(f, "THREAD"),
            Category::Image => write!(f, "IMAGE"),
        }
    }
}

/// Opaque data carried by a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A single call stack.
    Frames(StackTrace),
    /// Several call stacks, e.g. one per thread.
    Stacks(Vec<StackTrace>),
    /// Free-form text.
    Text(String),
}

/// Kind-specific details rendered between the header lines and the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Section {
    Field { label: String, value: String },
    Trace { label: String, trace: StackTrace },
}

/// An immutable-once-finalized diagnostic fact.
#[derive(Debug)]
pub struct EventRecord {
    category: Category,
    message: String,
    created_at: DateTime<Local>,
    sections: Vec<Section>,
    payload: Option<Payload>,
    serialized: OnceLock<Arc<[u8]>>,
}

impl EventRecord {
    /// Create a record stamped with the current local time.
    pub fn new(category: Category, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            created_at: Local::now(),
            sections: Vec::new(),
            payload: None,
            serialized: OnceLock::new(),
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Append a `label: value` line.
    pub fn with_field(mut self, label: impl Into<String>, value: impl fmt::Display) -> Self {
        self.sections.push(Section::Field {
            label: label.into(),
            value: value.to_string(),
        });
        self
    }

    /// Append a labelled, tab-indented stack section.
    pub fn with_trace(mut self, label: impl Into<String>, trace: StackTrace) -> Self {
        self.sections.push(Section::Trace {
            label: label.into(),
            trace,
        });
        self
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn is_finalized(&self) -> bool {
        self.serialized.get().is_some()
    }

    /// Serialize the record, or return the bytes computed by an earlier call.
    ///
    /// Every call re-logs the formatted text; only the first one formats.
    pub fn finalize(&self) -> Arc<[u8]> {
        let bytes = Arc::clone(
            self.serialized
                .get_or_init(|| Arc::from(self.render().into_bytes())),
        );
        tracing::warn!(target: "perf_issues::record", "{}", String::from_utf8_lossy(&bytes));
        bytes
    }

    /// Finalize and hand the bytes to `sink`.
    pub fn print(&self, sink: &dyn RecordSink) {
        sink.submit(self.finalize());
    }

    fn render(&self) -> String {
        let mut out = String::with_capacity(256);
        push_line(&mut out, "category", &self.category);
        push_line(&mut out, "message", &self.message);
        push_line(
            &mut out,
            "created at",
            &self.created_at.format(CREATED_AT_FORMAT),
        );
        for section in &self.sections {
            match section {
                Section::Field { label, value } => push_line(&mut out, label, value),
                Section::Trace { label, trace } => {
                    out.push_str(label);
                    out.push_str(":\n");
                    push_frames(&mut out, trace);
                }
            }
        }
        match &self.payload {
            Some(Payload::Frames(trace)) => {
                out.push_str("trace:\n");
                push_frames(&mut out, trace);
            }
            Some(Payload::Stacks(traces)) => {
                for (index, trace) in traces.iter().enumerate() {
                    out.push_str(&format!("trace #{index}:\n"));
                    push_frames(&mut out, trace);
                }
            }
            Some(Payload::Text(text)) => push_line(&mut out, "data", text),
            None => {}
        }
        let body = escape_separators(out);
        let mut record = String::with_capacity(RECORD_SEPARATOR.len() + body.len());
        record.push_str(RECORD_SEPARATOR);
        record.push_str(&body);
        record
    }
}

/// Rewrite separator lines inside a record body so replay never splits a
/// record on text it carries.
///
/// Adjacent separator lines share a newline, so a single pass can leave a
/// new match behind; repeat until none is left.
fn escape_separators(mut body: String) -> String {
    while body.contains(RECORD_SEPARATOR) {
        body = body.replace(RECORD_SEPARATOR, ESCAPED_SEPARATOR);
    }
    body
}

fn push_line(out: &mut String, label: &str, value: &dyn fmt::Display) {
    out.push_str(label);
    out.push_str(": ");
    out.push_str(&value.to_string());
    out.push('\n');
}

fn push_frames(out: &mut String, trace: &StackTrace) {
    for frame in trace.frames() {
        out.push('\t');
        out.push_str(frame);
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(record: &EventRecord) -> String {
        String::from_utf8(record.finalize().to_vec()).unwrap()
    }

    #[test]
    fn category_display_names() {
        assert_eq!(Category::UiStall.to_string(), "UI STALL");
        assert_eq!(Category::CrossProcessCall.to_string(), "CROSS PROCESS CALL");
        assert_eq!(Category::Thread.to_string(), "THREAD");
    }

    #[test]
    fn render_starts_with_separator_and_header_lines() {
        let record = EventRecord::new(Category::Thread, "thread pool created");
        let body = text(&record);
        assert!(body.starts_with(RECORD_SEPARATOR));
        assert!(body.contains("category: THREAD\n"));
        assert!(body.contains("message: thread pool created\n"));
        assert!(body.contains("created at: "));
    }

    #[test]
    fn created_at_has_millisecond_precision() {
        let record = EventRecord::new(Category::Image, "decode");
        let body = text(&record);
        let line = body
            .lines()
            .find(|l| l.starts_with("created at: "))
            .unwrap();
        let stamp = line.trim_start_matches("created at: ");
        let (_, millis) = stamp.rsplit_once('.').unwrap();
        assert_eq!(millis.len(), 3);
    }

    #[test]
    fn sections_render_in_insertion_order() {
        let record = EventRecord::new(Category::Thread, "thread started")
            .with_field("thread name", "io-1")
            .with_trace("thread start trace", StackTrace::new(["main", "spawn"]));
        let body = text(&record);
        let name_at = body.find("thread name: io-1").unwrap();
        let trace_at = body.find("thread start trace:\n\tmain\n\tspawn\n").unwrap();
        assert!(name_at < trace_at);
    }

    #[test]
    fn payload_variants_render() {
        let frames = EventRecord::new(Category::UiStall, "stall")
            .with_payload(Payload::Frames(StackTrace::new(["a"])));
        assert!(text(&frames).ends_with("trace:\n\ta\n"));

        let many = EventRecord::new(Category::UiStall, "stall").with_payload(Payload::Stacks(vec![
            StackTrace::new(["a"]),
            StackTrace::new(["b"]),
        ]));
        assert!(text(&many).contains("trace #0:\n\ta\ntrace #1:\n\tb\n"));

        let data = EventRecord::new(Category::FrameRate, "fps")
            .with_payload(Payload::Text("42 dropped".into()));
        assert!(text(&data).ends_with("data: 42 dropped\n"));
    }

    #[test]
    fn separator_inside_text_is_escaped() {
        let payload = format!("before{RECORD_SEPARATOR}{}after", &RECORD_SEPARATOR[1..]);
        let record = EventRecord::new(Category::CrossProcessCall, format!("call{RECORD_SEPARATOR}x"))
            .with_payload(Payload::Text(payload));
        let body = text(&record);

        assert_eq!(body.matches(RECORD_SEPARATOR).count(), 1);
        assert!(body.starts_with(RECORD_SEPARATOR));
        assert!(body.contains(&format!("message: call{ESCAPED_SEPARATOR}x\n")));
        assert!(body.contains("after\n"));
    }

    #[test]
    fn finalize_is_memoized() {
        let record = EventRecord::new(Category::Thread, "once");
        assert!(!record.is_finalized());
        let first = record.finalize();
        assert!(record.is_finalized());
        let second = record.finalize();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn print_submits_cached_bytes() {
        let sink = MemorySink::new();
        let record = EventRecord::new(Category::Thread, "printed");
        record.print(&sink);
        record.print(&sink);
        let submitted = sink.raw();
        assert_eq!(submitted.len(), 2);
        assert!(Arc::ptr_eq(&submitted[0], &submitted[1]));
    }
}
