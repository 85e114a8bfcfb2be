//! Telemetry for the diagnostics core itself.
//!
//! Internal faults and lifecycle events go through `tracing`; counters go
//! through the `metrics` facade and cost nothing until a recorder is installed.

mod logging;
mod metrics;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    record_archive, record_dropped, record_rotation, record_stall, record_upload, record_written,
    DropReason, Outcome,
};
