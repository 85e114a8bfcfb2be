//! Diagnostics configuration.
//!
//! Hosts build a [`DiagnosticsConfig`] directly or load one from
//! `PERF_ISSUES_*` environment variables. Invalid values fall back to
//! defaults without failing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `PERF_ISSUES_CACHE_DIR` | system temp dir | Parent of the `perf_issues` log dir |
//! | `PERF_ISSUES_MAX_CACHE_BYTES` | 10485760 | Byte budget for archives |
//! | `PERF_ISSUES_BUFFER_SIZE` | 1048576 | Log buffer size (floor 4096) |
//! | `PERF_ISSUES_STALL_GRACE_MS` | 1000 | Stall grace period (floor 10) |

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::store::{NoopUploader, StoreSettings, Uploader, LOG_DIR_NAME, MIN_BUFFER_SIZE};
use crate::watchdog::{PublishedStackSampler, StackSampler};

pub const DEFAULT_MAX_CACHE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;
pub const DEFAULT_STALL_GRACE: Duration = Duration::from_millis(1000);
const MIN_STALL_GRACE: Duration = Duration::from_millis(10);

/// Supplies the application cache directory.
pub type CacheDirSupplier = Arc<dyn Fn() -> PathBuf + Send + Sync>;

#[derive(Clone)]
pub struct DiagnosticsConfig {
    pub cache_dir: CacheDirSupplier,
    pub max_cache_bytes: u64,
    pub buffer_size: usize,
    pub stall_grace: Duration,
    pub uploader: Arc<dyn Uploader>,
    pub sampler: Arc<dyn StackSampler>,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            cache_dir: Arc::new(std::env::temp_dir),
            max_cache_bytes: DEFAULT_MAX_CACHE_BYTES,
            buffer_size: DEFAULT_BUFFER_SIZE,
            stall_grace: DEFAULT_STALL_GRACE,
            uploader: Arc::new(NoopUploader),
            sampler: Arc::new(PublishedStackSampler),
        }
    }
}

impl fmt::Debug for DiagnosticsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticsConfig")
            .field("log_dir", &self.log_dir())
            .field("max_cache_bytes", &self.max_cache_bytes)
            .field("buffer_size", &self.buffer_size)
            .field("stall_grace", &self.stall_grace)
            .finish_non_exhaustive()
    }
}

impl DiagnosticsConfig {
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.cache_dir = Arc::new(move || dir.clone());
        self
    }

    pub fn with_cache_dir_supplier(mut self, supplier: CacheDirSupplier) -> Self {
        self.cache_dir = supplier;
        self
    }

    pub fn with_max_cache_bytes(mut self, bytes: u64) -> Self {
        self.max_cache_bytes = bytes;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_stall_grace(mut self, grace: Duration) -> Self {
        self.stall_grace = grace;
        self
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploader = uploader;
        self
    }

    pub fn with_sampler(mut self, sampler: Arc<dyn StackSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// `<cache dir>/perf_issues`
    pub fn log_dir(&self) -> PathBuf {
        (self.cache_dir)().join(LOG_DIR_NAME)
    }

    pub(crate) fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            dir: self.log_dir(),
            buffer_size: self.buffer_size,
            max_cache_bytes: self.max_cache_bytes,
            uploader: Arc::clone(&self.uploader),
        }
    }

    /// Serializable summary of the effective values.
    pub fn effective(&self) -> EffectiveConfig {
        EffectiveConfig {
            log_dir: self.log_dir(),
            max_cache_bytes: self.max_cache_bytes,
            buffer_size: self.buffer_size,
            stall_grace_ms: self.stall_grace.as_millis() as u64,
        }
    }
}

/// Effective configuration summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveConfig {
    pub log_dir: PathBuf,
    pub max_cache_bytes: u64,
    pub buffer_size: usize,
    pub stall_grace_ms: u64,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Load configuration from environment, defaults for everything else.
pub fn load() -> DiagnosticsConfig {
    let mut config = DiagnosticsConfig::default();
    if let Some(dir) = std::env::var_os("PERF_ISSUES_CACHE_DIR").filter(|d| !d.is_empty()) {
        config = config.with_cache_dir(PathBuf::from(dir));
    }
    config.max_cache_bytes = parse_u64("PERF_ISSUES_MAX_CACHE_BYTES", DEFAULT_MAX_CACHE_BYTES);
    config.buffer_size =
        parse_usize("PERF_ISSUES_BUFFER_SIZE", DEFAULT_BUFFER_SIZE).max(MIN_BUFFER_SIZE);
    let grace_ms = parse_u64(
        "PERF_ISSUES_STALL_GRACE_MS",
        DEFAULT_STALL_GRACE.as_millis() as u64,
    );
    config.stall_grace = Duration::from_millis(grace_ms).max(MIN_STALL_GRACE);
    config
}
