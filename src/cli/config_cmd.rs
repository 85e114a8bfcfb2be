//! Config subcommands: show, defaults, validate.

use crate::config::{self, EffectiveConfig, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_CACHE_BYTES, DEFAULT_STALL_GRACE};

/// Print effective config as key-value pairs to stdout.
pub fn run_show(json: bool) {
    let cfg = config::load().effective();
    if json {
        match serde_json::to_string_pretty(&cfg) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("Failed to encode config: {e}"),
        }
    } else {
        print_config(&cfg);
    }
}

/// Print default values (no env overrides) to stdout.
pub fn run_defaults() {
    println!("PERF_ISSUES_CACHE_DIR={}", std::env::temp_dir().display());
    println!("PERF_ISSUES_MAX_CACHE_BYTES={DEFAULT_MAX_CACHE_BYTES}");
    println!("PERF_ISSUES_BUFFER_SIZE={DEFAULT_BUFFER_SIZE}");
    println!("PERF_ISSUES_STALL_GRACE_MS={}", DEFAULT_STALL_GRACE.as_millis());
}

/// Check for settings that make the log useless.
///
/// Returns 0 if valid, 1 if any warnings are found.
pub fn run_validate() -> i32 {
    let cfg = config::load().effective();
    let warnings = validate(&cfg);
    for warning in &warnings {
        eprintln!("WARNING: {warning}");
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

fn validate(cfg: &EffectiveConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if cfg.max_cache_bytes < cfg.buffer_size as u64 {
        warnings.push(format!(
            "PERF_ISSUES_MAX_CACHE_BYTES ({}) < PERF_ISSUES_BUFFER_SIZE ({}); archives are evicted as soon as they are written",
            cfg.max_cache_bytes, cfg.buffer_size
        ));
    }
    if cfg.log_dir.exists() && !cfg.log_dir.is_dir() {
        warnings.push(format!("{} exists and is not a directory", cfg.log_dir.display()));
    }
    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    println!("log_dir={}", cfg.log_dir.display());
    println!("PERF_ISSUES_MAX_CACHE_BYTES={}", cfg.max_cache_bytes);
    println!("PERF_ISSUES_BUFFER_SIZE={}", cfg.buffer_size);
    println!("PERF_ISSUES_STALL_GRACE_MS={}", cfg.stall_grace_ms);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn effective(max_cache_bytes: u64, buffer_size: usize) -> EffectiveConfig {
        EffectiveConfig {
            log_dir: PathBuf::from("/nonexistent/perf_issues"),
            max_cache_bytes,
            buffer_size,
            stall_grace_ms: 1000,
        }
    }

    #[test]
    fn budget_below_buffer_warns() {
        assert_eq!(validate(&effective(1024, 4096)).len(), 1);
        assert!(validate(&effective(1 << 20, 4096)).is_empty());
    }
}
