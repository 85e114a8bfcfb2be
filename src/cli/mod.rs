//! Offline subcommands for the `perf-issues` binary.
//!
//! Everything here reads the log directory directly; nothing needs a
//! running process.
//!
//! ## Usage
//!
//! ```bash
//! perf-issues inspect [DIR] [--json]   # Summarize logs and archives
//! perf-issues replay [FILE|DIR]        # Print every recoverable record
//! perf-issues config show              # Effective configuration
//! ```

pub mod config_cmd;
pub mod inspect;
pub mod replay_cmd;

use std::path::PathBuf;

use crate::config;

/// Directory named on the command line, or the configured log directory.
pub fn resolve_dir(arg: Option<&str>) -> PathBuf {
    match arg {
        Some(path) => PathBuf::from(path),
        None => config::load().log_dir(),
    }
}

/// Split `args` into positional values and `--flags`.
pub fn split_args(args: &[String]) -> (Vec<&str>, Vec<&str>) {
    args.iter()
        .map(String::as_str)
        .partition(|arg| !arg.starts_with("--"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_separated_from_positionals() {
        let args: Vec<String> = ["/tmp/logs", "--json"].iter().map(|s| s.to_string()).collect();
        let (positional, flags) = split_args(&args);
        assert_eq!(positional, vec!["/tmp/logs"]);
        assert_eq!(flags, vec!["--json"]);
    }

    #[test]
    fn explicit_dir_wins() {
        assert_eq!(resolve_dir(Some("/var/log/x")), PathBuf::from("/var/log/x"));
    }
}
