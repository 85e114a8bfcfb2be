//! perf-issues entry point.
//!
//! Offline tooling for the diagnostics log directory.
//!
//! ## CLI Subcommands
//!
//! - `perf-issues inspect [DIR] [--json]` - Summarize logs and archives
//! - `perf-issues replay [FILE|DIR]` - Print recoverable records
//! - `perf-issues config [show|defaults|validate]` - Configuration

use std::process::ExitCode;

use perf_issues::cli::{config_cmd, inspect, replay_cmd, resolve_dir, split_args};
use perf_issues::telemetry::{init_logging, LogConfig};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");
    let rest = args.get(2..).unwrap_or(&[]);
    let (positional, flags) = split_args(rest);

    let verbose = flags.contains(&"--verbose");
    let log_config = LogConfig::pretty().with_level(if verbose { "debug" } else { "warn" });
    let log_config = LogConfig {
        echo_records: false,
        ..log_config
    };
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Logging disabled: {e}");
    }

    match command {
        "inspect" => {
            let dir = resolve_dir(positional.first().copied());
            let json = flags.contains(&"--json");
            ExitCode::from(inspect::run_inspect(&dir, json) as u8)
        }
        "replay" => {
            let target = resolve_dir(positional.first().copied());
            ExitCode::from(replay_cmd::run_replay(&target) as u8)
        }
        "config" => {
            let subcommand = positional.first().copied().unwrap_or("show");
            match subcommand {
                "show" => {
                    config_cmd::run_show(flags.contains(&"--json"));
                    ExitCode::SUCCESS
                }
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => ExitCode::from(config_cmd::run_validate() as u8),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_usage();
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("perf-issues {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "perf-issues - diagnostics log tooling v{}

USAGE:
    perf-issues <COMMAND> [ARGS] [OPTIONS]

COMMANDS:
    inspect [DIR]        Summarize logs and archives in DIR
    replay [FILE|DIR]    Print every recoverable record
    config show          Show effective configuration
    config defaults      Show default configuration
    config validate      Check configuration for problems
    version              Show version information
    help                 Show this help message

OPTIONS:
    --json       JSON output (inspect, config show)
    --verbose    Debug logging on stderr

DIR defaults to <PERF_ISSUES_CACHE_DIR>/perf_issues.

ENVIRONMENT:
    PERF_ISSUES_CACHE_DIR         Cache directory (default: system temp dir)
    PERF_ISSUES_MAX_CACHE_BYTES   Archive byte budget (default: 10485760)
    PERF_ISSUES_BUFFER_SIZE       Log buffer size (default: 1048576)
    PERF_ISSUES_STALL_GRACE_MS    Stall grace period (default: 1000)

EXIT CODES:
    0  Success
    1  Failure
",
        version
    );
}
