//! Structured logging setup.
//!
//! Logs go to stderr so stdout stays parseable in `--format json` mode.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Environment variable with a tracing filter directive, e.g. `sb_core=debug`.
pub const LOG_ENV_VAR: &str = "SPLAT_BENCH_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Level implied by `-v`/`-q` when no filter variable is set.
pub fn default_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// `SPLAT_BENCH_LOG`, then `RUST_LOG`, then the flag-derived level.
pub fn build_filter(verbose: u8, quiet: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbose, quiet)))
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(format: LogFormat, verbose: u8, quiet: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbose, quiet))
        .with_writer(std::io::stderr)
        .with_target(false);
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
