//! splat-bench configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for the benchmark config file
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation

pub mod bench;
pub mod resolve;
pub mod validate;

pub use bench::{
    BenchConfig, CodecSettings, GpuSettings, MatchStrategy, MetricSettings, RecordSettings,
    ScanSettings, ToolSettings,
};
pub use resolve::{load_unvalidated, resolve_config, ConfigSource, ResolvedConfig, CONFIG_ENV_VAR};
pub use validate::{ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
