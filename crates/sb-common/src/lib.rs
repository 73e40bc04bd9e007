//! splat-bench common types, IDs, and errors.
//!
//! This crate provides foundational types shared across sb-core modules:
//! - The closed set of benchmarked compression formats
//! - Scene and run identity types
//! - Record schema versioning
//! - Common error types
//! - Output formats

pub mod error;
pub mod format;
pub mod id;
pub mod output;
pub mod schema;

pub use error::{Error, Result};
pub use format::CompressionFormat;
pub use id::{RunId, SceneId};
pub use output::OutputFormat;
pub use schema::RECORD_SCHEMA_VERSION;
