//! Semantic validation of benchmark configuration.

use serde::Serialize;
use thiserror::Error;

use crate::bench::{BenchConfig, ToolSettings};

/// Errors raised while loading or validating a config.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("unsupported config schema version: {0}")]
    UnsupportedVersion(String),
}

/// Outcome of validating a config: every problem found, not just the first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn push(&mut self, err: ValidationError) {
        self.errors.push(err.to_string());
    }

    /// Convert into the first error, if any.
    pub fn into_result(self) -> Result<(), ValidationError> {
        match self.errors.into_iter().next() {
            None => Ok(()),
            Some(first) => Err(ValidationError::InvalidValue {
                field: "config".to_string(),
                reason: first,
            }),
        }
    }
}

/// Validate a config for semantic consistency.
pub fn validate(config: &BenchConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if !config.schema_version.starts_with("1.") {
        result.push(ValidationError::UnsupportedVersion(
            config.schema_version.clone(),
        ));
    }

    for (name, tool) in [
        ("codecs.spz", &config.codecs.spz),
        ("codecs.sog", &config.codecs.sog),
        ("codecs.cply", &config.codecs.cply),
    ] {
        validate_tool(name, tool, &mut result);
    }

    let tolerance = config.metrics.identity_tolerance;
    if !(tolerance > 0.0 && tolerance <= 1.0) {
        result.push(ValidationError::InvalidValue {
            field: "metrics.identity_tolerance".to_string(),
            reason: format!("must be in (0, 1], got {tolerance}"),
        });
    }

    if config.gpu.sample_interval_ms == 0 {
        result.push(ValidationError::InvalidValue {
            field: "gpu.sample_interval_ms".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }

    let file_name = &config.record.file_name;
    if file_name.is_empty() || file_name.contains('/') || file_name.contains('\\') {
        result.push(ValidationError::InvalidValue {
            field: "record.file_name".to_string(),
            reason: format!("must be a plain file name, got '{file_name}'"),
        });
    }

    if config.scan.path_filter.iter().any(|f| f.is_empty()) {
        result.push(ValidationError::InvalidValue {
            field: "scan.path_filter".to_string(),
            reason: "filters must not be empty strings".to_string(),
        });
    }

    result
}

fn validate_tool(name: &str, tool: &ToolSettings, result: &mut ValidationResult) {
    if tool.binary.trim().is_empty() {
        result.push(ValidationError::InvalidValue {
            field: format!("{name}.binary"),
            reason: "must not be empty".to_string(),
        });
    }
    if tool.timeout_secs == Some(0) {
        result.push(ValidationError::InvalidValue {
            field: format!("{name}.timeout_secs"),
            reason: "must be greater than zero".to_string(),
        });
    }
}
