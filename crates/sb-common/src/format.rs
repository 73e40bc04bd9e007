//! The closed set of benchmarked compression formats.

use clap::ValueEnum;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A compression format supported by the harness.
///
/// Each variant maps to exactly one codec adapter in sb-core and one
/// canonical artifact extension.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
    ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum CompressionFormat {
    /// Niantic SPZ.
    Spz,
    /// PlayCanvas SOG (self-organizing gaussians).
    Sog,
    /// PlayCanvas compressed PLY (256-splat quantized chunks).
    Cply,
}

impl CompressionFormat {
    /// All formats, in registry order.
    pub const ALL: [CompressionFormat; 3] = [
        CompressionFormat::Spz,
        CompressionFormat::Sog,
        CompressionFormat::Cply,
    ];

    /// Stable lowercase name used as the record key.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionFormat::Spz => "spz",
            CompressionFormat::Sog => "sog",
            CompressionFormat::Cply => "cply",
        }
    }

    /// Canonical extension of the compressed artifact (without the dot).
    pub fn extension(&self) -> &'static str {
        match self {
            CompressionFormat::Spz => "spz",
            CompressionFormat::Sog => "sog",
            CompressionFormat::Cply => "cply",
        }
    }
}

impl fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spz" => Ok(CompressionFormat::Spz),
            "sog" => Ok(CompressionFormat::Sog),
            "cply" | "compressed-ply" | "compressed_ply" => Ok(CompressionFormat::Cply),
            other => Err(format!("unknown compression format '{other}'")),
        }
    }
}
