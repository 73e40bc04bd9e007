//! Record schema versioning and compatibility.

/// Current schema version of `compression_stats.json` records.
///
/// Follows semver: MAJOR.MINOR.PATCH
/// - MAJOR: Breaking changes (field removals, type changes)
/// - MINOR: Additive changes (new optional fields)
/// - PATCH: Bug fixes, documentation
pub const RECORD_SCHEMA_VERSION: &str = "1.0.0";

/// Check if a record schema version can be merged into by this build.
pub fn is_compatible(version: &str) -> bool {
    match major(version) {
        Some(other) => Some(other) == major(RECORD_SCHEMA_VERSION),
        None => false,
    }
}

fn major(version: &str) -> Option<u32> {
    version.split('.').next().and_then(|s| s.parse::<u32>().ok())
}
