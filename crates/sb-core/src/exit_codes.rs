//! Exit codes for the splat-bench CLI.
//!
//! Exit codes communicate the outcome without requiring output parsing.
//! A batch that ran exits `Clean` even when individual round trips failed;
//! the per-item outcome lives in the records and the summary.

use sb_common::Error;

/// Exit codes for splat-bench commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Command completed
    Clean = 0,

    /// A single round trip ran but failed
    RoundTripFailed = 1,

    /// Configuration error
    ConfigError = 10,

    /// Missing or unusable input/output path
    InputError = 11,

    /// Required codec tool not available
    CodecUnavailable = 12,

    /// I/O or record error
    IoError = 13,

    /// Internal/unknown error
    InternalError = 99,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean)
    }

    /// Check if this exit code indicates an error requiring attention.
    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Exit code for a CLI-level error, by error code category.
    pub fn for_error(err: &Error) -> Self {
        match err.code() {
            10..=19 => ExitCode::ConfigError,
            20..=29 => ExitCode::InputError,
            30..=39 => ExitCode::CodecUnavailable,
            40..=69 => ExitCode::IoError,
            _ => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}
