//! Core math modules.

pub mod quality;
pub mod stats;
