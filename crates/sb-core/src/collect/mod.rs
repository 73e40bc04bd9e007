//! Host and device information collection.

pub mod gpu;
pub mod host;

pub use gpu::{GpuDevice, GpuError, GpuSampler};
pub use host::HostInfo;
