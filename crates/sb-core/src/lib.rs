//! splat-bench core library.
//!
//! Round-trip benchmarking of Gaussian-splat compression codecs:
//! - `codec`: adapters over the external compressor tools
//! - `metrics`: size and fidelity measures between clouds
//! - `roundtrip`: one (scene, format) compress/decompress/evaluate run
//! - `stats`: per-scene records merged across runs
//! - `batch`: source tree walking and orchestration

pub mod batch;
pub mod cli;
pub mod codec;
pub mod collect;
pub mod exit_codes;
pub mod logging;
pub mod metrics;
pub mod roundtrip;
pub mod scene;
pub mod stats;

pub use batch::{BatchError, BatchOrchestrator, BatchSummary, SceneLayout};
pub use codec::{adapter_for, BuiltinCodecs, CodecAdapter, CodecError, CodecOutcome, CodecProvider};
pub use metrics::{evaluate, MetricError, MetricSet, PointCloud};
pub use roundtrip::{RoundTripPaths, RoundTripResult, RoundTripRunner};
pub use scene::{Scene, SceneKind};
pub use stats::{MergeOutcome, SceneStatsRecord, StatsAggregator, StatsError};
