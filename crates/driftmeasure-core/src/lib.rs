//! Driftmeasure Core - Peak-window drift analysis engine
//!
//! Measures timing drift between audio channels. One reference channel
//! carries periodic calibration pulses; for every other channel the engine
//! reports how many nanoseconds its pulse peak is shifted relative to the
//! reference peak, as a stream of CSV records.

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;

pub use audio::analyzer::DriftAnalyzer;
pub use audio::record::{max_line_len, RecordSink, WriterSink};
pub use config::{DriftConfig, Segment, SegmentFormat, StreamFormat, UndetectedPeakHandling};
pub use engine::DriftMeasure;
pub use error::{DriftError, EmissionError};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Date the core library was built
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Nanoseconds per second
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;
