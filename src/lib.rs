//! Driftmeasure - audio channel drift measurement
//!
//! This library re-exports the drift analysis engine from
//! `driftmeasure-core` and adds the pieces used by the command line tool:
//! persistent configuration, raw frame input and (optionally) live capture.

pub mod config;
pub mod input;

#[cfg(feature = "capture")]
pub mod capture;

pub use driftmeasure_core::audio;
pub use driftmeasure_core::error;

pub use driftmeasure_core::{
    max_line_len, DriftAnalyzer, DriftConfig, DriftError, DriftMeasure, EmissionError,
    RecordSink, Segment, SegmentFormat, StreamFormat, UndetectedPeakHandling, WriterSink,
};
pub use driftmeasure_core::{BUILD_DATE, VERSION};
