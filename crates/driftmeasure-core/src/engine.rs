//! Shared, lock-guarded drift measurement engine
//!
//! Configuration updates and batch processing go through one mutex so that
//! a reconfiguration can never interleave with a half-done analysis step.
//! The lock is released while a record is handed to the output sink, since
//! the sink may block or call back into the engine.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::audio::analyzer::{DriftAnalyzer, Mode, Step};
use crate::audio::dataset::Dataset;
use crate::audio::record::RecordSink;
use crate::config::{DriftConfig, Segment, StreamFormat};
use crate::error::DriftError;

/// Cloneable handle to a drift measurement engine
///
/// # Example
/// ```
/// use driftmeasure_core::{DriftConfig, DriftMeasure, StreamFormat};
///
/// let engine = DriftMeasure::new(DriftConfig::default()).unwrap();
/// engine.set_format(StreamFormat::interleaved(2, 48000)).unwrap();
///
/// let mut records: Vec<String> = Vec::new();
/// let emitted = engine.process(&vec![0.0; 2 * 4800], &mut records).unwrap();
/// assert_eq!(emitted, 0);
/// ```
#[derive(Debug, Clone)]
pub struct DriftMeasure {
    inner: Arc<Mutex<DriftAnalyzer>>,
}

impl DriftMeasure {
    /// Create an engine with the given configuration
    pub fn new(config: DriftConfig) -> Result<Self, DriftError> {
        Ok(Self {
            inner: Arc::new(Mutex::new(DriftAnalyzer::new(config)?)),
        })
    }

    fn state(&self) -> MutexGuard<'_, DriftAnalyzer> {
        // A panic while holding the lock is an invariant violation that has
        // already been reported; the analyzer itself is still structurally valid
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current configuration
    pub fn config(&self) -> DriftConfig {
        self.state().config().clone()
    }

    /// Replace the configuration (see [`DriftAnalyzer::set_config`])
    pub fn set_config(&self, config: DriftConfig) -> Result<(), DriftError> {
        self.state().set_config(config)
    }

    /// Modify a copy of the current configuration and apply it
    pub fn update_config<F>(&self, update: F) -> Result<(), DriftError>
    where
        F: FnOnce(&mut DriftConfig),
    {
        let mut state = self.state();
        let mut config = state.config().clone();
        update(&mut config);
        state.set_config(config)
    }

    /// Apply a format change notification
    pub fn set_format(&self, format: StreamFormat) -> Result<(), DriftError> {
        self.state().set_format(format)
    }

    pub fn format(&self) -> Option<StreamFormat> {
        self.state().format()
    }

    /// Apply a time base notification
    pub fn set_segment(&self, segment: Segment) {
        self.state().set_segment(segment)
    }

    /// Discontinuity: drop history and return to search mode
    pub fn flush(&self) {
        self.state().flush()
    }

    pub fn end_of_stream(&self) {
        self.state().end_of_stream()
    }

    pub fn teardown(&self) {
        self.state().teardown()
    }

    pub fn mode(&self) -> Mode {
        self.state().mode()
    }

    /// Copy of the most recently completed dataset
    pub fn last_dataset(&self) -> Option<Dataset> {
        self.state().last_dataset().cloned()
    }

    /// Absolute frame position of the history head and frames held
    pub fn history_span(&self) -> Option<(u64, usize)> {
        self.state()
            .history()
            .map(|h| (h.position(), h.available()))
    }

    /// Process one batch of interleaved frames
    ///
    /// Runs the analysis until no further progress is possible with the
    /// frames received so far. Returns the number of records emitted.
    ///
    /// If `sink` rejects a record, processing stops with
    /// [`DriftError::Emission`] and that record is dropped: the analyzed
    /// pulse has already been discarded and is not retried. Frames still in
    /// the history are analyzed on the next call.
    pub fn process<S: RecordSink>(&self, frames: &[f32], mut sink: S) -> Result<usize, DriftError> {
        self.state().push(frames)?;

        let mut emitted = 0;
        loop {
            let step = self.state().step()?;
            match step {
                Step::Progress => {}
                Step::Idle => break,
                Step::Record(line) => {
                    // Lock is not held here
                    let result = sink.push_record(&line);
                    self.state().recycle(line);
                    if let Err(e) = result {
                        tracing::error!(error = %e, "record_emission_failed");
                        return Err(e.into());
                    }
                    emitted += 1;
                }
            }
        }

        tracing::trace!(emitted, "batch_processed");
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmissionError;

    fn pulse_batch() -> Vec<f32> {
        let mut data = vec![0.0f32; 48000 * 2];
        data[24000 * 2] = 0.9;
        data[24048 * 2 + 1] = 0.8;
        data
    }

    /// Sink that reconfigures the engine while a record is being emitted
    struct ReentrantSink {
        engine: DriftMeasure,
        lines: Vec<String>,
    }

    impl RecordSink for ReentrantSink {
        fn push_record(&mut self, line: &[u8]) -> Result<(), EmissionError> {
            self.lines.push(String::from_utf8_lossy(line).into_owned());
            self.engine
                .update_config(|c| c.undetected_peak_fill_value = 5)
                .map_err(|e| EmissionError::Io(e.to_string()))
        }
    }

    #[test]
    fn test_process_emits_record() {
        let engine = DriftMeasure::new(DriftConfig::default()).unwrap();
        engine.set_format(StreamFormat::interleaved(2, 48000)).unwrap();

        let mut records: Vec<String> = Vec::new();
        let emitted = engine.process(&pulse_batch(), &mut records).unwrap();
        assert_eq!(emitted, 1);
        assert_eq!(records[0], "500000000,1000000\n");
    }

    #[test]
    fn test_sink_can_reenter_engine() {
        let engine = DriftMeasure::new(DriftConfig::default()).unwrap();
        engine.set_format(StreamFormat::interleaved(2, 48000)).unwrap();

        let mut sink = ReentrantSink {
            engine: engine.clone(),
            lines: Vec::new(),
        };
        engine.process(&pulse_batch(), &mut sink).unwrap();

        assert_eq!(sink.lines.len(), 1);
        assert_eq!(engine.config().undetected_peak_fill_value, 5);
    }

    #[test]
    fn test_configuration_error_refuses_input() {
        let engine = DriftMeasure::new(DriftConfig::default()).unwrap();
        engine.set_format(StreamFormat::interleaved(2, 48000)).unwrap();

        let err = engine.update_config(|c| c.reference_channel = 5).unwrap_err();
        assert!(matches!(err, DriftError::Configuration { .. }));

        let mut records: Vec<String> = Vec::new();
        assert!(engine.process(&pulse_batch(), &mut records).is_err());
        assert!(records.is_empty());

        engine.update_config(|c| c.reference_channel = 0).unwrap();
        assert_eq!(engine.process(&pulse_batch(), &mut records).unwrap(), 1);
    }

    #[test]
    fn test_engine_shared_across_threads() {
        let engine = DriftMeasure::new(DriftConfig::default()).unwrap();
        engine.set_format(StreamFormat::interleaved(2, 48000)).unwrap();

        let worker = engine.clone();
        let handle = std::thread::spawn(move || {
            let mut records: Vec<String> = Vec::new();
            worker.process(&pulse_batch(), &mut records).unwrap();
            records
        });
        let records = handle.join().unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(engine.mode(), Mode::Search);
        let (position, available) = engine.history_span().unwrap();
        assert_eq!(position + available as u64, 48000);
    }
}
