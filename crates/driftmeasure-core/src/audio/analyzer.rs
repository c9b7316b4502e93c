//! Peak-window drift analysis
//!
//! Two-mode state machine over the frame history:
//!
//! - **Search**: look for the reference pulse peak. A peak is only trusted
//!   once there is at least half a window of history before it and at
//!   least one pulse length after it.
//! - **Analysis**: wait until half a window follows the peak, then locate
//!   the largest sample in every other channel and report its distance to
//!   the reference peak.
//!
//! ```text
//! drift_frames = channel_peak - reference_peak
//! drift_ns     = round(|drift_frames| * 1e9 / sample_rate) * sign(drift_frames)
//! timestamp_ns = round((reference_peak + frames_discarded) * 1e9 / sample_rate) + segment_base
//! ```

use super::dataset::{Dataset, DatasetManager};
use super::history::FrameHistory;
use super::peak::PeakDetector;
use super::record::{RecordEmitter, RecordSink};
use crate::config::{DriftConfig, Segment, StreamFormat};
use crate::error::DriftError;

/// Current analysis mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No reference peak locked yet
    Search,
    /// Reference peak located at `peak_frame` (offset from history head)
    Analysis { peak_frame: usize },
}

/// Outcome of a single state machine step
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    /// State changed; step again
    Progress,
    /// A dataset was completed and formatted; emit it, then step again
    Record(Vec<u8>),
    /// Nothing more can be done until more frames arrive
    Idle,
}

/// Everything that only exists while a valid stream format is known
#[derive(Debug)]
struct Stream {
    format: StreamFormat,
    history: FrameHistory,
    datasets: DatasetManager,
    emitter: RecordEmitter,
    window_frames: usize,
    pulse_frames: usize,
}

impl Stream {
    fn new(format: StreamFormat, config: &DriftConfig) -> Self {
        let num_channels = format.num_channels as usize;
        let mut stream = Self {
            format,
            history: FrameHistory::new(num_channels),
            datasets: DatasetManager::new(num_channels),
            emitter: RecordEmitter::new(num_channels),
            window_frames: 0,
            pulse_frames: 0,
        };
        stream.recalculate_sizes(config);
        stream
    }

    fn recalculate_sizes(&mut self, config: &DriftConfig) {
        self.window_frames = self.format.frames_for(config.window_size_ns);
        self.pulse_frames = self.format.frames_for(config.pulse_length_ns);
        tracing::info!(
            window_ns = config.window_size_ns,
            pulse_ns = config.pulse_length_ns,
            sample_rate = self.format.sample_rate,
            window_frames = self.window_frames,
            pulse_frames = self.pulse_frames,
            "window_sizes_recalculated"
        );
    }

    /// Drift in nanoseconds for a signed frame distance
    fn drift_nanos(&self, drift_frames: i64) -> i64 {
        let magnitude = self.format.frames_to_nanos(drift_frames.unsigned_abs());
        let magnitude = i64::try_from(magnitude).unwrap_or(i64::MAX);
        if drift_frames < 0 {
            -magnitude
        } else {
            magnitude
        }
    }

    fn discard(&mut self, frames: usize) {
        self.history.flush(frames);
        tracing::trace!(
            discarded = frames,
            position = self.history.position(),
            remaining = self.history.available(),
            "history_discarded"
        );
    }
}

/// Streaming drift analyzer
///
/// Feed interleaved frames with [`DriftAnalyzer::push`] and drive the state
/// machine with [`DriftAnalyzer::step`] until it reports [`Step::Idle`], or
/// use [`DriftAnalyzer::process`] which does both and hands records to a
/// [`RecordSink`].
///
/// # Example
/// ```
/// use driftmeasure_core::{DriftAnalyzer, DriftConfig, StreamFormat};
///
/// let mut analyzer = DriftAnalyzer::new(DriftConfig::default()).unwrap();
/// analyzer.set_format(StreamFormat::interleaved(2, 48000)).unwrap();
///
/// // One pulse: reference at frame 24000, second channel 48 frames later
/// let mut frames = vec![0.0f32; 48000 * 2];
/// frames[24000 * 2] = 0.9;
/// frames[24048 * 2 + 1] = 0.8;
///
/// let mut records: Vec<String> = Vec::new();
/// analyzer.process(&frames, &mut records).unwrap();
/// assert_eq!(records, vec!["500000000,1000000\n".to_string()]);
/// ```
#[derive(Debug)]
pub struct DriftAnalyzer {
    config: DriftConfig,
    detector: PeakDetector,
    segment: Segment,
    stream: Option<Stream>,
    mode: Mode,
}

impl DriftAnalyzer {
    /// Create an analyzer; no frames are accepted until a format is set
    pub fn new(config: DriftConfig) -> Result<Self, DriftError> {
        config.validate()?;
        Ok(Self {
            detector: PeakDetector::new(config.peak_threshold),
            config,
            segment: Segment::default(),
            stream: None,
            mode: Mode::Search,
        })
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }

    /// Negotiated stream format, if any
    pub fn format(&self) -> Option<StreamFormat> {
        self.stream.as_ref().map(|s| s.format)
    }

    pub fn history(&self) -> Option<&FrameHistory> {
        self.stream.as_ref().map(|s| &s.history)
    }

    /// Window size in frames (0 without a format)
    pub fn window_frames(&self) -> usize {
        self.stream.as_ref().map_or(0, |s| s.window_frames)
    }

    /// Pulse length in frames (0 without a format)
    pub fn pulse_frames(&self) -> usize {
        self.stream.as_ref().map_or(0, |s| s.pulse_frames)
    }

    /// Dataset currently being filled
    pub fn current_dataset(&self) -> Option<&Dataset> {
        self.stream.as_ref().map(|s| s.datasets.current())
    }

    /// Most recently completed dataset
    pub fn last_dataset(&self) -> Option<&Dataset> {
        self.stream.as_ref().map(|s| s.datasets.last())
    }

    /// Replace the configuration
    ///
    /// Out-of-range values are rejected and leave the previous configuration
    /// in place. A reference channel that does not exist in the current
    /// format is stored, reported, and keeps the analyzer inert until fixed.
    pub fn set_config(&mut self, config: DriftConfig) -> Result<(), DriftError> {
        config.validate()?;

        let flush = self.config.requires_flush(&config);
        let sizes_changed = self.config.window_size_ns != config.window_size_ns
            || self.config.pulse_length_ns != config.pulse_length_ns;

        self.detector = PeakDetector::new(config.peak_threshold);
        self.config = config;

        if sizes_changed {
            if let Some(stream) = self.stream.as_mut() {
                stream.recalculate_sizes(&self.config);
            }
        }
        if flush {
            tracing::debug!("configuration_changed_flushing");
            self.flush();
        }

        self.check_reference_channel()
    }

    /// Apply a new stream format
    ///
    /// Always discards history. An unusable format leaves the analyzer inert
    /// until a valid one arrives.
    pub fn set_format(&mut self, format: StreamFormat) -> Result<(), DriftError> {
        self.flush();

        if let Err(e) = format.validate() {
            tracing::error!(error = %e, ?format, "input_format_rejected");
            self.stream = None;
            return Err(e);
        }

        tracing::info!(
            channels = format.num_channels,
            sample_rate = format.sample_rate,
            "input_format_set"
        );
        self.stream = Some(Stream::new(format, &self.config));
        self.check_reference_channel()
    }

    /// Start a new time segment; restarts the frame count
    pub fn set_segment(&mut self, segment: Segment) {
        tracing::debug!(?segment, "segment_set");
        self.segment = segment;
        self.flush();
    }

    /// Discard all history and datasets and return to search mode
    pub fn flush(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            stream.history.clear();
            stream.datasets.reset();
        }
        self.mode = Mode::Search;
    }

    /// Input ended; pending partial pulses are dropped
    pub fn end_of_stream(&mut self) {
        tracing::debug!("end_of_stream_flushing");
        self.flush();
    }

    /// Release all per-stream state and forget the format
    pub fn teardown(&mut self) {
        self.flush();
        self.stream = None;
    }

    /// Append interleaved frames to the history
    pub fn push(&mut self, frames: &[f32]) -> Result<(), DriftError> {
        self.check_ready()?;
        let stream = self.stream.as_mut().ok_or(DriftError::NotNegotiated)?;

        let channels = stream.format.num_channels as usize;
        if frames.len() % channels != 0 {
            return Err(DriftError::Format(format!(
                "batch of {} samples is not a whole number of {}-channel frames",
                frames.len(),
                channels
            )));
        }

        stream.history.append(frames);
        tracing::trace!(
            added = frames.len() / channels,
            available = stream.history.available(),
            "frames_appended"
        );
        Ok(())
    }

    /// Run one step of the state machine
    pub fn step(&mut self) -> Result<Step, DriftError> {
        self.check_ready()?;
        let Some(stream) = self.stream.as_ref() else {
            return Err(DriftError::NotNegotiated);
        };

        if stream.history.available() == 0 {
            return Ok(Step::Idle);
        }

        let step = match self.mode {
            Mode::Search => self.search(),
            Mode::Analysis { peak_frame } => self.analyze(peak_frame),
        };
        Ok(step)
    }

    /// Hand a formatted line back for buffer reuse
    pub fn recycle(&mut self, line: Vec<u8>) {
        if let Some(stream) = self.stream.as_mut() {
            stream.emitter.recycle(line);
        }
    }

    /// Append `frames` and analyze until more input is needed
    ///
    /// Returns the number of records handed to `sink`. A sink failure stops
    /// processing of this batch and drops the rejected record; the analyzer
    /// stays usable.
    pub fn process<S: RecordSink>(
        &mut self,
        frames: &[f32],
        mut sink: S,
    ) -> Result<usize, DriftError> {
        self.push(frames)?;

        let mut emitted = 0;
        loop {
            match self.step()? {
                Step::Progress => {}
                Step::Idle => break,
                Step::Record(line) => {
                    let result = sink.push_record(&line);
                    self.recycle(line);
                    result?;
                    emitted += 1;
                }
            }
        }
        Ok(emitted)
    }

    fn check_reference_channel(&self) -> Result<(), DriftError> {
        match self.stream.as_ref() {
            Some(stream) => {
                let result = self
                    .config
                    .validate_reference_channel(stream.format.num_channels);
                if let Err(e) = &result {
                    tracing::error!(error = %e, "invalid_reference_channel");
                }
                result
            }
            None => Ok(()),
        }
    }

    fn check_ready(&self) -> Result<(), DriftError> {
        let stream = self.stream.as_ref().ok_or(DriftError::NotNegotiated)?;
        self.config
            .validate_reference_channel(stream.format.num_channels)
    }

    fn search(&mut self) -> Step {
        let Some(stream) = self.stream.as_mut() else {
            return Step::Idle;
        };
        let available = stream.history.available();
        let half_window = stream.window_frames / 2;
        let reference = self.config.reference_channel as usize;

        let Some(peak) = self
            .detector
            .find_largest(&stream.history, reference, available)
        else {
            // Keep only the newest half window for the next search
            if available > half_window {
                let excess = available - half_window;
                tracing::trace!(excess, "no_peak_discarding");
                stream.discard(excess);
                return Step::Progress;
            }
            tracing::trace!(available, "no_peak");
            return Step::Idle;
        };

        tracing::debug!(
            frame = stream.history.position() + peak.frame as u64,
            history_frame = peak.frame,
            value = peak.value,
            "peak_detected"
        );

        if peak.frame < half_window {
            // Possibly a truncated pulse, and no room to look for channels
            // drifting backwards
            let discard = (peak.frame + stream.pulse_frames / 2)
                .max(1)
                .min(available);
            tracing::debug!(discard, "peak_too_early_discarding");
            stream.discard(discard);
            Step::Progress
        } else if available - peak.frame < stream.pulse_frames {
            // The true peak may still be in the next batch
            tracing::debug!(
                trailing = available - peak.frame,
                pulse_frames = stream.pulse_frames,
                "peak_too_close_to_end"
            );
            Step::Idle
        } else {
            tracing::debug!(peak_frame = peak.frame, "switching_to_analysis");
            self.mode = Mode::Analysis {
                peak_frame: peak.frame,
            };
            Step::Progress
        }
    }

    fn analyze(&mut self, peak_frame: usize) -> Step {
        let Some(stream) = self.stream.as_mut() else {
            return Step::Idle;
        };
        let available = stream.history.available();

        if available - peak_frame < stream.window_frames / 2 {
            tracing::trace!(available, peak_frame, "waiting_for_analysis_frames");
            return Step::Idle;
        }

        let absolute_peak = stream.history.position() + peak_frame as u64;
        let timestamp = stream
            .format
            .frames_to_nanos(absolute_peak)
            .saturating_add(self.segment.timestamp_offset());
        stream.datasets.set_timestamp(timestamp);

        let reference = self.config.reference_channel as usize;
        let mut found_any = false;
        let non_reference = (0..stream.history.num_channels()).filter(|&c| c != reference);

        for (slot, channel) in non_reference.enumerate() {
            match self
                .detector
                .find_largest(&stream.history, channel, available)
            {
                Some(peak) => {
                    let drift_frames = peak.frame as i64 - peak_frame as i64;
                    let drift_ns = stream.drift_nanos(drift_frames);
                    stream.datasets.set_drift(slot, drift_ns);
                    found_any = true;
                    tracing::debug!(channel, drift_ns, drift_frames, "channel_drift");
                }
                None => {
                    let value = stream.datasets.set_undetected(
                        slot,
                        self.config.undetected_peak_handling,
                        self.config.undetected_peak_fill_value,
                    );
                    tracing::debug!(
                        channel,
                        handling = ?self.config.undetected_peak_handling,
                        ?value,
                        "channel_pulse_not_found"
                    );
                }
            }
        }

        stream.datasets.complete();

        let line = if !found_any && self.config.omit_output_if_no_peaks {
            tracing::debug!(timestamp, "no_peaks_output_omitted");
            None
        } else {
            Some(stream.emitter.format(stream.datasets.current()))
        };

        // Discard the analyzed pulse so it is not detected again; at least
        // one frame, or a peak at offset 0 would be analyzed forever
        let discard = (peak_frame + stream.pulse_frames / 2)
            .max(1)
            .min(available);
        stream.discard(discard);
        self.mode = Mode::Search;
        tracing::debug!(timestamp, found_any, "analysis_complete");

        match line {
            Some(line) => Step::Record(line),
            None => Step::Progress,
        }
    }
}
