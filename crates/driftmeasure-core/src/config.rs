//! Analysis configuration, stream format and time segments
//!
//! [`DriftConfig`] is replaced wholesale on every change. Range checks
//! happen in [`DriftConfig::validate`]; the reference channel can only be
//! checked once a [`StreamFormat`] is known.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::DriftError;
use crate::NANOS_PER_SECOND;

/// Default window size (500ms)
pub const DEFAULT_WINDOW_SIZE_NS: u64 = 500_000_000;

/// Default pulse length (2000us)
pub const DEFAULT_PULSE_LENGTH_NS: u64 = 2_000_000;

/// Default peak threshold
pub const DEFAULT_PEAK_THRESHOLD: f32 = 0.6;

fn default_window_size_ns() -> u64 {
    DEFAULT_WINDOW_SIZE_NS
}

fn default_pulse_length_ns() -> u64 {
    DEFAULT_PULSE_LENGTH_NS
}

fn default_peak_threshold() -> f32 {
    DEFAULT_PEAK_THRESHOLD
}

/// What to write for a non-reference channel whose pulse was not found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UndetectedPeakHandling {
    /// Leave the CSV column empty
    #[default]
    NoValue,
    /// Copy the last detected value (fill value if there is none)
    LastValue,
    /// Write the configured fill value
    FillValue,
}

impl std::str::FromStr for UndetectedPeakHandling {
    type Err = DriftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no-value" => Ok(Self::NoValue),
            "last-value" => Ok(Self::LastValue),
            "fill-value" => Ok(Self::FillValue),
            other => Err(DriftError::InvalidValue(format!(
                "unknown undetected peak handling '{}' (expected no-value, last-value or fill-value)",
                other
            ))),
        }
    }
}

/// Drift analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftConfig {
    /// Size of the window required around a peak, in nanoseconds
    #[serde(default = "default_window_size_ns")]
    pub window_size_ns: u64,
    /// Length of the pulse whose peak shall be detected, in nanoseconds
    #[serde(default = "default_pulse_length_ns")]
    pub pulse_length_ns: u64,
    /// Minimum sample value for a frame to be a peak candidate (0.0 - 1.0)
    #[serde(default = "default_peak_threshold")]
    pub peak_threshold: f32,
    /// Channel carrying the reference pulses
    #[serde(default)]
    pub reference_channel: u32,
    /// Policy for channels without a detected peak
    #[serde(default)]
    pub undetected_peak_handling: UndetectedPeakHandling,
    /// Drift written by the fill-value policy, in nanoseconds
    #[serde(default)]
    pub undetected_peak_fill_value: i64,
    /// Suppress the record if no non-reference channel has a peak
    #[serde(default)]
    pub omit_output_if_no_peaks: bool,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            window_size_ns: DEFAULT_WINDOW_SIZE_NS,
            pulse_length_ns: DEFAULT_PULSE_LENGTH_NS,
            peak_threshold: DEFAULT_PEAK_THRESHOLD,
            reference_channel: 0,
            undetected_peak_handling: UndetectedPeakHandling::default(),
            undetected_peak_fill_value: 0,
            omit_output_if_no_peaks: false,
        }
    }
}

impl DriftConfig {
    /// Window size as a duration
    pub fn window_size(&self) -> Duration {
        Duration::from_nanos(self.window_size_ns)
    }

    /// Pulse length as a duration
    pub fn pulse_length(&self) -> Duration {
        Duration::from_nanos(self.pulse_length_ns)
    }

    /// Check value ranges that do not depend on the stream format
    pub fn validate(&self) -> Result<(), DriftError> {
        if self.window_size_ns == 0 {
            return Err(DriftError::InvalidValue(
                "window size must be at least 1ns".to_string(),
            ));
        }
        if self.pulse_length_ns == 0 {
            return Err(DriftError::InvalidValue(
                "pulse length must be at least 1ns".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.peak_threshold) {
            return Err(DriftError::InvalidValue(format!(
                "peak threshold {} outside 0.0-1.0",
                self.peak_threshold
            )));
        }
        Ok(())
    }

    /// Check the reference channel against a channel count
    pub fn validate_reference_channel(&self, num_channels: u32) -> Result<(), DriftError> {
        if self.reference_channel >= num_channels {
            return Err(DriftError::Configuration {
                reference_channel: self.reference_channel,
                num_channels,
            });
        }
        Ok(())
    }

    /// Whether switching from `self` to `other` invalidates the frame history
    pub fn requires_flush(&self, other: &DriftConfig) -> bool {
        self.window_size_ns != other.window_size_ns
            || self.pulse_length_ns != other.pulse_length_ns
            || self.peak_threshold != other.peak_threshold
            || self.reference_channel != other.reference_channel
            || self.undetected_peak_handling != other.undetected_peak_handling
    }
}

/// How samples are arranged in incoming batches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    /// One sample per channel per frame, frames back to back
    Interleaved,
    /// One contiguous block per channel (not supported)
    NonInterleaved,
}

/// Format of the incoming frame stream (32-bit float samples)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub num_channels: u32,
    pub sample_rate: u32,
    pub layout: SampleLayout,
}

impl StreamFormat {
    /// Interleaved float format
    pub fn interleaved(num_channels: u32, sample_rate: u32) -> Self {
        Self {
            num_channels,
            sample_rate,
            layout: SampleLayout::Interleaved,
        }
    }

    /// Check that the engine can interpret this format
    pub fn validate(&self) -> Result<(), DriftError> {
        if self.layout != SampleLayout::Interleaved {
            return Err(DriftError::Format(
                "only interleaved sample layout is supported".to_string(),
            ));
        }
        if self.num_channels < 2 {
            return Err(DriftError::Format(format!(
                "need at least 2 channels, got {}",
                self.num_channels
            )));
        }
        if self.sample_rate == 0 {
            return Err(DriftError::Format("sample rate must be > 0".to_string()));
        }
        Ok(())
    }

    /// Number of frames needed to cover `duration_ns`, rounded up
    pub fn frames_for(&self, duration_ns: u64) -> usize {
        let rate = self.sample_rate as u128;
        let frames = (duration_ns as u128 * rate).div_ceil(NANOS_PER_SECOND as u128);
        usize::try_from(frames).unwrap_or(usize::MAX)
    }

    /// Nanoseconds spanned by `frames`, rounded to nearest
    pub fn frames_to_nanos(&self, frames: u64) -> u64 {
        let rate = self.sample_rate as u128;
        let nanos = (frames as u128 * NANOS_PER_SECOND as u128 + rate / 2) / rate;
        u64::try_from(nanos).unwrap_or(u64::MAX)
    }
}

/// Unit of a time segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentFormat {
    /// Nanosecond time base
    Time,
    /// Byte offsets
    Bytes,
    /// Undefined
    #[default]
    Default,
}

/// Active time segment of the input stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Segment {
    pub format: SegmentFormat,
    /// Running time of the segment start
    pub base: u64,
}

impl Segment {
    /// Time segment starting at `base` nanoseconds
    pub fn time(base: u64) -> Self {
        Self {
            format: SegmentFormat::Time,
            base,
        }
    }

    /// Offset to add to emitted timestamps
    pub fn timestamp_offset(&self) -> u64 {
        match self.format {
            SegmentFormat::Time => self.base,
            SegmentFormat::Bytes | SegmentFormat::Default => 0,
        }
    }
}
