//! Thresholded peak search
//!
//! Finds the positive maximum of one channel in the frame history. Only
//! samples at or above the threshold are candidates.
//!
//! The plain maximum is sensitive to noise on the input signal.

use super::history::FrameHistory;

/// A located peak
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Frame offset from the head of the history
    pub frame: usize,
    /// Sample value at the peak
    pub value: f32,
}

/// Largest-sample peak detector
///
/// # Example
/// ```
/// use driftmeasure_core::audio::history::FrameHistory;
/// use driftmeasure_core::audio::peak::PeakDetector;
///
/// let mut history = FrameHistory::new(2);
/// history.append(&[0.0, 0.0, 0.9, 0.1, 0.2, 0.7]);
///
/// let detector = PeakDetector::new(0.6);
/// assert_eq!(detector.find_largest(&history, 0, 3).unwrap().frame, 1);
/// assert_eq!(detector.find_largest(&history, 1, 3).unwrap().frame, 2);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PeakDetector {
    threshold: f32,
}

impl PeakDetector {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Find the largest qualifying sample of `channel` in frames `[0, frame_count)`
    ///
    /// Ties keep the earliest frame. Returns `None` if no sample reaches the
    /// threshold.
    pub fn find_largest(
        &self,
        history: &FrameHistory,
        channel: usize,
        frame_count: usize,
    ) -> Option<Peak> {
        let mut largest: Option<Peak> = None;

        for (frame, value) in history.channel(channel, frame_count).enumerate() {
            if value.is_nan() || value < self.threshold {
                continue;
            }
            match largest {
                Some(peak) if value <= peak.value => {}
                _ => largest = Some(Peak { frame, value }),
            }
        }

        largest
    }
}
