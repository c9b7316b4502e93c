//! Rolling history of interleaved audio frames
//!
//! New frames are appended at the tail, frames that are no longer needed
//! are discarded from the head. Discarded frames advance an absolute
//! position so that every held frame keeps a stable, monotonic index.

use std::collections::VecDeque;

/// Append-at-tail / discard-at-head frame buffer
///
/// Invariant: `position() + available() == total_appended()` until the
/// next [`FrameHistory::clear`].
///
/// # Example
/// ```
/// use driftmeasure_core::audio::history::FrameHistory;
///
/// let mut history = FrameHistory::new(2);
/// history.append(&[0.0, 0.1, 0.2, 0.3, 0.4, 0.5]);
/// assert_eq!(history.available(), 3);
///
/// history.flush(1);
/// assert_eq!(history.position(), 1);
/// assert_eq!(history.sample(1, 0), 0.3);
/// ```
#[derive(Debug, Clone)]
pub struct FrameHistory {
    /// Interleaved samples, oldest first
    samples: VecDeque<f32>,
    /// Samples per frame
    num_channels: usize,
    /// Frames discarded from the head since the last clear
    position: u64,
}

impl FrameHistory {
    /// Create an empty history for `num_channels` interleaved channels
    pub fn new(num_channels: usize) -> Self {
        assert!(num_channels > 0, "frame history needs at least one channel");
        Self {
            samples: VecDeque::new(),
            num_channels,
            position: 0,
        }
    }

    /// Append interleaved frames
    ///
    /// # Panics
    /// If `frames` does not hold a whole number of frames.
    pub fn append(&mut self, frames: &[f32]) {
        assert!(
            frames.len() % self.num_channels == 0,
            "partial frame appended: {} samples for {} channels",
            frames.len(),
            self.num_channels
        );
        self.samples.extend(frames.iter().copied());
    }

    /// Number of frames currently held
    pub fn available(&self) -> usize {
        self.samples.len() / self.num_channels
    }

    /// Absolute index of the oldest held frame
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Frames appended since the last clear
    pub fn total_appended(&self) -> u64 {
        self.position + self.available() as u64
    }

    /// Number of interleaved channels
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Sample of `channel` in the frame `frame` positions after the head
    ///
    /// # Panics
    /// If the frame is not held or the channel does not exist.
    pub fn sample(&self, channel: usize, frame: usize) -> f32 {
        assert!(
            channel < self.num_channels,
            "channel {} out of range ({} channels)",
            channel,
            self.num_channels
        );
        assert!(
            frame < self.available(),
            "frame {} not in history ({} available)",
            frame,
            self.available()
        );
        self.samples[frame * self.num_channels + channel]
    }

    /// Sample by absolute frame index, `None` if the frame is not held
    pub fn sample_at(&self, channel: usize, absolute_frame: u64) -> Option<f32> {
        let relative = absolute_frame.checked_sub(self.position)?;
        let relative = usize::try_from(relative).ok()?;
        (relative < self.available() && channel < self.num_channels)
            .then(|| self.sample(channel, relative))
    }

    /// Samples of one channel over the oldest `frame_count` frames
    pub fn channel(&self, channel: usize, frame_count: usize) -> impl Iterator<Item = f32> + '_ {
        assert!(
            frame_count <= self.available(),
            "requested {} frames, {} available",
            frame_count,
            self.available()
        );
        self.samples
            .iter()
            .skip(channel)
            .step_by(self.num_channels)
            .take(frame_count)
            .copied()
    }

    /// Discard the oldest `frames` frames
    ///
    /// # Panics
    /// If more frames are flushed than are held. Callers clamp first.
    pub fn flush(&mut self, frames: usize) {
        assert!(
            frames <= self.available(),
            "cannot flush {} frames, only {} available",
            frames,
            self.available()
        );
        self.samples.drain(..frames * self.num_channels);
        self.position += frames as u64;
    }

    /// Discard everything and restart absolute positions at zero
    pub fn clear(&mut self) {
        self.samples.clear();
        self.position = 0;
    }
}
