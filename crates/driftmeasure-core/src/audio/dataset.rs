//! Drift datasets
//!
//! A dataset is one output row: the timestamp of the reference peak plus
//! one drift value per non-reference channel. Unset values are `None`,
//! which no drift computation can produce.

use crate::config::UndetectedPeakHandling;

/// One analysis result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    /// Timestamp of the reference peak in nanoseconds
    pub timestamp: Option<u64>,
    /// Drift per non-reference channel in nanoseconds, ascending channel order
    pub drifts: Vec<Option<i64>>,
}

impl Dataset {
    /// Dataset with `slots` unset drift values
    pub fn with_slots(slots: usize) -> Self {
        Self {
            timestamp: None,
            drifts: vec![None; slots],
        }
    }

    /// Set every value back to unset
    pub fn reset(&mut self) {
        self.timestamp = None;
        self.drifts.iter_mut().for_each(|d| *d = None);
    }

    /// True if no drift value is set
    pub fn is_empty(&self) -> bool {
        self.drifts.iter().all(Option::is_none)
    }
}

/// Holds the dataset being filled and the last completed one
#[derive(Debug, Clone, Default)]
pub struct DatasetManager {
    current: Dataset,
    last: Dataset,
}

impl DatasetManager {
    /// Create datasets for a stream with `num_channels` channels
    pub fn new(num_channels: usize) -> Self {
        let mut manager = Self::default();
        manager.resize(num_channels);
        manager
    }

    /// Reallocate both datasets for a new channel count
    ///
    /// Previous values are discarded even if the count did not change.
    pub fn resize(&mut self, num_channels: usize) {
        let slots = num_channels.saturating_sub(1);
        self.current = Dataset::with_slots(slots);
        self.last = Dataset::with_slots(slots);
    }

    /// Reset both datasets to unset values, keeping their shape
    pub fn reset(&mut self) {
        self.current.reset();
        self.last.reset();
    }

    /// Number of drift slots per dataset
    pub fn slots(&self) -> usize {
        self.current.drifts.len()
    }

    pub fn current(&self) -> &Dataset {
        &self.current
    }

    pub fn last(&self) -> &Dataset {
        &self.last
    }

    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.current.timestamp = Some(timestamp);
    }

    /// Store a measured drift for a non-reference slot
    pub fn set_drift(&mut self, slot: usize, drift_ns: i64) {
        self.current.drifts[slot] = Some(drift_ns);
    }

    /// Apply the undetected-peak policy to a slot and return the stored value
    pub fn set_undetected(
        &mut self,
        slot: usize,
        handling: UndetectedPeakHandling,
        fill_value: i64,
    ) -> Option<i64> {
        let value = match handling {
            UndetectedPeakHandling::NoValue => None,
            UndetectedPeakHandling::LastValue => Some(self.last.drifts[slot].unwrap_or(fill_value)),
            UndetectedPeakHandling::FillValue => Some(fill_value),
        };
        self.current.drifts[slot] = value;
        value
    }

    /// Copy the current dataset into `last`
    pub fn complete(&mut self) {
        self.last.clone_from(&self.current);
    }
}
