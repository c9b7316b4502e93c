//! CSV record formatting and the output boundary
//!
//! Each completed dataset becomes one line:
//!
//! ```text
//! <timestamp_ns>,<drift_ns or empty>,<drift_ns or empty>,...\n
//! ```

use std::io::Write;

use super::dataset::Dataset;
use crate::error::EmissionError;

/// Maximum digits of an unsigned 64-bit timestamp
const TIMESTAMP_MAX_LEN: usize = 20;

/// Maximum length of a signed 64-bit drift value (19 digits and a sign;
/// sized like the timestamp plus one for the sign)
const DRIFT_MAX_LEN: usize = 21;

/// Upper bound for the length of one CSV line, terminator included
///
/// # Example
/// ```
/// use driftmeasure_core::max_line_len;
///
/// assert_eq!(max_line_len(2), 20 + 22 + 1);
/// ```
pub fn max_line_len(num_channels: usize) -> usize {
    TIMESTAMP_MAX_LEN + num_channels.saturating_sub(1) * (1 + DRIFT_MAX_LEN) + 1
}

/// Destination for formatted records
///
/// Implementations may block; the engine does not hold its state lock
/// while calling [`RecordSink::push_record`].
pub trait RecordSink {
    /// Hand over one complete CSV line
    fn push_record(&mut self, line: &[u8]) -> Result<(), EmissionError>;
}

/// Collects records as strings
impl RecordSink for Vec<String> {
    fn push_record(&mut self, line: &[u8]) -> Result<(), EmissionError> {
        self.push(String::from_utf8_lossy(line).into_owned());
        Ok(())
    }
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn push_record(&mut self, line: &[u8]) -> Result<(), EmissionError> {
        (**self).push_record(line)
    }
}

/// Writes each record to an [`std::io::Write`] and flushes it
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    writer: W,
    records_written: u64,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            records_written: 0,
        }
    }

    /// Number of records successfully written
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for WriterSink<W> {
    fn push_record(&mut self, line: &[u8]) -> Result<(), EmissionError> {
        self.writer.write_all(line)?;
        self.writer.flush()?;
        self.records_written += 1;
        Ok(())
    }
}

/// Formats datasets into reusable line buffers
#[derive(Debug, Default)]
pub struct RecordEmitter {
    /// Line capacity for the current channel count
    capacity: usize,
    /// Buffer handed back after the previous emission
    spare: Option<Vec<u8>>,
}

impl RecordEmitter {
    pub fn new(num_channels: usize) -> Self {
        Self {
            capacity: max_line_len(num_channels),
            spare: None,
        }
    }

    /// Maximum line length for the configured channel count
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Format `dataset` as one CSV line
    pub fn format(&mut self, dataset: &Dataset) -> Vec<u8> {
        let mut line = self
            .spare
            .take()
            .unwrap_or_else(|| Vec::with_capacity(self.capacity));
        line.clear();

        // Writing into a Vec<u8> cannot fail
        if let Some(timestamp) = dataset.timestamp {
            let _ = write!(line, "{}", timestamp);
        }
        for drift in &dataset.drifts {
            line.push(b',');
            if let Some(drift) = drift {
                let _ = write!(line, "{}", drift);
            }
        }
        line.push(b'\n');

        debug_assert!(line.len() <= self.capacity);
        line
    }

    /// Return a line buffer for reuse by the next [`RecordEmitter::format`]
    pub fn recycle(&mut self, line: Vec<u8>) {
        if line.capacity() >= self.capacity {
            self.spare = Some(line);
        }
    }
}
