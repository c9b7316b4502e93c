//! Error types for drift measurement
//!
//! Invariant violations (flushing more frames than are held, reading a
//! frame outside the history) are programming errors and panic instead of
//! appearing here.

use thiserror::Error;

/// Errors reported by the drift measurement engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriftError {
    #[error("Reference channel {reference_channel} out of bounds (valid range is 0-{})", num_channels.saturating_sub(1))]
    Configuration {
        reference_channel: u32,
        num_channels: u32,
    },

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Unusable input format: {0}")]
    Format(String),

    #[error("No valid input format negotiated yet")]
    NotNegotiated,

    #[error("Could not emit record: {0}")]
    Emission(#[from] EmissionError),
}

/// The output boundary rejected a record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmissionError {
    #[error("Output closed")]
    Closed,

    #[error("Write failed: {0}")]
    Io(String),
}

impl From<std::io::Error> for EmissionError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::BrokenPipe => EmissionError::Closed,
            _ => EmissionError::Io(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_message() {
        let err = DriftError::Configuration {
            reference_channel: 5,
            num_channels: 2,
        };
        assert_eq!(
            err.to_string(),
            "Reference channel 5 out of bounds (valid range is 0-1)"
        );
    }

    #[test]
    fn test_broken_pipe_maps_to_closed() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert_eq!(EmissionError::from(io), EmissionError::Closed);
    }

    #[test]
    fn test_emission_error_converts() {
        let err: DriftError = EmissionError::Closed.into();
        assert!(matches!(err, DriftError::Emission(EmissionError::Closed)));
    }
}
