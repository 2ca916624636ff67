/// Errors raised synchronously by the scheduler API
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Error type returned by host trigger callbacks.
pub type TriggerError = Box<dyn std::error::Error + Send + Sync>;

/// Failures of the audio and MIDI outputs used by hosts.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("No default audio output device")]
    NoOutputDevice,

    #[error("Unsupported sample format: {0:?}")]
    UnsupportedFormat(cpal::SampleFormat),

    #[error("Audio configuration error: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),

    #[error("Failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("MIDI error: {0}")]
    Midi(String),

    #[error("Invalid MIDI port index {0}")]
    InvalidPort(usize),
}

pub(crate) fn positive_finite(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidArgument(format!(
            "{} must be a positive number, got {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_finite() {
        assert_eq!(positive_finite("bpm", 120.0), Ok(120.0));
        assert!(positive_finite("bpm", 0.0).is_err());
        assert!(positive_finite("bpm", -1.0).is_err());
        assert!(positive_finite("bpm", f64::NAN).is_err());
        assert!(positive_finite("bpm", f64::INFINITY).is_err());
    }

    #[test]
    fn test_error_message() {
        let err = positive_finite("tempo", -3.0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid argument: tempo must be a positive number, got -3"
        );
    }
}
