// Audio error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Audio error code constants
///
/// Single source of truth for the numeric codes reported to the UI.
///
/// Error code range: 1001-1008
pub struct AudioErrorCodes {}

impl AudioErrorCodes {
    /// BPM value is invalid (must be a positive, finite number)
    pub const BPM_INVALID: i32 = 1001;

    /// Listening session is already running
    pub const ALREADY_RUNNING: i32 = 1002;

    /// Listening session is not running
    pub const NOT_RUNNING: i32 = 1003;

    /// Frame length does not match the configured analysis frame size
    pub const MALFORMED_FRAME: i32 = 1004;

    /// Sample rate is zero
    pub const INVALID_SAMPLE_RATE: i32 = 1005;

    /// Event queue or stream closed unexpectedly
    pub const STREAM_FAILURE: i32 = 1006;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1007;

    /// No free frame buffer available for capture
    pub const BUFFER_POOL_EXHAUSTED: i32 = 1008;
}

/// Log an audio error with structured context
///
/// Logs the numeric code, the component and the human-readable message.
/// The logging is non-blocking and will not panic on failure.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=AudioPipeline, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio-related errors
///
/// These errors cover frame validation, listening lifecycle and the beat
/// clock. Malformed frames are wiring bugs and are always reported loudly;
/// silence and indeterminate pitch are never errors.
///
/// Error code range: 1001-1008
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// BPM value is invalid (must be > 0 and finite)
    BpmInvalid { bpm: f32 },

    /// Listening session is already running
    AlreadyRunning,

    /// Listening session is not running
    NotRunning,

    /// Frame has the wrong length for the analysis configuration
    MalformedFrame { expected: usize, actual: usize },

    /// Sample rate is zero
    InvalidSampleRate { sample_rate: u32 },

    /// Channel disconnected unexpectedly
    StreamFailure { reason: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// Capture produced frames faster than analysis could recycle them
    BufferPoolExhausted,
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::BpmInvalid { .. } => AudioErrorCodes::BPM_INVALID,
            AudioError::AlreadyRunning => AudioErrorCodes::ALREADY_RUNNING,
            AudioError::NotRunning => AudioErrorCodes::NOT_RUNNING,
            AudioError::MalformedFrame { .. } => AudioErrorCodes::MALFORMED_FRAME,
            AudioError::InvalidSampleRate { .. } => AudioErrorCodes::INVALID_SAMPLE_RATE,
            AudioError::StreamFailure { .. } => AudioErrorCodes::STREAM_FAILURE,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
            AudioError::BufferPoolExhausted => AudioErrorCodes::BUFFER_POOL_EXHAUSTED,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::BpmInvalid { bpm } => {
                format!("BPM must be greater than 0 (got {})", bpm)
            }
            AudioError::AlreadyRunning => {
                "Listening session already running. Call stop_listening() first.".to_string()
            }
            AudioError::NotRunning => {
                "Listening session not running. Call start_listening() first.".to_string()
            }
            AudioError::MalformedFrame { expected, actual } => {
                format!(
                    "Malformed frame: expected {} samples, got {}",
                    expected, actual
                )
            }
            AudioError::InvalidSampleRate { sample_rate } => {
                format!("Invalid sample rate: {}", sample_rate)
            }
            AudioError::StreamFailure { reason } => {
                format!("Stream failed: {}", reason)
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            AudioError::BufferPoolExhausted => {
                "Frame buffer pool exhausted; analysis is falling behind capture".to_string()
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_error_codes() {
        assert_eq!(
            AudioError::BpmInvalid { bpm: 0.0 }.code(),
            AudioErrorCodes::BPM_INVALID
        );
        assert_eq!(
            AudioError::AlreadyRunning.code(),
            AudioErrorCodes::ALREADY_RUNNING
        );
        assert_eq!(AudioError::NotRunning.code(), AudioErrorCodes::NOT_RUNNING);
        assert_eq!(
            AudioError::MalformedFrame {
                expected: 2048,
                actual: 100
            }
            .code(),
            AudioErrorCodes::MALFORMED_FRAME
        );
        assert_eq!(
            AudioError::InvalidSampleRate { sample_rate: 0 }.code(),
            AudioErrorCodes::INVALID_SAMPLE_RATE
        );
        assert_eq!(
            AudioError::StreamFailure {
                reason: "test".to_string()
            }
            .code(),
            AudioErrorCodes::STREAM_FAILURE
        );
        assert_eq!(
            AudioError::LockPoisoned {
                component: "test".to_string()
            }
            .code(),
            AudioErrorCodes::LOCK_POISONED
        );
        assert_eq!(
            AudioError::BufferPoolExhausted.code(),
            AudioErrorCodes::BUFFER_POOL_EXHAUSTED
        );
    }

    #[test]
    fn test_audio_error_messages() {
        let err = AudioError::BpmInvalid { bpm: 0.0 };
        assert_eq!(err.message(), "BPM must be greater than 0 (got 0)");

        let err = AudioError::MalformedFrame {
            expected: 2048,
            actual: 512,
        };
        assert!(err.message().contains("expected 2048"));
        assert!(err.message().contains("got 512"));

        let err = AudioError::NotRunning;
        assert!(err.message().contains("not running"));
    }

    #[test]
    fn test_audio_error_display() {
        let err = AudioError::InvalidSampleRate { sample_rate: 0 };
        let display = format!("{}", err);
        assert!(display.contains("AudioError"));
        assert!(display.contains(&err.code().to_string()));
    }
}
