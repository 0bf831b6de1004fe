// Error types for the riff trainer core
//
// This module defines custom error types for the audio pipeline and for the
// external collaborators, providing structured error handling with error
// codes suitable for reporting to a presentation layer.

mod audio;
mod collaborator;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use collaborator::{log_collaborator_error, CollaboratorError, CollaboratorErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the UI boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
