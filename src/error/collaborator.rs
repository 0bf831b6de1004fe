// Collaborator error types
//
// Failures reported by external collaborators (harmonic-context service,
// capture device). These are surfaced as recoverable failures and never
// mutate trainer or detector state.

use crate::error::ErrorCode;
use log::warn;
use std::fmt;

/// Collaborator error code constants
///
/// Error code range: 3001-3004
pub struct CollaboratorErrorCodes {}

impl CollaboratorErrorCodes {
    /// No pitch classes have been detected yet
    pub const EMPTY_PITCH_SET: i32 = 3001;

    /// The collaborator answered with a failure
    pub const REQUEST_FAILED: i32 = 3002;

    /// The collaborator did not answer in time
    pub const TIMEOUT: i32 = 3003;

    /// The collaborator could not be reached at all
    pub const UNAVAILABLE: i32 = 3004;
}

/// Log a collaborator failure.
///
/// Logged at warn level: these failures are expected at runtime and the
/// caller may retry.
pub fn log_collaborator_error(err: &CollaboratorError, context: &str) {
    warn!(
        "Collaborator error in {}: code={}, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised by external collaborators
#[derive(Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    /// Nothing to analyse yet
    EmptyPitchSet,

    /// The collaborator rejected or failed the request
    RequestFailed { reason: String },

    /// The request exceeded its deadline
    Timeout { after_ms: u64 },

    /// The collaborator (or capture device) is unavailable
    Unavailable { name: String },
}

impl ErrorCode for CollaboratorError {
    fn code(&self) -> i32 {
        match self {
            CollaboratorError::EmptyPitchSet => CollaboratorErrorCodes::EMPTY_PITCH_SET,
            CollaboratorError::RequestFailed { .. } => CollaboratorErrorCodes::REQUEST_FAILED,
            CollaboratorError::Timeout { .. } => CollaboratorErrorCodes::TIMEOUT,
            CollaboratorError::Unavailable { .. } => CollaboratorErrorCodes::UNAVAILABLE,
        }
    }

    fn message(&self) -> String {
        match self {
            CollaboratorError::EmptyPitchSet => {
                "No pitch classes detected yet. Play a few notes first.".to_string()
            }
            CollaboratorError::RequestFailed { reason } => {
                format!("Collaborator request failed: {}", reason)
            }
            CollaboratorError::Timeout { after_ms } => {
                format!("Collaborator timed out after {} ms", after_ms)
            }
            CollaboratorError::Unavailable { name } => {
                format!("Collaborator unavailable: {}", name)
            }
        }
    }
}

impl fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CollaboratorError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CollaboratorError {}
