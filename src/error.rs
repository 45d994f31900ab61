//! Error handling for Phoneline
//!
//! Every error carries a human-readable cause and, where it makes sense,
//! recovery suggestions that the caller can surface to the listener.

use thiserror::Error;

/// Result type alias for Phoneline operations
pub type Result<T> = std::result::Result<T, PhonelineError>;

/// Main error type for Phoneline operations
#[derive(Error, Debug)]
pub enum PhonelineError {
    // Capture Errors
    #[error("Audio device unavailable: {reason}")]
    DeviceUnavailable { reason: String },

    // Decode Errors
    #[error("Could not decode audio: {reason}")]
    DecodeFailure {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Session Errors
    #[error("Invalid graph state: {reason}")]
    GraphState { reason: String },

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PhonelineError {
    /// Shorthand for a decode failure without an underlying source
    pub fn decode(reason: impl Into<String>) -> Self {
        PhonelineError::DecodeFailure {
            reason: reason.into(),
            source: None,
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            PhonelineError::DeviceUnavailable { .. } => "DEVICE_UNAVAILABLE",
            PhonelineError::DecodeFailure { .. } => "DECODE_FAILURE",
            PhonelineError::GraphState { .. } => "GRAPH_STATE",
            PhonelineError::Config { .. } => "CONFIG_ERROR",
            PhonelineError::Io(_) => "IO_ERROR",
            PhonelineError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors leave the controller usable for a new session.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PhonelineError::DeviceUnavailable { .. }
                | PhonelineError::DecodeFailure { .. }
                | PhonelineError::GraphState { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            PhonelineError::DeviceUnavailable { .. } => vec![
                "Check that the input device is connected",
                "Allow access to the microphone and try again",
            ],
            PhonelineError::DecodeFailure { .. } => vec![
                "Record the message again",
                "Supported input: WAV, mono or stereo, 8/16/24/32-bit",
            ],
            PhonelineError::Config { .. } => vec![
                "Run 'phoneline-cli print-config' to see the defaults",
                "Remove the offending key to fall back to its default",
            ],
            _ => vec![],
        }
    }

    /// Get a user-friendly message for this error
    pub fn friendly_message(&self) -> String {
        match self {
            PhonelineError::DeviceUnavailable { reason } => {
                format!("The line is dead before it started: {}. Is a microphone available?", reason)
            }
            PhonelineError::DecodeFailure { reason, .. } => {
                format!("Your message could not be played back ({}). Please record it again.", reason)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = PhonelineError::decode("truncated header");
        assert_eq!(err.error_code(), "DECODE_FAILURE");

        let err = PhonelineError::DeviceUnavailable {
            reason: "no input".to_string(),
        };
        assert_eq!(err.error_code(), "DEVICE_UNAVAILABLE");
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = PhonelineError::decode("empty buffer");
        assert!(!err.recovery_suggestions().is_empty());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_friendly_message_carries_cause() {
        let err = PhonelineError::decode("not a RIFF file");
        assert!(err.friendly_message().contains("not a RIFF file"));
    }

    #[test]
    fn test_io_error_not_recoverable() {
        let err: PhonelineError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.error_code(), "IO_ERROR");
        assert!(!err.is_recoverable());
    }
}
