//! Error types for device sessions and policy loading.
//!
//! Session errors are categorized so the connection retry loop can tell a
//! transient transport hiccup from a device that will never answer.

use std::time::Duration;
use thiserror::Error;

/// Categories of session errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transport-level failure while establishing the session (retryable)
    Transport,
    /// Credentials rejected by the device
    Authentication,
    /// Device did not answer at all (connect timeout, no route)
    Unreachable,
    /// Expected prompt did not appear in time
    Timeout,
    /// Session went away mid-conversation
    Closed,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether a fresh connection attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport)
    }
}

/// Errors raised by a remote command session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session could not be established
    #[error("connection failed: {message}")]
    Connect {
        /// Raw text explaining the failure
        message: String,
    },

    /// Device rejected the credentials
    #[error("authentication failed: {message}")]
    Authentication {
        /// Raw text explaining the failure
        message: String,
    },

    /// Device never answered
    #[error("device unreachable: {message}")]
    Unreachable {
        /// Raw text explaining the failure
        message: String,
    },

    /// Expected pattern not seen before the deadline
    #[error("timed out after {}s waiting for '{expected}' (command: '{command}')", waited.as_secs())]
    Timeout {
        /// Command that was sent
        command: String,
        /// Pattern that was awaited
        expected: String,
        /// How long we waited
        waited: Duration,
        /// Everything captured before giving up
        output: String,
    },

    /// Session closed by the remote side
    #[error("session closed")]
    Closed {
        /// Everything captured before the close
        output: String,
    },

    /// Device answered with something the exchange does not understand
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the deviation
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            SessionError::Connect { .. } => ErrorCategory::Transport,
            SessionError::Authentication { .. } => ErrorCategory::Authentication,
            SessionError::Unreachable { .. } => ErrorCategory::Unreachable,
            SessionError::Timeout { .. } => ErrorCategory::Timeout,
            SessionError::Closed { .. } => ErrorCategory::Closed,
            SessionError::Io(_) => ErrorCategory::Transport,
            SessionError::Protocol { .. } => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether the session is gone for good.
    pub fn is_closed(&self) -> bool {
        matches!(self, SessionError::Closed { .. })
    }

    /// Text captured from the device before the error, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            SessionError::Timeout { output, .. } | SessionError::Closed { output } => {
                Some(output.as_str())
            }
            _ => None,
        }
    }
}

/// Errors in a firmware policy table.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Pattern failed to compile
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Regex compiler error
        #[source]
        source: regex::Error,
    },

    /// Table content is inconsistent
    #[error("invalid policy: {0}")]
    Invalid(String),
}

/// Errors that stop a fleet run before any device is processed.
#[derive(Debug, Error)]
pub enum RunError {
    /// Worker pool could not be created
    #[error("failed to create worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Policy table rejected
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Timeout settings inconsistent
    #[error("invalid timeouts: {0}")]
    Timeouts(String),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
