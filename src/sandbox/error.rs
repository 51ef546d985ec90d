//! Domain-specific error types for sandbox operations.
//!
//! Typed errors enable callers to match on specific failure modes. The
//! `Display` text of `Api` errors keeps the HTTP status visible because the
//! retry executor classifies failures by status code substring.

use std::time::Duration;

/// Errors that can occur during sandbox operations.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The sandbox service answered with a non-success HTTP status.
    #[error("Sandbox API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The sandbox service could not be reached at all.
    #[error("Sandbox service is not available: {message}")]
    Unavailable { message: String },

    /// A sandbox did not become ready within the allotted time.
    #[error("Sandbox did not become ready after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Sandbox is in an unrecoverable state (dead, exited, removing).
    #[error("Sandbox is unhealthy: {message}")]
    Unhealthy { message: String },

    /// No sandbox exists with the given id.
    #[error("Sandbox not found: {id}")]
    NotFound { id: String },

    /// A command could not be started or streamed inside the sandbox.
    #[error("Sandbox command failed: {message}")]
    ExecFailed { message: String },
}

impl SandboxError {
    /// Creates an `Api` error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Creates an `Unavailable` error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a `Timeout` error from a `Duration`.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout {
            timeout_secs: duration.as_secs(),
        }
    }

    /// Creates an `Unhealthy` error.
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::Unhealthy {
            message: message.into(),
        }
    }

    /// Creates a `NotFound` error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates an `ExecFailed` error.
    pub fn exec_failed(message: impl Into<String>) -> Self {
        Self::ExecFailed {
            message: message.into(),
        }
    }

    /// Returns true if the sandbox no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<bollard::errors::Error> for SandboxError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code,
                message,
            } => Self::api(status_code, message),
            other => Self::unavailable(other.to_string()),
        }
    }
}
