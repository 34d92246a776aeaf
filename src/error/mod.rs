//! Failure taxonomy shared by every stage of a sweep.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the harness error type.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Everything that can go wrong while generating, running or measuring a cell.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Malformed generator or matrix arguments, raised before any I/O.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The subject binary did not terminate within the session bound.
    #[error("session timed out after {elapsed:.3}s (limit {limit:.3}s)")]
    SessionTimeout { elapsed: f64, limit: f64 },

    /// The subject binary exited non-zero or was killed by a signal.
    #[error("session failed with {status}")]
    SessionFailed { status: ExitState, output: String },

    /// A metric pattern matched text that could not be cast.
    #[error("malformed metric: pattern `{pattern}` captured `{captured}`")]
    MalformedMetric { pattern: String, captured: String },

    /// The subject binary path is missing or lacks execute permission.
    #[error("binary {} missing or not executable", .0.display())]
    BinaryNotExecutable(PathBuf),

    /// The subject binary could not be launched.
    #[error("failed to launch {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("chart error: {0}")]
    Chart(String),
}

impl HarnessError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    /// Classifies the error for the per-cell failure sentinel.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidParameter(_) => FailureKind::InvalidParameter,
            Self::SessionTimeout { .. } => FailureKind::SessionTimeout,
            Self::SessionFailed { .. } => FailureKind::SessionFailed,
            Self::MalformedMetric { .. } => FailureKind::MalformedMetric,
            Self::BinaryNotExecutable(_) | Self::Spawn { .. } => FailureKind::Launch,
            Self::Io(_) | Self::Json(_) | Self::Chart(_) => FailureKind::Io,
        }
    }
}

/// How a subject-binary session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitState {
    /// Normal exit with the given code.
    Exited(i32),
    /// Terminated by a signal (or no exit code was reported).
    Killed,
    /// Killed by the harness after the session bound elapsed.
    TimedOut,
}

impl ExitState {
    pub fn success(&self) -> bool {
        matches!(self, ExitState::Exited(0))
    }
}

impl From<std::process::ExitStatus> for ExitState {
    fn from(status: std::process::ExitStatus) -> Self {
        match status.code() {
            Some(code) => ExitState::Exited(code),
            None => ExitState::Killed,
        }
    }
}

impl fmt::Display for ExitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitState::Exited(code) => write!(f, "exit code {}", code),
            ExitState::Killed => write!(f, "termination by signal"),
            ExitState::TimedOut => write!(f, "timeout"),
        }
    }
}

/// Failure marker recorded in place of a cell's metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    InvalidParameter,
    SessionTimeout,
    SessionFailed,
    MalformedMetric,
    Launch,
    Io,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::InvalidParameter => "InvalidParameter",
            FailureKind::SessionTimeout => "SessionTimeout",
            FailureKind::SessionFailed => "SessionFailed",
            FailureKind::MalformedMetric => "MalformedMetric",
            FailureKind::Launch => "Launch",
            FailureKind::Io => "Io",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_variants() {
        assert_eq!(HarnessError::invalid("x").kind(), FailureKind::InvalidParameter);
        let timeout = HarnessError::SessionTimeout { elapsed: 2.0, limit: 1.0 };
        assert_eq!(timeout.kind(), FailureKind::SessionTimeout);
        let failed = HarnessError::SessionFailed { status: ExitState::Exited(3), output: String::new() };
        assert_eq!(failed.kind(), FailureKind::SessionFailed);
        assert_eq!(failed.to_string(), "session failed with exit code 3");
    }

    #[test]
    fn only_zero_exit_is_success() {
        assert!(ExitState::Exited(0).success());
        assert!(!ExitState::Exited(1).success());
        assert!(!ExitState::Killed.success());
        assert!(!ExitState::TimedOut.success());
    }
}
