//! Shared error taxonomy for the loglens engine.
//!
//! One enum, one variant per kind (spec §7). Every fallible operation in
//! every crate returns [`Result<T>`]. Each variant carries a human message
//! and, where it makes sense, a `remediation` hint (a path, command, or
//! config key the caller can act on).

use std::fmt;

pub type Result<T> = std::result::Result<T, LoglensError>;

#[derive(Debug, thiserror::Error)]
pub enum LoglensError {
    #[error("configuration error: {message}")]
    Config {
        message: String,
        remediation: Option<String>,
    },

    #[error("io error: {message}")]
    Io {
        message: String,
        remediation: Option<String>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("validation error: {message}")]
    Validation {
        message: String,
        remediation: Option<String>,
    },

    #[error("policy denied: {message}")]
    Policy {
        message: String,
        remediation: Option<String>,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("rollback failed: {message}")]
    RollbackFailed {
        message: String,
        snapshot_path: Option<String>,
    },

    #[error("external collaborator error: {message}")]
    External { message: String },
}

impl LoglensError {
    pub fn config(message: impl Into<String>) -> Self {
        LoglensError::Config {
            message: message.into(),
            remediation: None,
        }
    }

    pub fn config_with(message: impl Into<String>, remediation: impl Into<String>) -> Self {
        LoglensError::Config {
            message: message.into(),
            remediation: Some(remediation.into()),
        }
    }

    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        LoglensError::Io {
            message: message.into(),
            remediation: None,
            source: Some(source),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        LoglensError::Validation {
            message: message.into(),
            remediation: None,
        }
    }

    pub fn policy(message: impl Into<String>) -> Self {
        LoglensError::Policy {
            message: message.into(),
            remediation: None,
        }
    }

    /// Stable, machine-readable kind tag (spec §7).
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoglensError::Config { .. } => ErrorKind::Config,
            LoglensError::Io { .. } => ErrorKind::Io,
            LoglensError::Parse { .. } => ErrorKind::Parse,
            LoglensError::Validation { .. } => ErrorKind::Validation,
            LoglensError::Policy { .. } => ErrorKind::Policy,
            LoglensError::Cancelled => ErrorKind::Cancelled,
            LoglensError::Timeout { .. } => ErrorKind::Timeout,
            LoglensError::RollbackFailed { .. } => ErrorKind::RollbackFailed,
            LoglensError::External { .. } => ErrorKind::External,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Io,
    Parse,
    Validation,
    Policy,
    Cancelled,
    Timeout,
    RollbackFailed,
    External,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Parse => "parse",
            ErrorKind::Validation => "validation",
            ErrorKind::Policy => "policy",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RollbackFailed => "rollback_failed",
            ErrorKind::External => "external",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_stable_strings() {
        assert_eq!(LoglensError::config("x").kind().to_string(), "config");
        assert_eq!(LoglensError::Cancelled.kind().to_string(), "cancelled");
        assert_eq!(
            LoglensError::Timeout { elapsed_ms: 10 }.kind().to_string(),
            "timeout"
        );
    }

    #[test]
    fn config_with_carries_remediation() {
        let e = LoglensError::config_with("bad theta", "set confidence_threshold in [0,1]");
        match e {
            LoglensError::Config { remediation, .. } => {
                assert_eq!(remediation.as_deref(), Some("set confidence_threshold in [0,1]"));
            }
            _ => panic!("wrong variant"),
        }
    }
}
