//! Configuration resolution error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort configuration resolution.
///
/// A missing service-specific layer is not represented here: it is reported
/// as [`LayerStatus::Absent`](crate::LayerStatus::Absent) instead.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The service identity cannot be used to name a layer file.
    #[error("invalid service identity {identity:?}: {reason}")]
    InvalidIdentity {
        /// The rejected identity.
        identity: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A layer file exists but could not be parsed.
    #[error("malformed configuration layer {path}: {message}")]
    MalformedLayer {
        /// Path to the layer file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A layer file exists but could not be read.
    #[error("failed to read configuration layer {path}")]
    UnreadableLayer {
        /// Path to the layer file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A required field is absent from every layer and the environment.
    #[error("missing required configuration field: {field}")]
    MissingRequiredField {
        /// Dotted path of the missing field.
        field: String,
    },

    /// A field is present but has the wrong shape.
    #[error("type mismatch for {field}: expected {expected}, found {actual}")]
    TypeMismatch {
        /// Dotted path of the field.
        field: String,
        /// Expected shape.
        expected: String,
        /// Shape actually found.
        actual: String,
    },

    /// A `_FILE` secret reference points at a file that cannot be read.
    #[error("failed to read secret file {path} referenced by {var}")]
    SecretFile {
        /// The environment variable holding the reference.
        var: String,
        /// Path to the secret file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Create a new invalid identity error.
    pub fn invalid_identity(identity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            identity: identity.into(),
            reason: reason.into(),
        }
    }

    /// Create a new malformed layer error.
    pub fn malformed_layer(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::MalformedLayer {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new unreadable layer error.
    pub fn unreadable_layer(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::UnreadableLayer {
            path: path.into(),
            source,
        }
    }

    /// Create a new missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
        }
    }

    /// Create a new type mismatch error.
    pub fn type_mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a new secret file error.
    pub fn secret_file(var: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SecretFile {
            var: var.into(),
            path: path.into(),
            source,
        }
    }

    /// Stable short name of the error kind, for operator-facing logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidIdentity { .. } => "invalid_identity",
            Self::MalformedLayer { .. } => "malformed_layer",
            Self::UnreadableLayer { .. } => "unreadable_layer",
            Self::MissingRequiredField { .. } => "missing_required_field",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::SecretFile { .. } => "secret_file",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_identity_error() {
        let err = ConfigError::invalid_identity("a/b", "contains a path separator");
        assert!(err.to_string().contains("\"a/b\""));
        assert!(err.to_string().contains("path separator"));
        assert_eq!(err.kind(), "invalid_identity");
    }

    #[test]
    fn test_malformed_layer_error() {
        let err = ConfigError::malformed_layer("/etc/strata/receiver.toml", "expected `=`");
        assert!(err.to_string().contains("/etc/strata/receiver.toml"));
        assert!(err.to_string().contains("expected `=`"));
        assert_eq!(err.kind(), "malformed_layer");
    }

    #[test]
    fn test_missing_field_error() {
        let err = ConfigError::missing_field("redis.url");
        assert!(err.to_string().contains("redis.url"));
        assert_eq!(err.kind(), "missing_required_field");
    }

    #[test]
    fn test_type_mismatch_error() {
        let err = ConfigError::type_mismatch("tradable[0].spot", "array of strings", "string");
        let message = err.to_string();
        assert!(message.contains("tradable[0].spot"));
        assert!(message.contains("array of strings"));
        assert!(message.contains("found string"));
    }

    #[test]
    fn test_secret_file_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ConfigError::secret_file("STRATA__POSTGRES__PASSWORD_FILE", "/run/secrets/pg", io);
        assert!(err.to_string().contains("STRATA__POSTGRES__PASSWORD_FILE"));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.kind(), "secret_file");
    }
}
