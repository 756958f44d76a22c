//! Secret values and `_FILE` indirection.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Serialize, Serializer};
use tracing::warn;

use crate::ConfigError;

const REDACTED: &str = "********";

/// A string that never appears in logs or serialized output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The underlying value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({REDACTED})")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Read a secret from the file named by environment variable `var`.
///
/// Returns `Ok(None)` when the file does not exist, so callers fall back to
/// the plain value. Surrounding whitespace is trimmed.
///
/// # Errors
///
/// Returns `ConfigError::SecretFile` if the file exists but cannot be read.
pub fn read_secret_file(var: &str, path: &Path) -> Result<Option<Secret>, ConfigError> {
    if !path.exists() {
        warn!(var, path = %path.display(), "secret file not found, falling back");
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|e| ConfigError::secret_file(var, path, e))?;
    Ok(Some(Secret::new(content.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_secret_is_redacted() {
        let secret = Secret::new("hunter2");
        assert_eq!(secret.expose(), "hunter2");
        assert!(!format!("{secret:?}").contains("hunter2"));
        assert!(!secret.to_string().contains("hunter2"));
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"********\"");
    }

    #[test]
    fn test_read_secret_file_trims() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  s3cret  ").unwrap();
        file.flush().unwrap();

        let secret = read_secret_file("X_FILE", file.path()).unwrap().unwrap();
        assert_eq!(secret.expose(), "s3cret");
    }

    #[test]
    fn test_read_secret_file_missing_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_secret_file("X_FILE", &dir.path().join("missing")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_read_secret_file_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_secret_file("X_FILE", dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::SecretFile { .. }));
    }
}
