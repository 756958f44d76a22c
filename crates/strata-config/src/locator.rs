//! Layer file discovery.
//!
//! Maps a service identity onto the two layer files it resolves from. This is
//! a naming convention, not a lookup: nothing here touches the filesystem.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::ConfigError;

/// File name of the shared base layer inside the config root.
pub const BASE_LAYER_FILE: &str = "business_logic.toml";

/// Extension appended to the service identity to name its layer file.
pub const LAYER_EXTENSION: &str = "toml";

/// Name of the running service, used verbatim to select its layer file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceIdentity(String);

impl ServiceIdentity {
    /// Validate and wrap a service name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidIdentity` if the name is empty, is `.` or
    /// `..`, or contains a path separator or NUL byte.
    pub fn new(identity: impl Into<String>) -> Result<Self, ConfigError> {
        let identity = identity.into();

        if identity.is_empty() {
            return Err(ConfigError::invalid_identity(identity, "must not be empty"));
        }
        if identity == "." || identity == ".." {
            return Err(ConfigError::invalid_identity(
                identity,
                "must not be a relative directory name",
            ));
        }
        if identity.contains(['/', '\\']) {
            return Err(ConfigError::invalid_identity(
                identity,
                "must not contain a path separator",
            ));
        }
        if identity.contains('\0') {
            return Err(ConfigError::invalid_identity(identity, "must not contain NUL"));
        }

        Ok(Self(identity))
    }

    /// The identity as given.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of this identity's layer, e.g. `receiver.toml`.
    pub fn layer_file_name(&self) -> String {
        format!("{}.{LAYER_EXTENSION}", self.0)
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Candidate locations of the base and service layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSources {
    /// Shared base layer.
    pub base: PathBuf,
    /// Service-specific layer.
    pub service: PathBuf,
}

impl LayerSources {
    /// Replace the base layer location, keeping the service layer as located.
    #[must_use]
    pub fn with_base_override(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = base.into();
        self
    }
}

/// Compute both layer locations for `identity` under `config_root`.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use strata_config::{locate, ServiceIdentity};
///
/// let identity = ServiceIdentity::new("receiver").unwrap();
/// let sources = locate(&identity, Path::new("/etc/strata"));
/// assert_eq!(sources.base, Path::new("/etc/strata/business_logic.toml"));
/// assert_eq!(sources.service, Path::new("/etc/strata/receiver.toml"));
/// ```
pub fn locate(identity: &ServiceIdentity, config_root: &Path) -> LayerSources {
    LayerSources {
        base: config_root.join(BASE_LAYER_FILE),
        service: config_root.join(identity.layer_file_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_builds_both_paths() {
        let identity = ServiceIdentity::new("executor").unwrap();
        let sources = locate(&identity, Path::new("/srv/config"));
        assert_eq!(sources.base, PathBuf::from("/srv/config/business_logic.toml"));
        assert_eq!(sources.service, PathBuf::from("/srv/config/executor.toml"));
    }

    #[test]
    fn test_base_path_is_identity_independent() {
        let root = Path::new("cfg");
        let a = locate(&ServiceIdentity::new("receiver").unwrap(), root);
        let b = locate(&ServiceIdentity::new("janitor").unwrap(), root);
        assert_eq!(a.base, b.base);
        assert_ne!(a.service, b.service);
    }

    #[test]
    fn test_identity_used_verbatim() {
        let identity = ServiceIdentity::new("Market-Data.v2").unwrap();
        assert_eq!(identity.layer_file_name(), "Market-Data.v2.toml");
        assert_eq!(identity.to_string(), "Market-Data.v2");
    }

    #[test]
    fn test_rejects_path_separators() {
        for bad in ["a/b", "../etc/passwd", "a\\b", "/abs"] {
            let err = ServiceIdentity::new(bad).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidIdentity { .. }), "{bad}");
        }
    }

    #[test]
    fn test_rejects_empty_and_dot_names() {
        for bad in ["", ".", ".."] {
            assert!(ServiceIdentity::new(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_base_override() {
        let identity = ServiceIdentity::new("receiver").unwrap();
        let sources =
            locate(&identity, Path::new("/srv/config")).with_base_override("/opt/shared/rules.toml");
        assert_eq!(sources.base, PathBuf::from("/opt/shared/rules.toml"));
        assert_eq!(sources.service, PathBuf::from("/srv/config/receiver.toml"));
    }
}
