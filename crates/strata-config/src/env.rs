//! Environment variable snapshot and prefixed field overrides.
//!
//! The process environment is captured once into an [`EnvSnapshot`] so that
//! resolution never re-reads or mutates global state, and tests can supply
//! their own variables without touching the real environment.
//!
//! Field overrides use the format `PREFIX__SECTION__KEY`, for example
//! `STRATA__REDIS__URL` or `STRATA__EXCHANGES__DERIBIT__CLIENT_ID`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::debug;

use crate::ConfigError;

/// Default prefix for field override variables.
pub const DEFAULT_ENV_PREFIX: &str = "STRATA";

/// Separator between path segments in override variable names.
pub const ENV_SEPARATOR: &str = "__";

/// Suffix marking a variable that names a file holding a secret value.
pub const SECRET_FILE_SUFFIX: &str = "_FILE";

/// Immutable copy of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current process environment. Variables whose name or
    /// value is not valid Unicode are skipped.
    pub fn from_process() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    /// Add or replace a variable.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Fill in variables from a `.env` file. Variables already present in
    /// the snapshot win. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MalformedLayer` if the file exists but cannot be
    /// parsed.
    pub fn with_dotenv(mut self, path: &Path) -> Result<Self, ConfigError> {
        let iter = match dotenvy::from_path_iter(path) {
            Ok(iter) => iter,
            Err(e) if e.not_found() => {
                debug!(path = %path.display(), "no .env file");
                return Ok(self);
            }
            Err(e) => return Err(ConfigError::malformed_layer(path, e.to_string())),
        };

        let mut added = 0usize;
        for item in iter {
            let (key, value) = item.map_err(|e| ConfigError::malformed_layer(path, e.to_string()))?;
            if !self.vars.contains_key(&key) {
                self.vars.insert(key, value);
                added += 1;
            }
        }
        debug!(path = %path.display(), added, ".env file applied");
        Ok(self)
    }

    /// Look up a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Look up a variable, treating an empty value as unset.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Iterate over variables whose name starts with `prefix`.
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.vars
            .range(prefix.to_string()..)
            .take_while(move |(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Prefixed view of an [`EnvSnapshot`] addressing configuration fields by path.
#[derive(Debug, Clone, Copy)]
pub struct EnvOverrides<'a> {
    snapshot: &'a EnvSnapshot,
    prefix: &'a str,
}

impl<'a> EnvOverrides<'a> {
    /// View `snapshot` through `prefix` (e.g. `"STRATA"`).
    pub fn new(snapshot: &'a EnvSnapshot, prefix: &'a str) -> Self {
        Self { snapshot, prefix }
    }

    /// Variable name for a field path, e.g. `["redis", "url"]` becomes
    /// `STRATA__REDIS__URL`.
    pub fn var_name(&self, segments: &[String]) -> String {
        let mut name = self.prefix.to_uppercase();
        for segment in segments {
            name.push_str(ENV_SEPARATOR);
            name.push_str(&segment.to_uppercase());
        }
        name
    }

    /// Raw override for a field path, with the variable name it came from.
    /// An empty value counts as unset, as it does for `_FILE` references.
    pub fn get(&self, segments: &[String]) -> Option<(String, &'a str)> {
        let var = self.var_name(segments);
        self.snapshot.get_non_empty(&var).map(|value| (var, value))
    }

    /// Secret file reference for a field path (`…_FILE`), if set and non-empty.
    pub fn secret_file(&self, segments: &[String]) -> Option<(String, &'a str)> {
        let var = format!("{}{SECRET_FILE_SUFFIX}", self.var_name(segments));
        self.snapshot.get_non_empty(&var).map(|value| (var, value))
    }

    /// Whether any override addresses a field at or below `segments`.
    pub fn has_any_under(&self, segments: &[String]) -> bool {
        let base = self.var_name(segments);
        let nested = format!("{base}{ENV_SEPARATOR}");
        let found = self
            .snapshot
            .with_prefix(&base)
            .any(|(k, v)| !v.is_empty() && (k == base || k.starts_with(&nested)));
        found
    }

    /// Keys introduced directly below `segments` by override variables,
    /// lowercased. Used for tables with caller-chosen keys.
    pub fn child_keys(&self, segments: &[String]) -> BTreeSet<String> {
        let nested = format!("{}{ENV_SEPARATOR}", self.var_name(segments));
        let keys = self
            .snapshot
            .with_prefix(&nested)
            .filter(|(_, v)| !v.is_empty())
            .filter_map(|(k, _)| {
                let rest = &k[nested.len()..];
                let key = rest.split(ENV_SEPARATOR).next()?;
                // A bare `…__KEY` with no further segment names a field, not an entry.
                if key.is_empty() || rest.len() == key.len() {
                    return None;
                }
                Some(key.to_lowercase())
            })
            .collect();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn segments(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_var_name() {
        let env = EnvSnapshot::new();
        let overrides = EnvOverrides::new(&env, "strata");
        assert_eq!(
            overrides.var_name(&segments(&["redis", "url"])),
            "STRATA__REDIS__URL"
        );
        assert_eq!(overrides.var_name(&[]), "STRATA");
    }

    #[test]
    fn test_get_and_secret_file() {
        let env = EnvSnapshot::new()
            .with_var("STRATA__REDIS__URL", "redis://env:6379")
            .with_var("STRATA__POSTGRES__PASSWORD_FILE", "/run/secrets/pg")
            .with_var("STRATA__OCI__PASSWORD_FILE", "");
        let overrides = EnvOverrides::new(&env, DEFAULT_ENV_PREFIX);

        let (var, value) = overrides.get(&segments(&["redis", "url"])).unwrap();
        assert_eq!(var, "STRATA__REDIS__URL");
        assert_eq!(value, "redis://env:6379");

        let (var, path) = overrides
            .secret_file(&segments(&["postgres", "password"]))
            .unwrap();
        assert_eq!(var, "STRATA__POSTGRES__PASSWORD_FILE");
        assert_eq!(path, "/run/secrets/pg");

        assert!(overrides.secret_file(&segments(&["oci", "password"])).is_none());
    }

    #[test]
    fn test_empty_override_is_unset() {
        let env = EnvSnapshot::new()
            .with_var("STRATA__ENVIRONMENT", "")
            .with_var("STRATA__REDIS__URL", "redis://env:6379");
        let overrides = EnvOverrides::new(&env, DEFAULT_ENV_PREFIX);

        assert!(overrides.get(&segments(&["environment"])).is_none());
        assert!(overrides.get(&segments(&["redis", "url"])).is_some());
    }

    #[test]
    fn test_has_any_under() {
        let env = EnvSnapshot::new()
            .with_var("STRATA__POSTGRES__HOST", "db")
            .with_var("STRATA__POSTGRESQL", "unrelated");
        let overrides = EnvOverrides::new(&env, DEFAULT_ENV_PREFIX);

        assert!(overrides.has_any_under(&segments(&["postgres"])));
        assert!(!overrides.has_any_under(&segments(&["oci"])));
        assert!(overrides.has_any_under(&segments(&["postgresql"])));
        assert!(!overrides.has_any_under(&segments(&["postgre"])));
    }

    #[test]
    fn test_child_keys() {
        let env = EnvSnapshot::new()
            .with_var("STRATA__EXCHANGES__DERIBIT__CLIENT_ID", "id")
            .with_var("STRATA__EXCHANGES__DERIBIT__CLIENT_SECRET_FILE", "/s")
            .with_var("STRATA__EXCHANGES__BINANCE__WS_URL", "wss://b")
            .with_var("STRATA__EXCHANGES__FLAT", "ignored")
            .with_var("STRATA__REDIS__URL", "redis://x");
        let overrides = EnvOverrides::new(&env, DEFAULT_ENV_PREFIX);

        let keys: Vec<_> = overrides
            .child_keys(&segments(&["exchanges"]))
            .into_iter()
            .collect();
        assert_eq!(keys, vec!["binance".to_string(), "deribit".to_string()]);
    }

    #[test]
    fn test_dotenv_does_not_override_existing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "SERVICE_NAME=from-dotenv\nSTRATA__ENVIRONMENT=staging").unwrap();
        file.flush().unwrap();

        let env = EnvSnapshot::new()
            .with_var("SERVICE_NAME", "receiver")
            .with_dotenv(file.path())
            .unwrap();

        assert_eq!(env.get("SERVICE_NAME"), Some("receiver"));
        assert_eq!(env.get("STRATA__ENVIRONMENT"), Some("staging"));
    }

    #[test]
    fn test_dotenv_missing_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let env = EnvSnapshot::new()
            .with_dotenv(&dir.path().join(".env"))
            .unwrap();
        assert_eq!(env, EnvSnapshot::new());
    }

    #[test]
    fn test_from_iterator() {
        let env: EnvSnapshot = [("A", "1"), ("B", "2")].into_iter().collect();
        assert_eq!(env.get("A"), Some("1"));
        assert_eq!(env.get_non_empty("C"), None);
    }
}
