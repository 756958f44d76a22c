//! Reading a single configuration layer from disk.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use toml::Table;
use tracing::{info, warn};

use crate::ConfigError;

/// Which layer a mapping belongs to. Precedence follows the name alone:
/// `Service` always wins over `Base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerName {
    /// Shared business rules.
    Base,
    /// Operational tuning for one service.
    Service,
}

impl LayerName {
    /// Lowercase label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Service => "service",
        }
    }
}

impl fmt::Display for LayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of reading a layer file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerStatus {
    /// The file existed and parsed.
    Loaded,
    /// The file did not exist; the layer is empty.
    Absent,
}

/// A named layer with its location and raw mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLayer {
    /// Layer name.
    pub name: LayerName,
    /// Location the layer was read from.
    pub path: PathBuf,
    /// Whether the file was found.
    pub status: LayerStatus,
    /// Raw parsed values; empty when absent.
    pub values: Table,
}

impl ConfigLayer {
    /// Build an empty layer for a file that does not exist.
    pub fn absent(name: LayerName, path: impl Into<PathBuf>) -> Self {
        Self {
            name,
            path: path.into(),
            status: LayerStatus::Absent,
            values: Table::new(),
        }
    }

    /// Build a layer from in-memory values.
    pub fn loaded(name: LayerName, path: impl Into<PathBuf>, values: Table) -> Self {
        Self {
            name,
            path: path.into(),
            status: LayerStatus::Loaded,
            values,
        }
    }

    /// Whether the backing file was missing.
    pub fn is_absent(&self) -> bool {
        self.status == LayerStatus::Absent
    }
}

/// Read and parse the layer at `path`.
///
/// The file is read in full and closed before parsing.
///
/// # Errors
///
/// Returns `ConfigError::MalformedLayer` if the file exists but is not valid
/// UTF-8 TOML, and `ConfigError::UnreadableLayer` for any other I/O failure
/// except "not found", which yields an [`LayerStatus::Absent`] layer.
pub fn read_layer(name: LayerName, path: &Path) -> Result<ConfigLayer, ConfigError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!(layer = %name, path = %path.display(), "configuration layer absent");
            return Ok(ConfigLayer::absent(name, path));
        }
        Err(err) => return Err(ConfigError::unreadable_layer(path, err)),
    };

    match parse_layer(&bytes) {
        Ok(values) => {
            info!(
                layer = %name,
                path = %path.display(),
                keys = values.len(),
                "configuration layer loaded"
            );
            Ok(ConfigLayer::loaded(name, path, values))
        }
        Err(message) => {
            warn!(
                layer = %name,
                path = %path.display(),
                error = %message,
                "configuration layer malformed"
            );
            Err(ConfigError::malformed_layer(path, message))
        }
    }
}

/// Parse layer contents into a table.
pub fn parse_layer(bytes: &[u8]) -> Result<Table, String> {
    let content = std::str::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {e}"))?;
    content.parse::<Table>().map_err(|e| e.to_string())
}
