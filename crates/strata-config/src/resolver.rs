//! The resolution entrypoint.
//!
//! Resolution runs once at startup on the calling thread:
//!
//! ```text
//! LocateSources -> ReadBase -> ReadService -> Merge -> Validate -> Ready
//! ```
//!
//! The first failing stage ends resolution with its error; later stages do
//! not run and nothing is retried.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, info_span};

use crate::env::{EnvOverrides, EnvSnapshot, DEFAULT_ENV_PREFIX};
use crate::{
    locate, read_layer, validate, ConfigError, ConfigLayer, LayerName, MergedConfig,
    ServiceIdentity, Settings,
};

/// Variable naming the running service.
pub const SERVICE_NAME_VAR: &str = "SERVICE_NAME";

/// Variable overriding the base layer file location.
pub const BASE_PATH_VAR: &str = "BUSINESS_LOGIC_CONFIG_PATH";

/// Variable overriding the directory that holds layer files.
pub const CONFIG_DIR_VAR: &str = "STRATA_CONFIG_DIR";

/// Layer directory shipped alongside this crate.
pub fn default_config_root() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/config"))
}

/// Resolution stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Computing layer paths.
    LocateSources,
    /// Reading the base layer.
    ReadBase,
    /// Reading the service layer.
    ReadService,
    /// Merging layers.
    Merge,
    /// Binding onto [`Settings`].
    Validate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LocateSources => "locate_sources",
            Self::ReadBase => "read_base",
            Self::ReadService => "read_service",
            Self::Merge => "merge",
            Self::Validate => "validate",
        })
    }
}

/// Inputs to one resolution.
///
/// # Example
///
/// ```no_run
/// use strata_config::{resolve, EnvSnapshot, ResolveOptions};
///
/// # fn main() -> Result<(), strata_config::ConfigError> {
/// let options = ResolveOptions::new("receiver")
///     .with_config_root("/etc/strata")
///     .with_env(EnvSnapshot::from_process());
/// let settings = resolve(&options)?;
/// println!("redis at {}", settings.redis.url);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    service: String,
    config_root: PathBuf,
    base_override: Option<PathBuf>,
    env_prefix: String,
    env: EnvSnapshot,
}

impl ResolveOptions {
    /// Options for `service` with the default config root, the default
    /// override prefix and an empty environment.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            config_root: default_config_root(),
            base_override: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            env: EnvSnapshot::new(),
        }
    }

    /// Options taken from the process environment.
    pub fn from_env() -> Self {
        Self::from_snapshot(EnvSnapshot::from_process())
    }

    /// Options taken from an environment snapshot: `SERVICE_NAME` selects
    /// the service, `STRATA_CONFIG_DIR` the config root and
    /// `BUSINESS_LOGIC_CONFIG_PATH` the base layer file. An unset
    /// `SERVICE_NAME` is reported when resolution starts.
    pub fn from_snapshot(env: EnvSnapshot) -> Self {
        let mut options = Self::new(env.get(SERVICE_NAME_VAR).unwrap_or_default());
        if let Some(dir) = env.get_non_empty(CONFIG_DIR_VAR) {
            options.config_root = PathBuf::from(dir);
        }
        if let Some(base) = env.get_non_empty(BASE_PATH_VAR) {
            options.base_override = Some(PathBuf::from(base));
        }
        options.env = env;
        options
    }

    /// Resolve for `service` instead of the one given at construction.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Directory holding `business_logic.toml` and `<service>.toml`.
    #[must_use]
    pub fn with_config_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config_root = root.into();
        self
    }

    /// Read the base layer from this file instead of the config root.
    #[must_use]
    pub fn with_base_override(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_override = Some(path.into());
        self
    }

    /// Prefix for field override variables (default `STRATA`).
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into().to_uppercase();
        self
    }

    /// Environment used for field overrides.
    #[must_use]
    pub fn with_env(mut self, env: EnvSnapshot) -> Self {
        self.env = env;
        self
    }

    /// Add variables from a `.env` file; variables already in the snapshot win.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MalformedLayer` if the file exists but cannot be
    /// parsed.
    pub fn with_dotenv(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        self.env = self.env.with_dotenv(path.as_ref())?;
        Ok(self)
    }

    /// Service the options resolve for.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Directory layer files are read from.
    pub fn config_root(&self) -> &Path {
        &self.config_root
    }
}

/// A successful resolution with the inputs that produced it.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The validated settings.
    pub settings: Settings,
    /// The base and service layers as read.
    pub layers: Vec<ConfigLayer>,
    /// The merged mapping before validation.
    pub merged: MergedConfig,
}

/// Resolve settings.
///
/// # Errors
///
/// Returns the error of the first stage that fails.
pub fn resolve(options: &ResolveOptions) -> Result<Settings, ConfigError> {
    resolve_detailed(options).map(|resolution| resolution.settings)
}

/// Resolve settings using the process environment.
///
/// # Errors
///
/// Returns the error of the first stage that fails.
pub fn resolve_from_env() -> Result<Settings, ConfigError> {
    resolve(&ResolveOptions::from_env())
}

/// Resolve settings and keep the layers and merged mapping.
///
/// # Errors
///
/// Returns the error of the first stage that fails.
pub fn resolve_detailed(options: &ResolveOptions) -> Result<Resolution, ConfigError> {
    let span = info_span!("resolve_config", service = %options.service);
    let _entered = span.enter();

    let mut stage = Stage::LocateSources;
    let result = run_stages(options, &mut stage);
    if let Err(err) = &result {
        debug!(stage = %stage, kind = err.kind(), "configuration resolution failed");
    }
    result
}

fn run_stages(options: &ResolveOptions, stage: &mut Stage) -> Result<Resolution, ConfigError> {
    enter(stage, Stage::LocateSources);
    let identity = ServiceIdentity::new(options.service.as_str())?;
    let mut sources = locate(&identity, &options.config_root);
    if let Some(base) = &options.base_override {
        sources = sources.with_base_override(base);
    }

    enter(stage, Stage::ReadBase);
    let base = read_layer(LayerName::Base, &sources.base)?;

    enter(stage, Stage::ReadService);
    let service = read_layer(LayerName::Service, &sources.service)?;

    enter(stage, Stage::Merge);
    let layers = vec![base, service];
    let merged = MergedConfig::from_layers(&layers);

    enter(stage, Stage::Validate);
    let env = EnvOverrides::new(&options.env, &options.env_prefix);
    let settings = validate(&merged, &identity, env)?;

    info!(
        service = %identity,
        environment = %settings.environment,
        "configuration ready"
    );
    Ok(Resolution {
        settings,
        layers,
        merged,
    })
}

fn enter(current: &mut Stage, next: Stage) {
    *current = next;
    debug!(stage = %next, "configuration stage");
}
