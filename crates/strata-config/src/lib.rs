//! Layered per-service configuration for Strata services.
//!
//! Each service resolves its configuration once at startup from two TOML
//! layers and the process environment:
//!
//! - `business_logic.toml` - shared base layer, identical for every service
//! - `<SERVICE_NAME>.toml` - service layer, optional
//! - `STRATA__SECTION__KEY` environment variables - per-deployment overrides
//!
//! # Precedence
//!
//! The merge is shallow. A top-level key in the service layer replaces the
//! base value entirely, including whole tables and arrays. Environment
//! variables then win over either layer for the field they name.
//!
//! # Example
//!
//! ```no_run
//! use strata_config::resolve_from_env;
//!
//! let settings = match resolve_from_env() {
//!     Ok(settings) => settings,
//!     Err(e) => {
//!         eprintln!("configuration failed ({}): {e}", e.kind());
//!         std::process::exit(1);
//!     }
//! };
//! println!("{} running in {}", settings.service_name, settings.environment);
//! ```
//!
//! # Layer File Format
//!
//! ```toml
//! environment = "production"
//!
//! [redis]
//! url = "redis://redis:6379"
//!
//! [exchanges.deribit]
//! client_id = "abc"
//! client_secret = "def"
//!
//! [[tradable]]
//! spot = ["BTC", "ETH"]
//! ```
//!
//! # Secrets
//!
//! Secret fields can be read from files by appending `_FILE` to the override
//! variable, e.g. `STRATA__POSTGRES__PASSWORD_FILE=/run/secrets/pg`.

#![warn(missing_docs)]

mod env;
mod error;
mod layer;
mod locator;
mod merge;
mod resolver;
mod schema;
mod secret;
mod settings;
mod validate;

pub use env::{EnvOverrides, EnvSnapshot, DEFAULT_ENV_PREFIX, ENV_SEPARATOR, SECRET_FILE_SUFFIX};
pub use error::ConfigError;
pub use layer::{parse_layer, read_layer, ConfigLayer, LayerName, LayerStatus};
pub use locator::{locate, LayerSources, ServiceIdentity, BASE_LAYER_FILE, LAYER_EXTENSION};
pub use merge::{merge_layers, MergedConfig};
pub use resolver::{
    default_config_root, resolve, resolve_detailed, resolve_from_env, Resolution,
    ResolveOptions, Stage, BASE_PATH_VAR, CONFIG_DIR_VAR, SERVICE_NAME_VAR,
};
pub use schema::*;
pub use secret::{read_secret_file, Secret};
pub use settings::Settings;
pub use validate::{validate, KNOWN_KEYS};
