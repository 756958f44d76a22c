//! Binding the merged mapping and environment overrides onto [`Settings`].
//!
//! Each field is read from its override variable first and from the merged
//! mapping second. Values are checked against the field's declared shape as
//! they are read, so the first problem found is the one reported.

use std::any::type_name;
use std::collections::BTreeSet;
use std::path::Path;

use toml::{Table, Value};
use tracing::{debug, warn};

use crate::env::EnvOverrides;
use crate::schema::{
    DEFAULT_ANOMALY_CHECK_INTERVAL_S, DEFAULT_INSTRUMENT_SYNC_INTERVAL_S,
    DEFAULT_POSTGRES_PORT, DEFAULT_REDIS_DB, DEFAULT_STREAM_MAX_RETRIES,
};
use crate::secret::read_secret_file;
use crate::{
    tns_alias, AnalyzerSettings, ConfigError, ExchangeSettings, ExecutorServiceSettings,
    MergedConfig, NamedSections, OciSettings, PostgresSettings, ReconciliationSettings,
    RedisSettings, RedisStreamSettings, RegimeParameterSettings, RiskManagementSettings, Secret,
    ServiceIdentity, ServiceSettings, Settings, StrategySettings, TradableItem,
    UsdSyntheticStrategySettings,
};

/// Top-level keys understood by the validator.
pub const KNOWN_KEYS: &[&str] = &[
    "environment",
    "exchanges",
    "redis",
    "redis_streams",
    "postgres",
    "oci",
    "risk_management",
    "services",
    "regime_parameters",
    "strategies",
    "tradable",
    "analyzer",
];

/// Earlier layer files spell `strategies.usd_synthetic` in camel case.
const USD_SYNTHETIC_ALIAS: &str = "usdSynthetic";

/// Build [`Settings`] for `identity` from `merged` and `env`.
///
/// # Errors
///
/// Returns `ConfigError::MissingRequiredField` or `ConfigError::TypeMismatch`
/// for the first invalid field, or `ConfigError::SecretFile` if a secret file
/// reference cannot be read.
pub fn validate(
    merged: &MergedConfig,
    identity: &ServiceIdentity,
    env: EnvOverrides<'_>,
) -> Result<Settings, ConfigError> {
    for key in merged.values().keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            warn!(key = %key, origin = ?merged.origin(key), "ignoring unknown configuration key");
        }
    }

    let root = Node::root(merged.values(), env);

    let settings = Settings {
        service_name: identity.as_str().to_string(),
        environment: root.require("environment", root.string("environment")?)?,
        exchanges: named(&root.section("exchanges")?, exchange)?,
        redis: redis(&root.section("redis")?)?,
        redis_streams: redis_streams(&root.section("redis_streams")?)?,
        postgres: optional(root.section("postgres")?, postgres)?,
        oci: optional(root.section("oci")?, oci)?,
        risk_management: optional(root.section("risk_management")?, risk_management)?,
        services: optional(root.section("services")?, services)?,
        regime_parameters: named(&root.section("regime_parameters")?, regime)?,
        strategies: optional(root.section("strategies")?, strategies)?,
        tradable: root
            .table_list("tradable")?
            .iter()
            .map(tradable)
            .collect::<Result<_, _>>()?,
        analyzer: optional(root.section("analyzer")?, analyzer)?,
    };

    debug!(
        exchanges = settings.exchanges.len(),
        regimes = settings.regime_parameters.len(),
        tradable = settings.tradable.len(),
        "settings validated"
    );
    Ok(settings)
}

fn optional<T>(
    node: Node<'_>,
    build: impl FnOnce(&Node<'_>) -> Result<T, ConfigError>,
) -> Result<Option<T>, ConfigError> {
    if node.exists() {
        build(&node).map(Some)
    } else {
        Ok(None)
    }
}

fn named<T>(
    node: &Node<'_>,
    build: impl Fn(&Node<'_>) -> Result<T, ConfigError>,
) -> Result<NamedSections<T>, ConfigError> {
    let mut out = NamedSections::new();
    for key in node.keys() {
        let entry = node.section(&key)?;
        out.insert(key, build(&entry)?);
    }
    Ok(out)
}

fn exchange(node: &Node<'_>) -> Result<ExchangeSettings, ConfigError> {
    Ok(ExchangeSettings {
        client_id: node.require("client_id", node.secret("client_id")?)?,
        client_secret: node.require("client_secret", node.secret("client_secret")?)?,
        ws_url: node.string("ws_url")?,
        rest_url: node.string("rest_url")?,
    })
}

fn redis(node: &Node<'_>) -> Result<RedisSettings, ConfigError> {
    Ok(RedisSettings {
        url: node.require("url", node.string("url")?)?,
        db: node.integer("db")?.unwrap_or(DEFAULT_REDIS_DB),
        password: node.secret("password")?,
    })
}

fn redis_streams(node: &Node<'_>) -> Result<RedisStreamSettings, ConfigError> {
    Ok(RedisStreamSettings {
        max_retries: node
            .unsigned("max_retries")?
            .unwrap_or(DEFAULT_STREAM_MAX_RETRIES),
    })
}

fn postgres(node: &Node<'_>) -> Result<PostgresSettings, ConfigError> {
    Ok(PostgresSettings {
        user: node.require("user", node.string("user")?)?,
        password: node.require("password", node.secret("password")?)?,
        host: node.require("host", node.string("host")?)?,
        port: node.unsigned("port")?.unwrap_or(DEFAULT_POSTGRES_PORT),
        db: node.require("db", node.string("db")?)?,
    })
}

fn oci(node: &Node<'_>) -> Result<OciSettings, ConfigError> {
    let dsn: String = node.require("dsn", node.string("dsn")?)?;
    Ok(OciSettings {
        user: node.require("user", node.string("user")?)?,
        password: node.require("password", node.secret("password")?)?,
        dsn: tns_alias(&dsn).to_string(),
        wallet_dir: node.require("wallet_dir", node.string("wallet_dir")?)?,
    })
}

fn risk_management(node: &Node<'_>) -> Result<RiskManagementSettings, ConfigError> {
    Ok(RiskManagementSettings {
        max_order_notional_usd: node
            .require("max_order_notional_usd", node.float("max_order_notional_usd")?)?,
        max_position_notional_usd: node.require(
            "max_position_notional_usd",
            node.float("max_position_notional_usd")?,
        )?,
        price_deviation_tolerance_pct: node.require(
            "price_deviation_tolerance_pct",
            node.float("price_deviation_tolerance_pct")?,
        )?,
        equity_dust_threshold: node
            .require("equity_dust_threshold", node.float("equity_dust_threshold")?)?,
    })
}

fn services(node: &Node<'_>) -> Result<ServiceSettings, ConfigError> {
    Ok(ServiceSettings {
        executor: optional(node.section("executor")?, executor)?,
        analyzer: optional(node.section("analyzer")?, analyzer)?,
    })
}

fn executor(node: &Node<'_>) -> Result<ExecutorServiceSettings, ConfigError> {
    let reconciliation = node.section("reconciliation")?;
    Ok(ExecutorServiceSettings {
        reconciliation: ReconciliationSettings {
            interval_seconds: reconciliation.require(
                "interval_seconds",
                reconciliation.unsigned("interval_seconds")?,
            )?,
            initial_delay_seconds: reconciliation.require(
                "initial_delay_seconds",
                reconciliation.unsigned("initial_delay_seconds")?,
            )?,
        },
    })
}

fn analyzer(node: &Node<'_>) -> Result<AnalyzerSettings, ConfigError> {
    Ok(AnalyzerSettings {
        instrument_sync_interval_s: node
            .unsigned("instrument_sync_interval_s")?
            .unwrap_or(DEFAULT_INSTRUMENT_SYNC_INTERVAL_S),
        anomaly_check_interval_s: node
            .unsigned("anomaly_check_interval_s")?
            .unwrap_or(DEFAULT_ANOMALY_CHECK_INTERVAL_S),
    })
}

fn regime(node: &Node<'_>) -> Result<RegimeParameterSettings, ConfigError> {
    Ok(RegimeParameterSettings {
        hedge_ratio: node.require("hedge_ratio", node.float("hedge_ratio")?)?,
        execution_horizon_minutes: node.require(
            "execution_horizon_minutes",
            node.unsigned("execution_horizon_minutes")?,
        )?,
        order_type: node.require("order_type", node.string("order_type")?)?,
        time_in_force: node.require("time_in_force", node.string("time_in_force")?)?,
        ttl_seconds: node.require("ttl_seconds", node.unsigned("ttl_seconds")?)?,
    })
}

fn strategies(node: &Node<'_>) -> Result<StrategySettings, ConfigError> {
    let key = if !node.has_file_key("usd_synthetic") && node.has_file_key(USD_SYNTHETIC_ALIAS) {
        USD_SYNTHETIC_ALIAS
    } else {
        "usd_synthetic"
    };
    let usd = node.section(key)?;
    Ok(StrategySettings {
        usd_synthetic: UsdSyntheticStrategySettings {
            drift_threshold_contracts: usd.require(
                "drift_threshold_contracts",
                usd.integer("drift_threshold_contracts")?,
            )?,
            twap_clip_pct: usd.require("twap_clip_pct", usd.float("twap_clip_pct")?)?,
        },
    })
}

fn tradable(node: &Node<'_>) -> Result<TradableItem, ConfigError> {
    Ok(TradableItem {
        spot: node.require("spot", node.string_list("spot")?)?,
    })
}

/// Where a field's value came from.
enum Source<'a> {
    Env { var: String, raw: &'a str },
    File(&'a Value),
    Missing,
}

/// A table in the merged mapping together with its override namespace.
///
/// Tables inside arrays have no override namespace: array elements cannot
/// be addressed by environment variables.
struct Node<'e> {
    field: String,
    env_path: Option<Vec<String>>,
    table: Option<Table>,
    env: EnvOverrides<'e>,
}

impl<'e> Node<'e> {
    fn root(values: &Table, env: EnvOverrides<'e>) -> Self {
        Self {
            field: String::new(),
            env_path: Some(Vec::new()),
            table: Some(values.clone()),
            env,
        }
    }

    fn field_name(&self, key: &str) -> String {
        if self.field.is_empty() {
            key.to_string()
        } else {
            format!("{}.{key}", self.field)
        }
    }

    fn env_segments(&self, key: &str) -> Option<Vec<String>> {
        self.env_path.as_ref().map(|path| {
            let mut segments = path.clone();
            segments.push(key.to_string());
            segments
        })
    }

    fn exists(&self) -> bool {
        self.table.is_some()
            || self
                .env_path
                .as_ref()
                .is_some_and(|path| self.env.has_any_under(path))
    }

    fn keys(&self) -> BTreeSet<String> {
        let mut keys: BTreeSet<String> = self
            .table
            .as_ref()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        if let Some(path) = &self.env_path {
            // Variable names are case-insensitive, so an env key lands on
            // the file entry it matches instead of adding a new one.
            for key in self.env.child_keys(path) {
                if !keys.iter().any(|k| k.eq_ignore_ascii_case(&key)) {
                    keys.insert(key);
                }
            }
        }
        keys
    }

    fn has_file_key(&self, key: &str) -> bool {
        self.table.as_ref().is_some_and(|t| t.contains_key(key))
    }

    fn section(&self, key: &str) -> Result<Node<'e>, ConfigError> {
        let field = self.field_name(key);
        let table = match self.table.as_ref().and_then(|t| t.get(key)) {
            None => None,
            Some(Value::Table(table)) => Some(table.clone()),
            Some(other) => {
                return Err(ConfigError::type_mismatch(field, "table", other.type_str()))
            }
        };
        Ok(Node {
            field,
            env_path: self.env_segments(key),
            table,
            env: self.env,
        })
    }

    fn lookup(&self, key: &str) -> Source<'_> {
        if let Some((var, raw)) = self
            .env_segments(key)
            .and_then(|segments| self.env.get(&segments))
        {
            return Source::Env { var, raw };
        }
        match self.table.as_ref().and_then(|t| t.get(key)) {
            Some(value) => Source::File(value),
            None => Source::Missing,
        }
    }

    fn require<T>(&self, key: &str, value: Option<T>) -> Result<T, ConfigError> {
        value.ok_or_else(|| ConfigError::missing_field(self.field_name(key)))
    }

    fn env_mismatch(&self, key: &str, expected: &str, var: &str, raw: &str) -> ConfigError {
        ConfigError::type_mismatch(self.field_name(key), expected, format!("{raw:?} from {var}"))
    }

    fn string(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match self.lookup(key) {
            Source::Env { raw, .. } => Ok(Some(raw.to_string())),
            Source::File(Value::String(s)) => Ok(Some(s.clone())),
            Source::File(other) => Err(ConfigError::type_mismatch(
                self.field_name(key),
                "string",
                other.type_str(),
            )),
            Source::Missing => Ok(None),
        }
    }

    fn secret(&self, key: &str) -> Result<Option<Secret>, ConfigError> {
        if let Some((var, path)) = self
            .env_segments(key)
            .and_then(|segments| self.env.secret_file(&segments))
        {
            if let Some(secret) = read_secret_file(&var, Path::new(path))? {
                return Ok(Some(secret));
            }
        }
        Ok(self.string(key)?.map(Secret::new))
    }

    fn integer(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        match self.lookup(key) {
            Source::Env { var, raw } => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| self.env_mismatch(key, "integer", &var, raw)),
            Source::File(Value::Integer(i)) => Ok(Some(*i)),
            Source::File(other) => Err(ConfigError::type_mismatch(
                self.field_name(key),
                "integer",
                other.type_str(),
            )),
            Source::Missing => Ok(None),
        }
    }

    fn unsigned<T: TryFrom<i64>>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.integer(key)? {
            Some(i) => T::try_from(i).map(Some).map_err(|_| {
                ConfigError::type_mismatch(
                    self.field_name(key),
                    format!("integer in range of {}", type_name::<T>()),
                    i.to_string(),
                )
            }),
            None => Ok(None),
        }
    }

    fn float(&self, key: &str) -> Result<Option<f64>, ConfigError> {
        match self.lookup(key) {
            Source::Env { var, raw } => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| self.env_mismatch(key, "float", &var, raw)),
            Source::File(Value::Float(f)) => Ok(Some(*f)),
            Source::File(Value::Integer(i)) => Ok(Some(*i as f64)),
            Source::File(other) => Err(ConfigError::type_mismatch(
                self.field_name(key),
                "float",
                other.type_str(),
            )),
            Source::Missing => Ok(None),
        }
    }

    /// Lists from the environment are either a TOML array literal
    /// (`["BTC", "ETH"]`) or comma-separated text (`BTC,ETH`).
    fn string_list(&self, key: &str) -> Result<Option<Vec<String>>, ConfigError> {
        let field = self.field_name(key);
        let items = match self.lookup(key) {
            Source::Env { var, raw } => {
                if !raw.trim_start().starts_with('[') {
                    return Ok(Some(
                        raw.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect(),
                    ));
                }
                match parse_env_value(raw) {
                    Some(Value::Array(items)) => items,
                    _ => return Err(self.env_mismatch(key, "array of strings", &var, raw)),
                }
            }
            Source::File(Value::Array(items)) => items.clone(),
            Source::File(other) => {
                return Err(ConfigError::type_mismatch(
                    field,
                    "array of strings",
                    other.type_str(),
                ))
            }
            Source::Missing => return Ok(None),
        };

        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::String(s) => Ok(s),
                other => Err(ConfigError::type_mismatch(
                    format!("{field}[{i}]"),
                    "string",
                    other.type_str(),
                )),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    /// An array of tables. From the environment it must be a TOML array
    /// literal, e.g. `[{ spot = ["BTC"] }]`.
    fn table_list(&self, key: &str) -> Result<Vec<Node<'e>>, ConfigError> {
        let field = self.field_name(key);
        let value = match self.lookup(key) {
            Source::Env { var, raw } => parse_env_value(raw)
                .ok_or_else(|| self.env_mismatch(key, "array of tables", &var, raw))?,
            Source::File(value) => value.clone(),
            Source::Missing => return Ok(Vec::new()),
        };

        let items = match value {
            Value::Array(items) => items,
            other => {
                return Err(ConfigError::type_mismatch(
                    field,
                    "array of tables",
                    other.type_str(),
                ))
            }
        };

        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                let element = format!("{field}[{i}]");
                match item {
                    Value::Table(table) => Ok(Node {
                        field: element,
                        env_path: None,
                        table: Some(table),
                        env: self.env,
                    }),
                    other => Err(ConfigError::type_mismatch(element, "table", other.type_str())),
                }
            })
            .collect()
    }
}

/// Parse an environment value as a single TOML value.
fn parse_env_value(raw: &str) -> Option<Value> {
    format!("value = {raw}")
        .parse::<Table>()
        .ok()?
        .remove("value")
}
