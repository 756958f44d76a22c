//! The resolved, validated settings object.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::{
    AnalyzerSettings, ConfigError, ExchangeSettings, NamedSections, OciSettings,
    PostgresSettings, RedisSettings, RedisStreamSettings, RegimeParameterSettings,
    RiskManagementSettings, ServiceSettings, StrategySettings, TradableItem,
};

/// Complete configuration for one service process.
///
/// Produced once at startup by [`resolve`](crate::resolve) and read-only
/// afterwards. Secrets are redacted in `Debug` and serialized output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    /// Identity the settings were resolved for.
    pub service_name: String,
    /// Deployment environment, e.g. `production`.
    pub environment: String,

    /// Exchange credentials keyed by exchange name.
    pub exchanges: NamedSections<ExchangeSettings>,
    /// Redis connection.
    pub redis: RedisSettings,
    /// Redis stream consumer behaviour.
    pub redis_streams: RedisStreamSettings,

    /// PostgreSQL connection, when configured.
    pub postgres: Option<PostgresSettings>,
    /// Oracle Cloud connection, when configured.
    pub oci: Option<OciSettings>,

    /// Order risk limits.
    pub risk_management: Option<RiskManagementSettings>,
    /// Per-service operational tuning.
    pub services: Option<ServiceSettings>,
    /// Execution parameters keyed by regime name.
    pub regime_parameters: NamedSections<RegimeParameterSettings>,
    /// Strategy parameters.
    pub strategies: Option<StrategySettings>,
    /// Tradable groups.
    pub tradable: Vec<TradableItem>,
    /// Analyzer tuning.
    pub analyzer: Option<AnalyzerSettings>,
}

impl Settings {
    /// Every spot symbol across all tradable groups, sorted and de-duplicated.
    pub fn hedged_currencies(&self) -> Vec<String> {
        self.tradable
            .iter()
            .flat_map(|item| item.spot.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// The PostgreSQL section, for services that cannot run without it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequiredField` naming `postgres` if the
    /// section was not configured.
    pub fn require_postgres(&self) -> Result<&PostgresSettings, ConfigError> {
        self.postgres
            .as_ref()
            .ok_or_else(|| ConfigError::missing_field("postgres"))
    }

    /// The Oracle Cloud section, for services that cannot run without it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequiredField` naming `oci` if the
    /// section was not configured.
    pub fn require_oci(&self) -> Result<&OciSettings, ConfigError> {
        self.oci
            .as_ref()
            .ok_or_else(|| ConfigError::missing_field("oci"))
    }

    /// Look up one exchange by name.
    pub fn exchange(&self, name: &str) -> Option<&ExchangeSettings> {
        self.exchanges.get(name)
    }

    /// Look up the parameters for one regime.
    pub fn regime(&self, name: &str) -> Option<&RegimeParameterSettings> {
        self.regime_parameters.get(name)
    }
}
