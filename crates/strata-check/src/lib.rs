//! Strata configuration check.
//!
//! Resolves a service's configuration exactly the way the service would at
//! startup and reports the outcome. Deployments run it before rolling out a
//! new layer file or environment.

#![warn(missing_docs)]

use std::io::Write;
use std::path::PathBuf;

use strata_config::{resolve_detailed, ConfigError, EnvSnapshot, ResolveOptions, SERVICE_NAME_VAR};
use thiserror::Error;
use tracing::{error, info};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit code when configuration resolved.
pub const EXIT_OK: u8 = 0;

/// Exit code when configuration failed to resolve.
pub const EXIT_CONFIG: u8 = 1;

/// Exit code for invalid command-line usage.
pub const EXIT_USAGE: u8 = 2;

/// Name used in logs when no service is known yet.
const FALLBACK_SERVICE: &str = "strata-check";

/// Invalid command-line usage.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    /// An option that takes a value was last on the line.
    #[error("{0} requires a value")]
    MissingValue(String),

    /// An argument nobody recognises.
    #[error("Unknown argument: {0}")]
    Unknown(String),
}

/// What the command line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Resolve configuration.
    Check(CheckArgs),
    /// Print usage.
    Help,
    /// Print the version.
    Version,
}

/// Options for a check run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckArgs {
    /// Directory holding the layer files.
    pub config_root: Option<PathBuf>,
    /// Service to resolve for, instead of `SERVICE_NAME`.
    pub service: Option<String>,
    /// Base layer file, instead of `BUSINESS_LOGIC_CONFIG_PATH`.
    pub base: Option<PathBuf>,
    /// `.env` file merged under the process environment.
    pub env_file: Option<PathBuf>,
    /// Print the resolved settings as JSON on stdout.
    pub json: bool,
}

impl CheckArgs {
    /// Service name for log records, before resolution has run.
    pub fn log_service(&self, env: &EnvSnapshot) -> String {
        self.service
            .clone()
            .or_else(|| env.get_non_empty(SERVICE_NAME_VAR).map(str::to_string))
            .unwrap_or_else(|| FALLBACK_SERVICE.to_string())
    }

    /// Resolve options for this run on top of `env`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MalformedLayer` if the `.env` file cannot be
    /// parsed.
    pub fn resolve_options(&self, env: EnvSnapshot) -> Result<ResolveOptions, ConfigError> {
        let mut options = ResolveOptions::from_snapshot(env);
        if let Some(service) = &self.service {
            options = options.with_service(service.as_str());
        }
        if let Some(root) = &self.config_root {
            options = options.with_config_root(root);
        }
        if let Some(base) = &self.base {
            options = options.with_base_override(base);
        }
        if let Some(path) = &self.env_file {
            options = options.with_dotenv(path)?;
        }
        Ok(options)
    }
}

/// Parses command-line arguments, without the program name.
///
/// # Errors
///
/// Returns a [`UsageError`] for unknown arguments or missing values.
pub fn parse_args<I>(args: I) -> Result<Command, UsageError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut check = CheckArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config-root" | "-c" => {
                check.config_root = Some(PathBuf::from(value(&arg, args.next())?));
            }
            "--service" | "-s" => {
                check.service = Some(value(&arg, args.next())?);
            }
            "--base" | "-b" => {
                check.base = Some(PathBuf::from(value(&arg, args.next())?));
            }
            "--env-file" | "-e" => {
                check.env_file = Some(PathBuf::from(value(&arg, args.next())?));
            }
            "--json" => check.json = true,
            "--help" | "-h" => return Ok(Command::Help),
            "--version" | "-V" => return Ok(Command::Version),
            _ => return Err(UsageError::Unknown(arg)),
        }
    }

    Ok(Command::Check(check))
}

fn value(flag: &str, next: Option<String>) -> Result<String, UsageError> {
    next.ok_or_else(|| UsageError::MissingValue(flag.to_string()))
}

/// Resolves once and reports the outcome.
///
/// With `--json` the redacted settings are written to `out`. Returns the
/// process exit code.
pub fn run(args: &CheckArgs, env: EnvSnapshot, out: &mut impl Write) -> u8 {
    let resolution = match args
        .resolve_options(env)
        .and_then(|options| resolve_detailed(&options))
    {
        Ok(resolution) => resolution,
        Err(e) => {
            error!(kind = e.kind(), error = %e, "configuration check failed");
            return EXIT_CONFIG;
        }
    };

    let settings = &resolution.settings;
    for layer in &resolution.layers {
        info!(
            layer = %layer.name,
            path = %layer.path.display(),
            absent = layer.is_absent(),
            "layer"
        );
    }
    info!(
        service = %settings.service_name,
        environment = %settings.environment,
        exchanges = settings.exchanges.len(),
        postgres = settings.postgres.is_some(),
        oci = settings.oci.is_some(),
        hedged = ?settings.hedged_currencies(),
        "configuration check passed"
    );

    if args.json {
        let written = serde_json::to_string_pretty(settings)
            .map_err(|e| e.to_string())
            .and_then(|json| writeln!(out, "{json}").map_err(|e| e.to_string()));
        if let Err(e) = written {
            error!(error = %e, "failed to write settings");
            return EXIT_CONFIG;
        }
    }

    EXIT_OK
}

/// Usage text for `--help`.
pub fn help() -> String {
    format!(
        r"Strata configuration check {VERSION}

Resolves a service's layered configuration and reports whether it is valid.

USAGE:
    strata-check [OPTIONS]

OPTIONS:
    -c, --config-root <DIR>   Directory holding business_logic.toml and <service>.toml
    -s, --service <NAME>      Service to check (default: $SERVICE_NAME)
    -b, --base <PATH>         Base layer file (default: $BUSINESS_LOGIC_CONFIG_PATH)
    -e, --env-file <PATH>     Read additional variables from a .env file
        --json                Print the resolved settings, secrets redacted
    -h, --help                Print help information
    -V, --version             Print version information

ENVIRONMENT VARIABLES:
    SERVICE_NAME                  Service to check
    STRATA_CONFIG_DIR             Directory holding the layer files
    BUSINESS_LOGIC_CONFIG_PATH    Base layer file
    STRATA__<SECTION>__<KEY>      Override one field, e.g. STRATA__REDIS__URL
    STRATA__<...>_FILE            Read a secret field from a file
    LOG_LEVEL                     Log filter (default: info)
    LOG_FORMAT                    json or pretty (default: json)

EXIT CODES:
    0    configuration is valid
    1    configuration failed to resolve
    2    invalid usage
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn args(list: &[&str]) -> Result<Command, UsageError> {
        parse_args(list.iter().map(|s| (*s).to_string()))
    }

    const BASE: &str = r#"
environment = "production"

[redis]
url = "redis://redis:6379"

[exchanges.deribit]
client_id = "abc"
client_secret = "do-not-print"

[[tradable]]
spot = ["BTC"]
"#;

    fn write_base(dir: &Path) {
        fs::write(dir.join("business_logic.toml"), BASE).unwrap();
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(args(&[]), Ok(Command::Check(CheckArgs::default())));
    }

    #[test]
    fn test_parse_all_options() {
        let command = args(&[
            "--config-root",
            "/etc/strata",
            "-s",
            "executor",
            "--base",
            "/opt/rules.toml",
            "-e",
            ".env",
            "--json",
        ])
        .unwrap();

        assert_eq!(
            command,
            Command::Check(CheckArgs {
                config_root: Some(PathBuf::from("/etc/strata")),
                service: Some("executor".to_string()),
                base: Some(PathBuf::from("/opt/rules.toml")),
                env_file: Some(PathBuf::from(".env")),
                json: true,
            })
        );
    }

    #[test]
    fn test_parse_help_and_version() {
        assert_eq!(args(&["--json", "-h"]), Ok(Command::Help));
        assert_eq!(args(&["--version"]), Ok(Command::Version));
    }

    #[test]
    fn test_parse_missing_value() {
        assert_eq!(
            args(&["--service"]),
            Err(UsageError::MissingValue("--service".to_string()))
        );
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            args(&["--verbose"]),
            Err(UsageError::Unknown("--verbose".to_string()))
        );
    }

    #[test]
    fn test_log_service_prefers_flag() {
        let env = EnvSnapshot::new().with_var(SERVICE_NAME_VAR, "receiver");
        let flagged = CheckArgs {
            service: Some("executor".to_string()),
            ..CheckArgs::default()
        };
        assert_eq!(flagged.log_service(&env), "executor");
        assert_eq!(CheckArgs::default().log_service(&env), "receiver");
        assert_eq!(
            CheckArgs::default().log_service(&EnvSnapshot::new()),
            "strata-check"
        );
    }

    #[test]
    fn test_run_success_prints_redacted_json() {
        let dir = tempfile::tempdir().unwrap();
        write_base(dir.path());
        let check = CheckArgs {
            config_root: Some(dir.path().to_path_buf()),
            service: Some("receiver".to_string()),
            json: true,
            ..CheckArgs::default()
        };

        let mut out = Vec::new();
        let code = run(&check, EnvSnapshot::new(), &mut out);
        assert_eq!(code, EXIT_OK);

        let printed = String::from_utf8(out).unwrap();
        let json: serde_json::Value = serde_json::from_str(&printed).unwrap();
        assert_eq!(json["service_name"], "receiver");
        assert_eq!(json["exchanges"]["deribit"]["client_secret"], "********");
        assert!(!printed.contains("do-not-print"));
    }

    #[test]
    fn test_run_without_json_prints_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_base(dir.path());
        let check = CheckArgs {
            config_root: Some(dir.path().to_path_buf()),
            ..CheckArgs::default()
        };
        let env = EnvSnapshot::new().with_var(SERVICE_NAME_VAR, "receiver");

        let mut out = Vec::new();
        assert_eq!(run(&check, env, &mut out), EXIT_OK);
        assert!(out.is_empty());
    }

    #[test]
    fn test_run_failure_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("business_logic.toml"), "[redis\n").unwrap();
        let check = CheckArgs {
            config_root: Some(dir.path().to_path_buf()),
            service: Some("receiver".to_string()),
            json: true,
            ..CheckArgs::default()
        };

        let mut out = Vec::new();
        assert_eq!(run(&check, EnvSnapshot::new(), &mut out), EXIT_CONFIG);
        assert!(out.is_empty());
    }

    #[test]
    fn test_run_missing_service_fails() {
        let mut out = Vec::new();
        assert_eq!(
            run(&CheckArgs::default(), EnvSnapshot::new(), &mut out),
            EXIT_CONFIG
        );
    }

    #[test]
    fn test_env_file_applies() {
        let dir = tempfile::tempdir().unwrap();
        write_base(dir.path());
        fs::write(dir.path().join(".env"), "STRATA__ENVIRONMENT=staging\n").unwrap();
        let check = CheckArgs {
            config_root: Some(dir.path().to_path_buf()),
            service: Some("receiver".to_string()),
            env_file: Some(dir.path().join(".env")),
            json: true,
            ..CheckArgs::default()
        };

        let mut out = Vec::new();
        assert_eq!(run(&check, EnvSnapshot::new(), &mut out), EXIT_OK);
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["environment"], "staging");
    }

    #[test]
    fn test_help_mentions_options() {
        let text = help();
        assert!(text.contains("--config-root"));
        assert!(text.contains(VERSION));
    }
}
