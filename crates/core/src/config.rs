use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Logical backend name -> base URL of its JSON-RPC endpoint.
    pub endpoints: BTreeMap<String, String>,
    pub rpc: RpcConfig,
    pub tracker: TrackerConfig,
    pub orchestrator: OrchestratorConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct RpcConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct TrackerConfig {
    pub check_interval_secs: u64,
    pub timeout_secs: u64,
    pub completion_checks: u32,
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Classifications below this confidence are answered with suggestions
    /// instead of being acted on.
    pub confidence_floor: f64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub confidence_floor: Option<f64>,
    pub endpoints: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoints: BTreeMap::new(),
            rpc: RpcConfig { timeout_secs: 30, max_attempts: 3, retry_base_delay_ms: 1_000 },
            tracker: TrackerConfig {
                check_interval_secs: 30,
                timeout_secs: 600,
                completion_checks: 3,
            },
            orchestrator: OrchestratorConfig { confidence_floor: 0.6 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl TrackerConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration with the layering defaults -> file -> env ->
    /// programmatic overrides, then validate.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("opsbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(endpoints) = patch.endpoints {
            self.endpoints.extend(endpoints);
        }

        if let Some(rpc) = patch.rpc {
            if let Some(timeout_secs) = rpc.timeout_secs {
                self.rpc.timeout_secs = timeout_secs;
            }
            if let Some(max_attempts) = rpc.max_attempts {
                self.rpc.max_attempts = max_attempts;
            }
            if let Some(retry_base_delay_ms) = rpc.retry_base_delay_ms {
                self.rpc.retry_base_delay_ms = retry_base_delay_ms;
            }
        }

        if let Some(tracker) = patch.tracker {
            if let Some(check_interval_secs) = tracker.check_interval_secs {
                self.tracker.check_interval_secs = check_interval_secs;
            }
            if let Some(timeout_secs) = tracker.timeout_secs {
                self.tracker.timeout_secs = timeout_secs;
            }
            if let Some(completion_checks) = tracker.completion_checks {
                self.tracker.completion_checks = completion_checks;
            }
        }

        if let Some(orchestrator) = patch.orchestrator {
            if let Some(confidence_floor) = orchestrator.confidence_floor {
                self.orchestrator.confidence_floor = confidence_floor;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        // OPSBOT_ENDPOINT_DEPLOY_SERVICE=http://... registers or replaces
        // the `deploy-service` backend.
        for (key, value) in env::vars() {
            if let Some(raw_name) = key.strip_prefix("OPSBOT_ENDPOINT_") {
                if value.trim().is_empty() {
                    continue;
                }
                let backend = raw_name.to_ascii_lowercase().replace('_', "-");
                self.endpoints.insert(backend, value);
            }
        }

        if let Some(value) = read_env("OPSBOT_RPC_TIMEOUT_SECS") {
            self.rpc.timeout_secs = parse_u64("OPSBOT_RPC_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("OPSBOT_RPC_MAX_ATTEMPTS") {
            self.rpc.max_attempts = parse_u32("OPSBOT_RPC_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("OPSBOT_RPC_RETRY_BASE_DELAY_MS") {
            self.rpc.retry_base_delay_ms = parse_u64("OPSBOT_RPC_RETRY_BASE_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("OPSBOT_TRACKER_CHECK_INTERVAL_SECS") {
            self.tracker.check_interval_secs =
                parse_u64("OPSBOT_TRACKER_CHECK_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("OPSBOT_TRACKER_TIMEOUT_SECS") {
            self.tracker.timeout_secs = parse_u64("OPSBOT_TRACKER_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("OPSBOT_TRACKER_COMPLETION_CHECKS") {
            self.tracker.completion_checks =
                parse_u32("OPSBOT_TRACKER_COMPLETION_CHECKS", &value)?;
        }

        if let Some(value) = read_env("OPSBOT_CONFIDENCE_FLOOR") {
            self.orchestrator.confidence_floor = parse_f64("OPSBOT_CONFIDENCE_FLOOR", &value)?;
        }

        let log_level = read_env("OPSBOT_LOGGING_LEVEL").or_else(|| read_env("OPSBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("OPSBOT_LOGGING_FORMAT").or_else(|| read_env("OPSBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(confidence_floor) = overrides.confidence_floor {
            self.orchestrator.confidence_floor = confidence_floor;
        }
        self.endpoints.extend(overrides.endpoints);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (backend, url) in &self.endpoints {
            if backend.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "endpoints must use non-empty backend names".to_string(),
                ));
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "endpoints.{backend} must start with http:// or https:// (got `{url}`)"
                )));
            }
        }

        if self.rpc.timeout_secs == 0 || self.rpc.timeout_secs > 300 {
            return Err(ConfigError::Validation(
                "rpc.timeout_secs must be in range 1..=300".to_string(),
            ));
        }
        if self.rpc.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "rpc.max_attempts must be greater than zero".to_string(),
            ));
        }

        if self.tracker.check_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "tracker.check_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.tracker.timeout_secs <= self.tracker.check_interval_secs {
            return Err(ConfigError::Validation(
                "tracker.timeout_secs must be larger than tracker.check_interval_secs".to_string(),
            ));
        }
        if self.tracker.completion_checks == 0 {
            return Err(ConfigError::Validation(
                "tracker.completion_checks must be greater than zero".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.orchestrator.confidence_floor) {
            return Err(ConfigError::Validation(
                "orchestrator.confidence_floor must be in range 0.0..=1.0".to_string(),
            ));
        }

        let level = self.logging.level.trim().to_ascii_lowercase();
        match level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(ConfigError::Validation(
                "logging.level must be one of trace|debug|info|warn|error".to_string(),
            )),
        }
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("opsbot.toml"), PathBuf::from("config/opsbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    endpoints: Option<BTreeMap<String, String>>,
    rpc: Option<RpcPatch>,
    tracker: Option<TrackerPatch>,
    orchestrator: Option<OrchestratorPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct RpcPatch {
    timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
    retry_base_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TrackerPatch {
    check_interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
    completion_checks: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct OrchestratorPatch {
    confidence_floor: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
