use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_LOGIN_URL: &str = "https://login.salesforce.com";
pub const DEFAULT_API_VERSION: &str = "59.0";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub salesforce: SalesforceConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SalesforceConfig {
    pub login_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub username: String,
    pub password: SecretString,
    pub security_token: SecretString,
    /// Blocks create, update and delete before any remote call.
    pub read_only_mode: bool,
    pub api_version: String,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub login_url: Option<String>,
    pub read_only_mode: Option<bool>,
    pub api_version: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
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
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingRequired(Vec<String>),
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            salesforce: SalesforceConfig {
                login_url: DEFAULT_LOGIN_URL.to_string(),
                client_id: String::new(),
                client_secret: String::new().into(),
                username: String::new(),
                password: String::new().into(),
                security_token: String::new().into(),
                read_only_mode: true,
                api_version: DEFAULT_API_VERSION.to_string(),
                request_timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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

impl SalesforceConfig {
    /// The password grant expects the security token appended to the password.
    pub fn login_secret(&self) -> SecretString {
        let mut combined = self.password.expose_secret().to_string();
        combined.push_str(self.security_token.expose_secret());
        secret_value(combined)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("forcelink.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(salesforce) = patch.salesforce {
            if let Some(login_url) = salesforce.login_url {
                self.salesforce.login_url = login_url;
            }
            if let Some(client_id) = salesforce.client_id {
                self.salesforce.client_id = client_id;
            }
            if let Some(client_secret) = salesforce.client_secret {
                self.salesforce.client_secret = secret_value(client_secret);
            }
            if let Some(username) = salesforce.username {
                self.salesforce.username = username;
            }
            if let Some(password) = salesforce.password {
                self.salesforce.password = secret_value(password);
            }
            if let Some(security_token) = salesforce.security_token {
                self.salesforce.security_token = secret_value(security_token);
            }
            if let Some(read_only_mode) = salesforce.read_only_mode {
                self.salesforce.read_only_mode = read_only_mode;
            }
            if let Some(api_version) = salesforce.api_version {
                self.salesforce.api_version = api_version;
            }
            if let Some(request_timeout_secs) = salesforce.request_timeout_secs {
                self.salesforce.request_timeout_secs = request_timeout_secs;
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
        if let Some(value) = read_env("SALESFORCE_LOGIN_URL") {
            self.salesforce.login_url = value;
        }
        if let Some(value) = read_env("SALESFORCE_CLIENT_ID") {
            self.salesforce.client_id = value;
        }
        if let Some(value) = read_env("SALESFORCE_CLIENT_SECRET") {
            self.salesforce.client_secret = secret_value(value);
        }
        if let Some(value) = read_env("SALESFORCE_USERNAME") {
            self.salesforce.username = value;
        }
        if let Some(value) = read_env("SALESFORCE_PASSWORD") {
            self.salesforce.password = secret_value(value);
        }
        if let Some(value) = read_env("SALESFORCE_SECURITY_TOKEN") {
            self.salesforce.security_token = secret_value(value);
        }
        if let Some(value) = read_env("SALESFORCE_READ_ONLY_MODE") {
            self.salesforce.read_only_mode = parse_read_only(&value);
        }
        if let Some(value) = read_env("SALESFORCE_API_VERSION") {
            self.salesforce.api_version = value;
        }
        if let Some(value) = read_env("SALESFORCE_REQUEST_TIMEOUT_SECS") {
            self.salesforce.request_timeout_secs =
                parse_u64("SALESFORCE_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FORCELINK_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("FORCELINK_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(login_url) = overrides.login_url {
            self.salesforce.login_url = login_url;
        }
        if let Some(read_only_mode) = overrides.read_only_mode {
            self.salesforce.read_only_mode = read_only_mode;
        }
        if let Some(api_version) = overrides.api_version {
            self.salesforce.api_version = api_version;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_salesforce(&self.salesforce)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("forcelink.toml"), PathBuf::from("config/forcelink.toml")]
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

fn validate_salesforce(salesforce: &SalesforceConfig) -> Result<(), ConfigError> {
    let required = [
        ("SALESFORCE_CLIENT_ID", salesforce.client_id.as_str()),
        ("SALESFORCE_CLIENT_SECRET", salesforce.client_secret.expose_secret()),
        ("SALESFORCE_USERNAME", salesforce.username.as_str()),
        ("SALESFORCE_PASSWORD", salesforce.password.expose_secret()),
        ("SALESFORCE_SECURITY_TOKEN", salesforce.security_token.expose_secret()),
    ];
    let missing: Vec<String> = required
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ConfigError::MissingRequired(missing));
    }

    let login_url = salesforce.login_url.trim();
    if !login_url.starts_with("https://") && !login_url.starts_with("http://") {
        return Err(ConfigError::Validation(
            "salesforce.login_url must start with http:// or https://".to_string(),
        ));
    }

    let version_ok = salesforce
        .api_version
        .split_once('.')
        .map(|(major, minor)| {
            !major.is_empty()
                && major.chars().all(|ch| ch.is_ascii_digit())
                && minor.chars().all(|ch| ch.is_ascii_digit())
        })
        .unwrap_or(false);
    if !version_ok {
        return Err(ConfigError::Validation(format!(
            "salesforce.api_version must look like `59.0`, got `{}`",
            salesforce.api_version
        )));
    }

    if salesforce.request_timeout_secs == 0 || salesforce.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "salesforce.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Anything other than the exact string `false` keeps the server read-only.
fn parse_read_only(value: &str) -> bool {
    value != "false"
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    salesforce: Option<SalesforcePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SalesforcePatch {
    login_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    username: Option<String>,
    password: Option<String>,
    security_token: Option<String>,
    read_only_mode: Option<bool>,
    api_version: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
