use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::baq::ClientConfig;
use crate::baq::report::DEFAULT_REPORT_PATH;

pub const BASE_URL_ENV: &str = "BAQ_BASE_URL";
pub const API_KEY_ENV: &str = "BAQ_API_KEY";
pub const CREDENTIALS_ENV: &str = "BAQ_CREDENTIALS";
pub const TIMEOUT_ENV: &str = "BAQ_TIMEOUT";
pub const RETRY_METHOD_ENV: &str = "BAQ_RETRY_METHOD";
pub const MISSING_REPORT_ENV: &str = "BAQ_MISSING_REPORT";
pub const CONFIG_ENV: &str = "BAQ_CONFIG";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub credentials: Option<String>,
    pub timeout: Option<u64>,
    pub retry_method: Option<String>,
    pub missing_report: Option<PathBuf>,
    pub accept_invalid_certs: Option<bool>,
    pub output: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    profiles: Option<HashMap<String, ProfileConfig>>,
}

/// Values supplied on the command line, highest precedence.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub timeout: Option<u64>,
    pub retry_method: Option<String>,
    pub missing_report: Option<PathBuf>,
    pub accept_invalid_certs: bool,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub credentials: Option<String>,
    pub timeout: Option<u64>,
    pub retry_method: Option<String>,
    pub missing_report: PathBuf,
    pub accept_invalid_certs: bool,
    pub output: Option<String>,
}

impl Settings {
    /// CLI flag > environment > profile > default.
    pub fn resolve(overrides: Overrides, profile: Option<ProfileConfig>) -> Result<Self, String> {
        let profile = profile.unwrap_or_default();

        let timeout = match overrides.timeout {
            Some(timeout) => Some(timeout),
            None => match env_value(TIMEOUT_ENV) {
                Some(raw) => Some(parse_timeout(&raw)?),
                None => profile.timeout,
            },
        };

        Ok(Self {
            base_url: overrides
                .base_url
                .or_else(|| env_value(BASE_URL_ENV))
                .or(profile.base_url),
            api_key: env_value(API_KEY_ENV).or(profile.api_key),
            credentials: env_value(CREDENTIALS_ENV).or(profile.credentials),
            timeout,
            retry_method: overrides
                .retry_method
                .or_else(|| env_value(RETRY_METHOD_ENV))
                .or(profile.retry_method),
            missing_report: overrides
                .missing_report
                .or_else(|| env_value(MISSING_REPORT_ENV).map(PathBuf::from))
                .or(profile.missing_report)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_PATH)),
            accept_invalid_certs: overrides.accept_invalid_certs
                || profile.accept_invalid_certs.unwrap_or(false),
            output: profile.output,
        })
    }

    /// Builds the client config. The base URL is always required; the API key
    /// only when requests will actually be sent.
    ///
    /// Without a credential string the `Authorization` header is sent empty.
    pub fn client_config(&self, require_api_key: bool) -> Result<ClientConfig, String> {
        let base_url = self.base_url.clone().ok_or_else(|| {
            format!("No base URL provided. Use --base-url or set {BASE_URL_ENV}.")
        })?;
        let api_key = match self.api_key.clone() {
            Some(api_key) => api_key,
            None if require_api_key => {
                return Err(format!("{API_KEY_ENV} is not set in the environment or profile."));
            }
            None => String::new(),
        };

        let mut config = ClientConfig::new(
            base_url,
            api_key,
            self.credentials.clone().unwrap_or_default(),
        );
        config.timeout_secs = self.timeout;
        config.accept_invalid_certs = self.accept_invalid_certs;
        config.missing_report_path = self.missing_report.clone();
        Ok(config)
    }
}

pub fn load_profile(name: &str) -> Result<ProfileConfig, String> {
    let path = config_path()?;
    let profiles = read_profiles(&path)?;

    profiles.get(name).cloned().ok_or_else(|| {
        format!(
            "Profile '{}' not found in config file '{}'.",
            name,
            path.display()
        )
    })
}

/// Parses the config file and, if given, checks that `profile` exists.
pub fn validate_config(profile: Option<&str>) -> Result<PathBuf, String> {
    let path = config_path()?;
    let profiles = read_profiles(&path)?;
    if let Some(name) = profile
        && !profiles.contains_key(name)
    {
        return Err(format!(
            "Profile '{}' not found in config file '{}'.",
            name,
            path.display()
        ));
    }
    Ok(path)
}

fn read_profiles(path: &Path) -> Result<HashMap<String, ProfileConfig>, String> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read config file '{}': {err}", path.display()))?;

    let config: ConfigFile = toml::from_str(&raw)
        .map_err(|err| format!("Failed to parse config file '{}': {err}", path.display()))?;

    config.profiles.ok_or_else(|| {
        format!(
            "Config file '{}' does not contain a [profiles] section.",
            path.display()
        )
    })
}

fn parse_timeout(raw: &str) -> Result<u64, String> {
    raw.parse::<u64>()
        .map_err(|_| format!("Invalid {TIMEOUT_ENV} '{raw}'. Expected a number of seconds."))
}

fn env_value(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn config_path() -> Result<PathBuf, String> {
    if let Some(path) = env_value(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }

    if let Some(xdg) = env_value("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join("baqpipe").join("config.toml"));
    }

    let home = env_value("HOME").ok_or_else(|| {
        format!("Cannot resolve config path: set {CONFIG_ENV} or HOME/XDG_CONFIG_HOME.")
    })?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("baqpipe")
        .join("config.toml"))
}
