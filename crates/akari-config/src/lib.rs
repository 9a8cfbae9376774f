//! Configuration for the Akari supervisor and CLI.
//!
//! TOML file plus `AKARI_`-prefixed environment, credential resolution
//! (env var + plaintext), and translation to
//! `akari_core::SupervisorConfig`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use akari_api::{ApiKeyHeader, RetryPolicy, TransportConfig};
use akari_core::{EntryConfig, RemovalPolicy, SupervisorConfig, TopicPattern};
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("entry '{entry}' names api_key_env '{var}' but it is not set")]
    NoCredentials { entry: String, var: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub discovery: Discovery,

    #[serde(default)]
    pub mqtt: Mqtt,

    /// Named device entries.
    #[serde(default)]
    pub entries: BTreeMap<String, Entry>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Seconds per HTTP attempt.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Extra attempts on connect/timeout failures, 0 or 1.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Seconds between health polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default)]
    pub api_key_header: ApiKeyHeader,

    /// Environment variable holding the fleet-wide API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,

    /// Fleet-wide API key (plaintext, prefer `api_key_env`).
    pub api_key: Option<String>,

    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            retries: default_retries(),
            poll_interval: default_poll_interval(),
            failure_threshold: default_failure_threshold(),
            api_key_header: ApiKeyHeader::default(),
            api_key_env: default_api_key_env(),
            api_key: None,
            output: default_output(),
        }
    }
}

fn default_timeout() -> u64 {
    10
}
fn default_retries() -> u32 {
    1
}
fn default_poll_interval() -> u64 {
    30
}
fn default_failure_threshold() -> u32 {
    3
}
#[allow(clippy::unnecessary_wraps)]
fn default_api_key_env() -> Option<String> {
    Some("AKARI_API_KEY".into())
}
fn default_output() -> String {
    "table".into()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Discovery {
    /// Topic pattern with one `+` for the device id.
    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default)]
    pub removal: RemovalPolicy,
}

impl Default for Discovery {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            removal: RemovalPolicy::default(),
        }
    }
}

fn default_topic() -> String {
    "home/+/info".into()
}

/// Broker connection used by `akari watch`.
#[derive(Debug, Deserialize, Serialize)]
pub struct Mqtt {
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    pub username: Option<String>,

    /// Broker password (plaintext, prefer `password_env`).
    pub password: Option<String>,

    pub password_env: Option<String>,

    /// Keep-alive in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u64,
}

impl Default for Mqtt {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
            password_env: None,
            keep_alive: default_keep_alive(),
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".into()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_client_id() -> String {
    "akari".into()
}
fn default_keep_alive() -> u64 {
    30
}

impl Mqtt {
    /// Broker password: `password_env` first, then plaintext.
    pub fn resolve_password(&self) -> Option<SecretString> {
        self.password_env
            .as_deref()
            .and_then(read_env)
            .or_else(|| self.password.clone())
            .map(SecretString::from)
    }
}

/// A named device entry.
#[derive(Debug, Deserialize, Serialize)]
pub struct Entry {
    /// Device id as announced on the discovery topic.
    pub device_id: Option<String>,

    /// Explicit address; without it the entry follows discovery.
    pub host: Option<String>,

    #[serde(default = "default_device_port")]
    pub port: u16,

    /// API key (plaintext, prefer `api_key_env`).
    pub api_key: Option<String>,

    /// Environment variable containing the API key.
    pub api_key_env: Option<String>,
}

fn default_device_port() -> u16 {
    akari_core::config::DEFAULT_DEVICE_PORT
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "akari", "akari").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("akari");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the default path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from a specific file + environment. A missing file is not an
/// error: defaults and environment still apply.
///
/// Environment keys nest with `__`, e.g. `AKARI_DEFAULTS__TIMEOUT=5` or
/// `AKARI_MQTT__HOST=broker.lan`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("AKARI_").split("__"))
        .extract()?;
    config.validate()?;
    Ok(config)
}

// ── Validation ──────────────────────────────────────────────────────

impl Config {
    /// Check values serde cannot: ranges, the topic pattern, and that
    /// every entry can be resolved somehow.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.defaults.timeout == 0 {
            return Err(invalid("defaults.timeout", "must be at least 1 second"));
        }
        if self.defaults.retries > 1 {
            return Err(invalid("defaults.retries", "at most one retry is allowed"));
        }
        if self.defaults.poll_interval == 0 {
            return Err(invalid("defaults.poll_interval", "must be at least 1 second"));
        }
        if self.defaults.failure_threshold == 0 {
            return Err(invalid("defaults.failure_threshold", "must be at least 1"));
        }
        if let Err(e) = TopicPattern::parse(&self.discovery.topic) {
            return Err(invalid("discovery.topic", e.to_string()));
        }

        for (name, entry) in &self.entries {
            let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
            if blank(&entry.device_id) && blank(&entry.host) {
                return Err(invalid(
                    format!("entries.{name}"),
                    "needs a device_id, a host, or both",
                ));
            }
            if entry.port == 0 {
                return Err(invalid(format!("entries.{name}.port"), "must not be 0"));
            }
        }
        Ok(())
    }
}

// ── Credential resolution ───────────────────────────────────────────

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Fleet-wide API key: `defaults.api_key_env`, then `defaults.api_key`.
pub fn resolve_default_api_key(defaults: &Defaults) -> Option<SecretString> {
    defaults
        .api_key_env
        .as_deref()
        .and_then(read_env)
        .or_else(|| defaults.api_key.clone())
        .map(SecretString::from)
}

/// Entry API key: `api_key_env`, then plaintext `api_key`. `None` means
/// the entry uses the fleet-wide key.
///
/// An `api_key_env` naming an unset variable with no plaintext fallback
/// is an error rather than a silent downgrade to the default key.
pub fn resolve_entry_api_key(
    entry: &Entry,
    entry_name: &str,
) -> Result<Option<SecretString>, ConfigError> {
    if let Some(var) = entry.api_key_env.as_deref() {
        if let Some(value) = read_env(var) {
            return Ok(Some(SecretString::from(value)));
        }
        if entry.api_key.is_none() {
            return Err(ConfigError::NoCredentials {
                entry: entry_name.into(),
                var: var.into(),
            });
        }
    }
    Ok(entry.api_key.clone().map(SecretString::from))
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            timeout: Duration::from_secs(self.defaults.timeout),
            retry: RetryPolicy {
                max_retries: self.defaults.retries.min(1),
                ..RetryPolicy::default()
            },
            api_key_header: self.defaults.api_key_header,
        }
    }

    /// Build a `SupervisorConfig`, resolving every credential.
    pub fn to_supervisor_config(&self) -> Result<SupervisorConfig, ConfigError> {
        let mut entries = BTreeMap::new();
        for (name, entry) in &self.entries {
            let trimmed = |v: &Option<String>| {
                v.as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
            };
            entries.insert(
                name.clone(),
                EntryConfig {
                    device_id: trimmed(&entry.device_id),
                    host: trimmed(&entry.host),
                    port: entry.port,
                    api_key: resolve_entry_api_key(entry, name)?,
                },
            );
        }

        Ok(SupervisorConfig {
            transport: self.transport(),
            poll_interval: Duration::from_secs(self.defaults.poll_interval),
            failure_threshold: self.defaults.failure_threshold,
            discovery_topic: self.discovery.topic.clone(),
            removal_policy: self.discovery.removal,
            entries,
            default_api_key: resolve_default_api_key(&self.defaults),
            ..SupervisorConfig::default()
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    fn load(toml: &str) -> Result<Config, ConfigError> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml.as_bytes()).unwrap();
        load_config_from(file.path())
    }

    #[test]
    fn defaults_without_a_file() {
        let config = load_config_from(Path::new("/nonexistent/akari/config.toml")).unwrap();
        assert_eq!(config.defaults.timeout, 10);
        assert_eq!(config.defaults.poll_interval, 30);
        assert_eq!(config.defaults.failure_threshold, 3);
        assert_eq!(config.discovery.topic, "home/+/info");
        assert_eq!(config.discovery.removal, RemovalPolicy::Ignore);
        assert_eq!(config.mqtt.port, 1883);
        assert!(config.entries.is_empty());
    }

    #[test]
    fn full_file() {
        let config = load(
            r#"
            [defaults]
            timeout = 5
            poll_interval = 15
            failure_threshold = 5
            api_key_header = "x-api-key"
            api_key = "fleet"

            [discovery]
            topic = "akari/+/announce"
            removal = "empty-payload"

            [mqtt]
            host = "broker.lan"
            client_id = "akari-test"

            [entries.zona-giorno]
            device_id = "rpi-zona-giorno"
            host = "192.168.1.40"
            port = 8081
            api_key = "zg"

            [entries.garage]
            device_id = "rpi-garage"
            "#,
        )
        .unwrap();

        assert_eq!(config.defaults.api_key_header, ApiKeyHeader::XApiKey);
        assert_eq!(config.discovery.removal, RemovalPolicy::EmptyPayload);
        assert_eq!(config.mqtt.host, "broker.lan");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.entries["garage"].port, 8080);

        let sup = config.to_supervisor_config().unwrap();
        assert_eq!(sup.transport.timeout, Duration::from_secs(5));
        assert_eq!(sup.poll_interval, Duration::from_secs(15));
        assert_eq!(sup.failure_threshold, 5);
        assert_eq!(sup.discovery_topic, "akari/+/announce");

        let zg = sup.entry_identity("zona-giorno").unwrap();
        assert_eq!(zg.address(), "192.168.1.40:8081");
        assert_eq!(zg.api_key.as_ref().map(|k| k.expose_secret()), Some("zg"));

        assert!(sup.entry_identity("garage").is_none());
        assert_eq!(
            sup.api_key_for("rpi-garage").as_ref().map(|k| k.expose_secret()),
            Some("fleet")
        );
    }

    #[test]
    fn validation_names_the_field() {
        let cases = [
            ("[defaults]\ntimeout = 0", "defaults.timeout"),
            ("[defaults]\nretries = 2", "defaults.retries"),
            ("[defaults]\npoll_interval = 0", "defaults.poll_interval"),
            ("[defaults]\nfailure_threshold = 0", "defaults.failure_threshold"),
            ("[discovery]\ntopic = \"home/#\"", "discovery.topic"),
            ("[entries.empty]\nport = 8080", "entries.empty"),
            ("[entries.zero]\nhost = \"10.0.0.2\"\nport = 0", "entries.zero.port"),
        ];
        for (toml, field) in cases {
            match load(toml) {
                Err(ConfigError::Validation { field: got, .. }) => assert_eq!(got, field),
                other => panic!("{toml:?}: expected validation error, got {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_enum_values_fail_to_load() {
        assert!(matches!(
            load("[discovery]\nremoval = \"sometimes\""),
            Err(ConfigError::Figment(_))
        ));
    }

    #[test]
    fn entry_key_env_that_is_unset_is_an_error() {
        let entry = Entry {
            device_id: Some("rpi".into()),
            host: None,
            port: 8080,
            api_key: None,
            api_key_env: Some("AKARI_TEST_SURELY_UNSET_KEY_VAR".into()),
        };
        assert!(matches!(
            resolve_entry_api_key(&entry, "rpi"),
            Err(ConfigError::NoCredentials { .. })
        ));

        let with_fallback = Entry {
            api_key: Some("plain".into()),
            ..entry
        };
        let key = resolve_entry_api_key(&with_fallback, "rpi").unwrap().unwrap();
        assert_eq!(key.expose_secret(), "plain");
    }

    #[test]
    fn entry_without_key_uses_fleet_key() {
        let entry = Entry {
            device_id: Some("rpi".into()),
            host: None,
            port: 8080,
            api_key: None,
            api_key_env: None,
        };
        assert!(resolve_entry_api_key(&entry, "rpi").unwrap().is_none());
    }
}
