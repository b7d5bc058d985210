/// Configuration for the gateway, providers and batch scheduling
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::ai::cloud::DEFAULT_CLOUD_API_URL;
use crate::ai::ProviderKind;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_BATCH_DELAY_MS: u64 = 1000;
pub const DEFAULT_RATE_LIMIT_DELAY_MS: u64 = 5000;

pub const CERT_FILE_NAME: &str = "cert.pem";
pub const KEY_FILE_NAME: &str = "key.pem";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Batching parameters. Always valid: out-of-range input is replaced by the
/// defaults instead of being rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawBatchConfig")]
pub struct BatchConfig {
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub rate_limit_delay_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBatchConfig {
    batch_size: Option<Value>,
    batch_delay_ms: Option<Value>,
    rate_limit_delay_ms: Option<Value>,
}

impl From<RawBatchConfig> for BatchConfig {
    fn from(raw: RawBatchConfig) -> Self {
        Self::coerce(
            raw.batch_size.as_ref().and_then(number_from_value),
            raw.batch_delay_ms.as_ref().and_then(number_from_value),
            raw.rate_limit_delay_ms.as_ref().and_then(number_from_value),
        )
    }
}

fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay_ms: DEFAULT_BATCH_DELAY_MS,
            rate_limit_delay_ms: DEFAULT_RATE_LIMIT_DELAY_MS,
        }
    }
}

impl BatchConfig {
    pub fn coerce(
        batch_size: Option<f64>,
        batch_delay_ms: Option<f64>,
        rate_limit_delay_ms: Option<f64>,
    ) -> Self {
        let batch_size = match batch_size {
            Some(size) if size.is_finite() && size >= 1.0 => size.floor() as usize,
            _ => DEFAULT_BATCH_SIZE,
        };
        Self {
            batch_size,
            batch_delay_ms: coerce_delay(batch_delay_ms, DEFAULT_BATCH_DELAY_MS),
            rate_limit_delay_ms: coerce_delay(rate_limit_delay_ms, DEFAULT_RATE_LIMIT_DELAY_MS),
        }
    }

    /// Builds a config from raw option strings such as environment values.
    pub fn from_strs(
        batch_size: Option<&str>,
        batch_delay_ms: Option<&str>,
        rate_limit_delay_ms: Option<&str>,
    ) -> Self {
        let parse = |raw: Option<&str>| raw.and_then(|value| value.trim().parse::<f64>().ok());
        Self::coerce(parse(batch_size), parse(batch_delay_ms), parse(rate_limit_delay_ms))
    }

    /// Applies the same fallback as [`BatchConfig::coerce`] to a config
    /// built directly, so a zero batch size still makes progress.
    pub fn normalized(self) -> Self {
        if self.batch_size == 0 {
            Self {
                batch_size: DEFAULT_BATCH_SIZE,
                ..self
            }
        } else {
            self
        }
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }
}

fn coerce_delay(value: Option<f64>, default: u64) -> u64 {
    match value {
        Some(ms) if ms.is_finite() && ms >= 0.0 => ms.floor() as u64,
        _ => default,
    }
}

/// Log verbosity; each level includes the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    /// Unknown names fall back to `info`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }

    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    pub host: String,
    pub port: u16,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub cert_dir: Option<PathBuf>,
    pub backend_url: String,
    pub model: String,
    pub substitutions_file: Option<PathBuf>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8443,
            cert: None,
            key: None,
            cert_dir: None,
            backend_url: "http://127.0.0.1:11434".into(),
            model: "llama3".into(),
            substitutions_file: None,
        }
    }
}

impl GatewaySettings {
    /// Certificate and key paths: explicit paths win, otherwise `cert.pem`
    /// and `key.pem` inside the certificate directory.
    pub fn tls_paths(&self) -> (PathBuf, PathBuf) {
        let dir = self.cert_dir.clone().unwrap_or_else(default_cert_dir);
        let cert = self.cert.clone().unwrap_or_else(|| dir.join(CERT_FILE_NAME));
        let key = self.key.clone().unwrap_or_else(|| dir.join(KEY_FILE_NAME));
        (cert, key)
    }
}

fn default_cert_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("filename-translator")
        .join("certs")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub target_lang: String,
    pub proxy_url: String,
    pub proxy_ca_cert: Option<PathBuf>,
    pub proxy_insecure: bool,
    pub cloud_api_url: String,
    pub cloud_api_key: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            target_lang: "en".into(),
            proxy_url: "https://127.0.0.1:8443".into(),
            proxy_ca_cert: None,
            proxy_insecure: false,
            cloud_api_url: DEFAULT_CLOUD_API_URL.into(),
            cloud_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub gateway: GatewaySettings,
    pub provider: ProviderSettings,
    pub batch: BatchConfig,
    pub log_level: LogLevel,
}

impl Settings {
    /// Settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().with_overrides(lookup)
    }

    /// Load settings from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Applies every recognized option found through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(host) = get("GATEWAY_HOST") {
            self.gateway.host = host;
        }
        if let Some(port) = get("GATEWAY_PORT") {
            self.gateway.port = port.parse().map_err(|_| ConfigError::Invalid {
                key: "GATEWAY_PORT",
                value: port.clone(),
            })?;
        }
        if let Some(cert) = get("GATEWAY_CERT") {
            self.gateway.cert = Some(PathBuf::from(cert));
        }
        if let Some(key) = get("GATEWAY_KEY") {
            self.gateway.key = Some(PathBuf::from(key));
        }
        if let Some(dir) = get("GATEWAY_CERT_DIR") {
            self.gateway.cert_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = get("BACKEND_URL") {
            self.gateway.backend_url = url;
        }
        if let Some(model) = get("BACKEND_MODEL") {
            self.gateway.model = model;
        }
        if let Some(path) = get("SUBSTITUTIONS_FILE") {
            self.gateway.substitutions_file = Some(PathBuf::from(path));
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.log_level = LogLevel::parse(&level);
        }

        let batch_size = get("BATCH_SIZE");
        let batch_delay = get("BATCH_DELAY_MS");
        let rate_limit_delay = get("RATE_LIMIT_DELAY_MS");
        if batch_size.is_some() || batch_delay.is_some() || rate_limit_delay.is_some() {
            let parsed = BatchConfig::from_strs(
                batch_size.as_deref(),
                batch_delay.as_deref(),
                rate_limit_delay.as_deref(),
            );
            if batch_size.is_some() {
                self.batch.batch_size = parsed.batch_size;
            }
            if batch_delay.is_some() {
                self.batch.batch_delay_ms = parsed.batch_delay_ms;
            }
            if rate_limit_delay.is_some() {
                self.batch.rate_limit_delay_ms = parsed.rate_limit_delay_ms;
            }
        }

        if let Some(kind) = get("TRANSLATION_PROVIDER") {
            self.provider.kind = ProviderKind::try_from(kind.as_str()).map_err(|_| {
                ConfigError::Invalid {
                    key: "TRANSLATION_PROVIDER",
                    value: kind.clone(),
                }
            })?;
        }
        if let Some(target) = get("TARGET_LANG") {
            self.provider.target_lang = target;
        }
        if let Some(url) = get("PROXY_URL") {
            self.provider.proxy_url = url;
        }
        if let Some(path) = get("PROXY_CA_CERT") {
            self.provider.proxy_ca_cert = Some(PathBuf::from(path));
        }
        if let Some(flag) = get("PROXY_INSECURE") {
            self.provider.proxy_insecure = parse_flag(&flag);
        }
        if let Some(url) = get("CLOUD_API_URL") {
            self.provider.cloud_api_url = url;
        }
        if let Some(key) = get("CLOUD_API_KEY") {
            self.provider.cloud_api_key = Some(key);
        }

        Ok(self)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
