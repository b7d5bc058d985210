pub mod cloud;
pub mod proxy;
pub mod rate_limit;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::ProviderSettings;

pub use cloud::CloudTranslator;
pub use proxy::ProxyTranslator;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("unreadable provider response: {0}")]
    Parse(String),
    #[error("rate limited by provider")]
    RateLimited,
    #[error("provider is not configured: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited | ProviderError::Http { status: 429, .. }
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ProviderError::Parse(error.to_string())
        } else {
            ProviderError::Network(error.to_string())
        }
    }
}

/// Result of one provider attempt, normalized so callers never look at raw
/// error shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    Translated(String),
    NotApplicable,
    RateLimited,
    Failed(String),
}

impl From<Result<String, ProviderError>> for ProviderOutcome {
    fn from(result: Result<String, ProviderError>) -> Self {
        match result {
            Ok(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    ProviderOutcome::NotApplicable
                } else {
                    ProviderOutcome::Translated(trimmed.to_string())
                }
            }
            Err(error) if error.is_rate_limited() => ProviderOutcome::RateLimited,
            Err(error) => ProviderOutcome::Failed(error.to_string()),
        }
    }
}

#[async_trait]
pub trait TranslationProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn translate(&self, text: &str, target: &str) -> Result<String, ProviderError>;

    async fn translate_outcome(&self, text: &str, target: &str) -> ProviderOutcome {
        self.translate(text, target).await.into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Cloud,
    #[default]
    Proxy,
}

impl ProviderKind {
    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::Cloud => "cloud",
            ProviderKind::Proxy => "proxy",
        }
    }

    pub fn build(
        self,
        settings: &ProviderSettings,
    ) -> Result<Arc<dyn TranslationProvider>, ProviderError> {
        match self {
            ProviderKind::Cloud => {
                let api_key = settings.cloud_api_key.clone().ok_or_else(|| {
                    ProviderError::Config("CLOUD_API_KEY is required for the cloud provider".into())
                })?;
                Ok(Arc::new(CloudTranslator::new(&settings.cloud_api_url, api_key)?))
            }
            ProviderKind::Proxy => Ok(Arc::new(ProxyTranslator::new(
                &settings.proxy_url,
                settings.proxy_ca_cert.as_deref(),
                settings.proxy_insecure,
            )?)),
        }
    }
}

impl TryFrom<&str> for ProviderKind {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cloud" => Ok(ProviderKind::Cloud),
            "proxy" => Ok(ProviderKind::Proxy),
            other => Err(format!("unsupported translation provider: {other}")),
        }
    }
}
