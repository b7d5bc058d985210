use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Certificate, Client};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use super::rate_limit::classify_http_failure;
use super::{ProviderError, TranslationProvider};

/// Client for the gateway's `POST /translate` endpoint.
#[derive(Debug, Clone)]
pub struct ProxyTranslator {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct GatewayReply {
    translated: Option<String>,
}

impl ProxyTranslator {
    pub fn new(
        base_url: &str,
        ca_cert: Option<&Path>,
        accept_invalid_certs: bool,
    ) -> Result<Self, ProviderError> {
        let mut builder = Client::builder();

        if let Some(path) = ca_cert {
            let pem = fs::read(path).map_err(|err| {
                ProviderError::Config(format!(
                    "cannot read CA certificate {}: {err}",
                    path.to_string_lossy()
                ))
            })?;
            let certificate = Certificate::from_pem(&pem)
                .map_err(|err| ProviderError::Config(format!("invalid CA certificate: {err}")))?;
            builder = builder.add_root_certificate(certificate);
        }

        if accept_invalid_certs {
            warn!("proxy provider accepts invalid TLS certificates");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|err| ProviderError::Config(err.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/translate", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TranslationProvider for ProxyTranslator {
    fn name(&self) -> &'static str {
        "proxy"
    }

    async fn translate(&self, text: &str, target: &str) -> Result<String, ProviderError> {
        debug!("proxy translate via {} -> {target}: {text}", self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": text, "target": target }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(classify_http_failure(status, body));
        }

        let reply: GatewayReply =
            serde_json::from_str(&body).map_err(|err| ProviderError::Parse(err.to_string()))?;
        reply
            .translated
            .ok_or_else(|| ProviderError::Parse("gateway reply has no translated text".into()))
    }
}
