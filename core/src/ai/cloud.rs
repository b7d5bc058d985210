use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;

use super::rate_limit::classify_http_failure;
use super::{ProviderError, TranslationProvider};

pub const DEFAULT_CLOUD_API_URL: &str = "https://translation.googleapis.com/language/translate/v2";

/// Direct client for a Google-style cloud translation endpoint. One request
/// per text.
#[derive(Debug, Clone)]
pub struct CloudTranslator {
    client: Client,
    api_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct CloudResponse {
    data: Option<CloudData>,
}

#[derive(Debug, Deserialize)]
struct CloudData {
    #[serde(default)]
    translations: Vec<CloudTranslation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloudTranslation {
    translated_text: Option<String>,
}

impl CloudTranslator {
    pub fn new(api_url: &str, api_key: String) -> Result<Self, ProviderError> {
        let api_key = api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(ProviderError::Config("cloud API key is empty".into()));
        }
        let client = Client::builder()
            .build()
            .map_err(|err| ProviderError::Config(err.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl TranslationProvider for CloudTranslator {
    fn name(&self) -> &'static str {
        "cloud"
    }

    async fn translate(&self, text: &str, target: &str) -> Result<String, ProviderError> {
        debug!("cloud translate -> {target}: {text}");
        let response = self
            .client
            .post(&self.api_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&serde_json::json!({
                "q": text,
                "target": target,
                "format": "text",
            }))
            .send()
            .await
            .map_err(|err| ProviderError::Network(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ProviderError::Network(err.to_string()))?;

        if !status.is_success() {
            return Err(classify_http_failure(status, body));
        }

        let parsed: CloudResponse =
            serde_json::from_str(&body).map_err(|err| ProviderError::Parse(err.to_string()))?;

        parsed
            .data
            .and_then(|data| data.translations.into_iter().next())
            .and_then(|translation| translation.translated_text)
            .ok_or_else(|| ProviderError::Parse("response has no translatedText".into()))
    }
}
