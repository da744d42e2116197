use super::Messenger;
use crate::config::TypedConfig;
use crate::error::{Result, SeleneError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WebhookConfig {
    uri: String,
    #[serde(default)]
    headers: HashMap<String, String>,
}

/// Posts `{"title": …, "msg": …}` as JSON to an arbitrary endpoint
pub struct Webhook {
    client: reqwest::Client,
    uri: String,
    headers: HeaderMap,
}

impl Webhook {
    pub fn from_config(cfg: &TypedConfig) -> Result<Self> {
        let cc: WebhookConfig = cfg.decode()?;
        Self::new(&cc.uri, &cc.headers)
    }

    pub fn new(uri: &str, headers: &HashMap<String, String>) -> Result<Self> {
        if uri.trim().is_empty() {
            return Err(SeleneError::validation("uri", "Missing webhook uri"));
        }

        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SeleneError::config(format!("header {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SeleneError::config(format!("header {}: {}", name, e)))?;
            header_map.insert(name, value);
        }

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
            uri: uri.to_string(),
            headers: header_map,
        })
    }
}

#[async_trait::async_trait]
impl Messenger for Webhook {
    async fn send(&self, title: &str, msg: &str) -> Result<()> {
        let resp = self
            .client
            .post(&self.uri)
            .headers(self.headers.clone())
            .json(&json!({"title": title, "msg": msg}))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(SeleneError::api(format!("webhook: {}", resp.status())));
        }
        Ok(())
    }
}
