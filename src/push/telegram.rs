use super::Messenger;
use crate::config::TypedConfig;
use crate::error::{Result, SeleneError};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TelegramConfig {
    token: String,
    #[serde(default)]
    chats: Vec<i64>,
}

/// Telegram bot posting the message text to chats
pub struct Telegram {
    client: reqwest::Client,
    api: String,
    token: String,
    chats: Vec<i64>,
}

impl Telegram {
    pub fn from_config(cfg: &TypedConfig) -> Result<Self> {
        let cc: TelegramConfig = cfg.decode()?;
        Self::new(&cc.token, cc.chats, TELEGRAM_API)
    }

    pub fn new(token: &str, chats: Vec<i64>, api: &str) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(SeleneError::validation("token", "Missing bot token"));
        }

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
            api: api.trim_end_matches('/').to_string(),
            token: token.to_string(),
            chats,
        })
    }
}

#[async_trait::async_trait]
impl Messenger for Telegram {
    /// The title is not shown; bots only send the text
    async fn send(&self, _title: &str, msg: &str) -> Result<()> {
        let uri = format!("{}/bot{}/sendMessage", self.api, self.token);
        for chat in &self.chats {
            let resp = self
                .client
                .post(&uri)
                .json(&json!({"chat_id": chat, "text": msg}))
                .send()
                .await?;

            if !resp.status().is_success() {
                return Err(SeleneError::api(format!("telegram: {}", resp.status())));
            }
        }
        Ok(())
    }
}
