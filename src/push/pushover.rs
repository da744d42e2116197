use super::Messenger;
use crate::config::TypedConfig;
use crate::error::{Result, SeleneError};
use serde::Deserialize;
use std::time::Duration;

pub const PUSHOVER_URI: &str = "https://api.pushover.net/1/messages.json";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PushoverConfig {
    app: String,
    #[serde(default)]
    recipients: Vec<String>,
}

/// Pushover application sending to one or more user keys
pub struct Pushover {
    client: reqwest::Client,
    uri: String,
    app: String,
    recipients: Vec<String>,
}

impl Pushover {
    pub fn from_config(cfg: &TypedConfig) -> Result<Self> {
        let cc: PushoverConfig = cfg.decode()?;
        Self::new(&cc.app, cc.recipients, PUSHOVER_URI)
    }

    pub fn new(app: &str, recipients: Vec<String>, uri: &str) -> Result<Self> {
        if app.trim().is_empty() {
            return Err(SeleneError::validation("app", "Missing app token"));
        }
        if recipients.is_empty() {
            return Err(SeleneError::validation("recipients", "Missing recipients"));
        }

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
            uri: uri.to_string(),
            app: app.to_string(),
            recipients,
        })
    }
}

#[async_trait::async_trait]
impl Messenger for Pushover {
    async fn send(&self, title: &str, msg: &str) -> Result<()> {
        for user in &self.recipients {
            let resp = self
                .client
                .post(&self.uri)
                .form(&[
                    ("token", self.app.as_str()),
                    ("user", user.as_str()),
                    ("title", title),
                    ("message", msg),
                ])
                .send()
                .await?;

            if !resp.status().is_success() {
                return Err(SeleneError::api(format!("pushover: {}", resp.status())));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn sends_one_message_per_recipient() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/1/messages.json")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("token".into(), "app-token".into()),
                Matcher::UrlEncoded("title".into(), "Title".into()),
                Matcher::UrlEncoded("message".into(), "Body text".into()),
            ]))
            .with_status(200)
            .expect(2)
            .create_async()
            .await;

        let pushover = Pushover::new(
            "app-token",
            vec!["u1".to_string(), "u2".to_string()],
            &format!("{}/1/messages.json", server.url()),
        )
        .unwrap();
        pushover.send("Title", "Body text").await.unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn requires_app_and_recipients() {
        assert!(Pushover::from_config(&TypedConfig::new("pushover").with("app", "x")).is_err());
        assert!(Pushover::from_config(&TypedConfig::new("pushover")).is_err());
    }
}
