//! InfluxDB telemetry sink
//!
//! Writes each sample as one line of line protocol. Samples from a load
//! point are tagged with its title. The v2 write API is used when a token is
//! configured, v1 otherwise.

use crate::config::InfluxConfig;
use crate::error::{Result, SeleneError};
use crate::logging::{StructuredLogger, get_logger};
use crate::pipe::Sample;
use crate::shutdown::ShutdownSignal;
use reqwest::header::AUTHORIZATION;
use std::time::Duration;
use tokio::sync::mpsc;

enum WriteApi {
    V1 {
        database: String,
        user: String,
        password: String,
    },
    V2 {
        token: String,
        org: String,
        bucket: String,
    },
}

pub struct InfluxWriter {
    client: reqwest::Client,
    url: String,
    api: WriteApi,
    logger: StructuredLogger,
}

impl InfluxWriter {
    pub fn new(config: &InfluxConfig) -> Result<Self> {
        let url = config.url.trim().trim_end_matches('/');
        if url.is_empty() {
            return Err(SeleneError::validation("influx.url", "Missing url"));
        }

        let api = if config.token.is_empty() {
            WriteApi::V1 {
                database: config.database.clone(),
                user: config.user.clone(),
                password: config.password.clone(),
            }
        } else {
            WriteApi::V2 {
                token: config.token.clone(),
                org: config.org.clone(),
                bucket: config.database.clone(),
            }
        };

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
            url: url.to_string(),
            api,
            logger: get_logger("influx"),
        })
    }

    /// Send a batch of line-protocol lines
    pub async fn write(&self, lines: &[String]) -> Result<()> {
        let body = lines.join("\n");

        let req = match &self.api {
            WriteApi::V1 {
                database,
                user,
                password,
            } => {
                let mut query = vec![("db", database.as_str()), ("precision", "s")];
                if !user.is_empty() {
                    query.push(("u", user.as_str()));
                    query.push(("p", password.as_str()));
                }
                self.client
                    .post(format!("{}/write", self.url))
                    .query(&query)
            }
            WriteApi::V2 { token, org, bucket } => self
                .client
                .post(format!("{}/api/v2/write", self.url))
                .query(&[
                    ("org", org.as_str()),
                    ("bucket", bucket.as_str()),
                    ("precision", "s"),
                ])
                .header(AUTHORIZATION, format!("Token {}", token)),
        };

        let resp = req.body(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(SeleneError::api(format!(
                "influx write failed: {} {}",
                status,
                text.trim()
            )));
        }
        Ok(())
    }

    /// Write samples until the channel closes or shutdown fires
    pub async fn run(self, titles: Vec<String>, mut input: mpsc::Receiver<Sample>, shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                sample = input.recv() => {
                    let Some(sample) = sample else { break };
                    let title = sample.loadpoint.and_then(|lp| titles.get(lp)).map(String::as_str);
                    let line = line(&sample, title);
                    if let Err(e) = self.write(&[line]).await {
                        self.logger.error(&format!("{}", e));
                    }
                }
            }
        }
        self.logger.debug("writer stopped");
    }
}

/// Encode a sample as line protocol with second precision
pub fn line(sample: &Sample, loadpoint: Option<&str>) -> String {
    let mut line = escape(&sample.key, &[',', ' ']);
    if let Some(title) = loadpoint {
        line.push_str(",loadpoint=");
        line.push_str(&escape(title, &[',', ' ', '=']));
    }
    line.push_str(&format!(
        " value={} {}",
        sample.value,
        sample.timestamp.timestamp()
    ));
    line
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
