//! Push notifications
//!
//! Load points emit named [`Event`]s. The [`Hub`] looks up the message
//! template configured for the event, fills it with current values from the
//! cache and sends the result through every configured [`Messenger`].

use crate::config::TypedConfig;
use crate::error::{Result, SeleneError};
use std::collections::HashMap;

pub mod hub;
pub mod pushover;
pub mod telegram;
pub mod webhook;

pub use hub::Hub;

/// Capacity of the event channel feeding the hub
pub const EVENT_CHANNEL_CAPACITY: usize = 1;

/// A notification trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Originating load point; `None` for site events
    pub loadpoint: Option<usize>,
    pub event: String,
}

impl Event {
    pub fn new(loadpoint: Option<usize>, event: &str) -> Self {
        Self {
            loadpoint,
            event: event.to_string(),
        }
    }
}

/// A push back-end
#[async_trait::async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, title: &str, msg: &str) -> Result<()>;
}

/// Build a back-end from its `type` and options
pub fn new_messenger_from_config(cfg: &TypedConfig) -> Result<Box<dyn Messenger>> {
    match cfg.kind.to_lowercase().as_str() {
        "pushover" => Ok(Box::new(pushover::Pushover::from_config(cfg)?)),
        "telegram" => Ok(Box::new(telegram::Telegram::from_config(cfg)?)),
        "webhook" => Ok(Box::new(webhook::Webhook::from_config(cfg)?)),
        other => Err(SeleneError::config(format!(
            "unknown messenger type: {}",
            other
        ))),
    }
}

/// Largest supported `%.Nf` precision
pub const MAX_PRECISION: usize = 17;

/// Replace `${key}` and `${key:%.Nf}` placeholders with values
pub fn render(template: &str, values: &HashMap<String, f64>) -> Result<String> {
    render_with(template, |key| values.get(key).copied())
}

/// Check placeholder syntax and formats without any values at hand
pub fn validate_template(template: &str) -> Result<()> {
    render_with(template, |_| Some(0.0)).map(|_| ())
}

fn render_with(template: &str, lookup: impl Fn(&str) -> Option<f64>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| SeleneError::config(format!("unterminated placeholder in {:?}", template)))?;

        let placeholder = &after[..end];
        let (key, format) = match placeholder.split_once(':') {
            Some((key, format)) => (key.trim(), Some(format.trim())),
            None => (placeholder.trim(), None),
        };

        let value = lookup(key).ok_or_else(|| SeleneError::config(format!("no value for {}", key)))?;
        out.push_str(&format_value(value, format)?);

        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn format_value(value: f64, format: Option<&str>) -> Result<String> {
    let Some(format) = format else {
        return Ok(value.to_string());
    };

    if format == "%d" {
        return Ok(format!("{:.0}", value));
    }

    let precision = format
        .strip_prefix("%.")
        .and_then(|f| f.strip_suffix('f'))
        .and_then(|p| p.parse::<usize>().ok())
        .filter(|p| *p <= MAX_PRECISION)
        .ok_or_else(|| SeleneError::config(format!("unsupported format {}", format)))?;
    Ok(format!("{:.*}", precision, value))
}
