use super::ChargeProgress;
use crate::api::{ChargeStatus, Charger, Meter};
use crate::devices::DeviceRegistry;
use crate::error::{Result, SeleneError};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::pipe::Sample;
use crate::push::Event;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Nominal phase voltage used to convert current limits into power
pub const NOMINAL_VOLTAGE: f64 = 230.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeMode {
    #[default]
    Off,
    Now,
    MinPV,
    PV,
}

impl fmt::Display for ChargeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChargeMode::Off => "off",
            ChargeMode::Now => "now",
            ChargeMode::MinPV => "minpv",
            ChargeMode::PV => "pv",
        };
        f.write_str(s)
    }
}

fn default_min_current() -> f64 {
    6.0
}

fn default_max_current() -> f64 {
    16.0
}

fn default_phases() -> u8 {
    3
}

/// One `loadpoints[]` block
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct LoadPointConfig {
    #[serde(default)]
    pub title: String,
    /// Charger device name
    pub charger: String,
    /// Charge meter device name; without one, charge power reads as zero
    #[serde(default)]
    pub meter: Option<String>,
    /// Default vehicle device name
    #[serde(default)]
    pub vehicle: Option<String>,
    /// Controller mode; only logged
    #[serde(default)]
    pub mode: ChargeMode,
    #[serde(default = "default_min_current", alias = "mincurrent")]
    pub min_current: f64,
    #[serde(default = "default_max_current", alias = "maxcurrent")]
    pub max_current: f64,
    #[serde(default = "default_phases")]
    pub phases: u8,
}

/// A single charging connection
pub struct LoadPoint {
    label: String,
    title: String,
    min_current: f64,
    max_current: f64,
    phases: u8,
    charger: Arc<dyn Charger>,
    meter: Option<Arc<dyn Meter>>,
    progress: ChargeProgress,
    last_status: Mutex<Option<ChargeStatus>>,
    logger: StructuredLogger,
}

impl LoadPoint {
    /// Build a load point labelled `label` from its decoded block
    pub fn from_config(label: &str, devices: &DeviceRegistry, config: LoadPointConfig) -> Result<Self> {
        if config.min_current <= 0.0 {
            return Err(SeleneError::validation(
                "minCurrent",
                "Must be greater than 0",
            ));
        }
        if config.max_current < config.min_current {
            return Err(SeleneError::validation(
                "maxCurrent",
                "Must not be below minCurrent",
            ));
        }
        if !matches!(config.phases, 1 | 3) {
            return Err(SeleneError::validation(
                "phases".to_string(),
                format!("Must be 1 or 3, got {}", config.phases),
            ));
        }

        let charger = devices.charger(&config.charger)?;
        let meter = config
            .meter
            .as_deref()
            .map(|name| devices.meter(name))
            .transpose()?;
        let vehicle = config
            .vehicle
            .as_deref()
            .map(|name| devices.vehicle(name))
            .transpose()?;

        let title = if config.title.trim().is_empty() {
            label.to_string()
        } else {
            config.title.clone()
        };

        let logger = get_logger_with_context(LogContext::new(label).with_field("title", title.as_str()));
        logger.debug(&format!(
            "mode {}, current {}..{}A, {}p",
            config.mode, config.min_current, config.max_current, config.phases
        ));

        Ok(Self {
            label: label.to_string(),
            title,
            min_current: config.min_current,
            max_current: config.max_current,
            phases: config.phases,
            progress: ChargeProgress::new(charger.clone(), vehicle),
            charger,
            meter,
            last_status: Mutex::new(None),
            logger,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn min_current(&self) -> f64 {
        self.min_current
    }

    pub fn max_current(&self) -> f64 {
        self.max_current
    }

    pub fn phases(&self) -> u8 {
        self.phases
    }

    /// Upper bound of the charging power in W
    pub fn max_power(&self) -> f64 {
        self.max_current * f64::from(self.phases) * NOMINAL_VOLTAGE
    }

    pub fn progress(&self) -> &ChargeProgress {
        &self.progress
    }

    /// Measure once, publishing values and status transitions
    pub async fn update(
        &self,
        index: usize,
        values: &mpsc::Sender<Sample>,
        events: Option<&mpsc::Sender<Event>>,
    ) {
        let lp = Some(index);

        match self.charger.status().await {
            Ok(status) => {
                publish(values, lp, "connected", bool_value(status.connected())).await;
                publish(values, lp, "charging", bool_value(status.charging())).await;

                let prev = self
                    .last_status
                    .lock()
                    .ok()
                    .and_then(|mut last| last.replace(status));
                if let (Some(prev), Some(events)) = (prev, events) {
                    for name in status_events(prev, status) {
                        self.logger.info(&format!("{} ({} -> {})", name, prev, status));
                        let _ = events.send(Event::new(lp, name)).await;
                    }
                }
            }
            Err(e) => self.logger.error(&format!("charger status: {}", e)),
        }

        let power = match &self.meter {
            Some(meter) => meter.current_power().await,
            None => Ok(0.0),
        };
        match power {
            Ok(power) => publish(values, lp, "chargePower", power).await,
            Err(e) => self.logger.error(&format!("charge meter: {}", e)),
        }

        match self.progress.soc().await {
            Ok(soc) => publish(values, lp, "socCharge", soc).await,
            Err(e) if e.is_not_available() => {}
            Err(e) => self.logger.warn(&format!("vehicle soc: {}", e)),
        }
    }
}

fn bool_value(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

pub(crate) async fn publish(values: &mpsc::Sender<Sample>, lp: Option<usize>, key: &str, value: f64) {
    // Nobody listening is not an error
    let _ = values.send(Sample::new(lp, key, value)).await;
}

/// Push events implied by a status change
fn status_events(prev: ChargeStatus, next: ChargeStatus) -> Vec<&'static str> {
    let mut events = Vec::new();
    if !prev.connected() && next.connected() {
        events.push("connect");
    }
    if !prev.charging() && next.charging() {
        events.push("start");
    }
    if prev.charging() && !next.charging() {
        events.push("stop");
    }
    if prev.connected() && !next.connected() {
        events.push("disconnect");
    }
    events
}
