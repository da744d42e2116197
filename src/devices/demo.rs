//! Devices reporting static values, for trying out a configuration

use crate::api::{Battery, ChargeStatus, Charger, Meter, Vehicle};
use crate::config::TypedConfig;
use crate::error::{Result, SeleneError};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct DemoMeter {
    power: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DemoMeterConfig {
    power: f64,
}

impl DemoMeter {
    pub fn new(power: f64) -> Self {
        Self { power }
    }

    pub fn from_config(cfg: &TypedConfig) -> Result<Self> {
        let cc: DemoMeterConfig = cfg.decode()?;
        Ok(Self::new(cc.power))
    }
}

#[async_trait::async_trait]
impl Meter for DemoMeter {
    async fn current_power(&self) -> Result<f64> {
        Ok(self.power)
    }
}

/// Charger with a fixed status and an optional cable-reported SoC
#[derive(Debug, Clone)]
pub struct DemoCharger {
    status: ChargeStatus,
    soc: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DemoChargerConfig {
    #[serde(default = "default_status")]
    status: String,
    #[serde(default)]
    soc: Option<f64>,
}

fn default_status() -> String {
    "A".to_string()
}

impl DemoCharger {
    pub fn new(status: ChargeStatus, soc: Option<f64>) -> Self {
        Self { status, soc }
    }

    pub fn from_config(cfg: &TypedConfig) -> Result<Self> {
        let cc: DemoChargerConfig = cfg.decode()?;
        Ok(Self::new(cc.status.parse()?, cc.soc))
    }
}

#[async_trait::async_trait]
impl Charger for DemoCharger {
    async fn status(&self) -> Result<ChargeStatus> {
        Ok(self.status)
    }

    fn battery(&self) -> Option<&dyn Battery> {
        self.soc.is_some().then_some(self as &dyn Battery)
    }
}

#[async_trait::async_trait]
impl Battery for DemoCharger {
    async fn soc(&self) -> Result<f64> {
        self.soc.ok_or(SeleneError::NotAvailable)
    }
}

#[derive(Debug, Clone)]
pub struct DemoVehicle {
    title: String,
    capacity: f64,
    soc: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DemoVehicleConfig {
    #[serde(default)]
    title: String,
    #[serde(default)]
    capacity: f64,
    #[serde(default)]
    soc: Option<f64>,
}

impl DemoVehicle {
    pub fn new(title: &str, capacity: f64, soc: Option<f64>) -> Self {
        Self {
            title: title.to_string(),
            capacity,
            soc,
        }
    }

    pub fn from_config(cfg: &TypedConfig) -> Result<Self> {
        let cc: DemoVehicleConfig = cfg.decode()?;
        Ok(Self::new(&cc.title, cc.capacity, cc.soc))
    }
}

impl Vehicle for DemoVehicle {
    fn title(&self) -> &str {
        &self.title
    }

    fn capacity(&self) -> f64 {
        self.capacity
    }

    fn battery(&self) -> Option<&dyn Battery> {
        self.soc.is_some().then_some(self as &dyn Battery)
    }
}

#[async_trait::async_trait]
impl Battery for DemoVehicle {
    async fn soc(&self) -> Result<f64> {
        self.soc.ok_or(SeleneError::NotAvailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn charger_exposes_battery_only_with_soc() {
        let plain = DemoCharger::from_config(&TypedConfig::new("demo").with("status", "B")).unwrap();
        assert_eq!(plain.status().await.unwrap(), ChargeStatus::B);
        assert!(plain.battery().is_none());

        let cable = DemoCharger::new(ChargeStatus::C, Some(55.0));
        assert_eq!(cable.battery().unwrap().soc().await.unwrap(), 55.0);
    }

    #[test]
    fn unknown_options_are_rejected() {
        let cfg = TypedConfig::new("demo").with("powr", 1.0);
        assert!(DemoMeter::from_config(&cfg).is_err());
        let cfg = TypedConfig::new("demo").with("status", "X");
        assert!(DemoCharger::from_config(&cfg).is_err());
    }
}
