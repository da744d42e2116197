//! Devices whose readings are expressions evaluated in a scripting VM
//!
//! Expressions run in the named VM's persistent scope, so values prepared
//! by a `javascript` init script are visible to them.

use crate::api::{Battery, ChargeStatus, Charger, Meter, Vehicle};
use crate::config::TypedConfig;
use crate::error::{Result, SeleneError};
use crate::scripting::{ScriptRuntime, ScriptVm};
use serde::Deserialize;
use std::sync::Arc;

fn default_vm() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptMeterConfig {
    #[serde(default = "default_vm")]
    vm: String,
    power: String,
}

/// Meter reading `power` from an expression
pub struct ScriptMeter {
    vm: Arc<ScriptVm>,
    power: String,
}

impl ScriptMeter {
    pub fn from_config(cfg: &TypedConfig, scripts: &ScriptRuntime) -> Result<Self> {
        let cc: ScriptMeterConfig = cfg.decode()?;
        Ok(Self {
            vm: scripts.vm(&cc.vm)?,
            power: cc.power,
        })
    }
}

#[async_trait::async_trait]
impl Meter for ScriptMeter {
    async fn current_power(&self) -> Result<f64> {
        self.vm.eval_f64(&self.power)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptChargerConfig {
    #[serde(default = "default_vm")]
    vm: String,
    connected: String,
    charging: String,
    #[serde(default)]
    soc: Option<String>,
}

/// Charger deriving its status from `connected` and `charging` expressions
pub struct ScriptCharger {
    vm: Arc<ScriptVm>,
    connected: String,
    charging: String,
    soc: Option<String>,
}

impl ScriptCharger {
    pub fn from_config(cfg: &TypedConfig, scripts: &ScriptRuntime) -> Result<Self> {
        let cc: ScriptChargerConfig = cfg.decode()?;
        Ok(Self {
            vm: scripts.vm(&cc.vm)?,
            connected: cc.connected,
            charging: cc.charging,
            soc: cc.soc,
        })
    }
}

#[async_trait::async_trait]
impl Charger for ScriptCharger {
    async fn status(&self) -> Result<ChargeStatus> {
        if self.vm.eval_f64(&self.charging)? != 0.0 {
            return Ok(ChargeStatus::C);
        }
        if self.vm.eval_f64(&self.connected)? != 0.0 {
            return Ok(ChargeStatus::B);
        }
        Ok(ChargeStatus::A)
    }

    fn battery(&self) -> Option<&dyn Battery> {
        self.soc.is_some().then_some(self as &dyn Battery)
    }
}

#[async_trait::async_trait]
impl Battery for ScriptCharger {
    async fn soc(&self) -> Result<f64> {
        match &self.soc {
            Some(expr) => self.vm.eval_f64(expr),
            None => Err(SeleneError::NotAvailable),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptVehicleConfig {
    #[serde(default = "default_vm")]
    vm: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    capacity: f64,
    #[serde(default)]
    soc: Option<String>,
}

pub struct ScriptVehicle {
    vm: Arc<ScriptVm>,
    title: String,
    capacity: f64,
    soc: Option<String>,
}

impl ScriptVehicle {
    pub fn from_config(cfg: &TypedConfig, scripts: &ScriptRuntime) -> Result<Self> {
        let cc: ScriptVehicleConfig = cfg.decode()?;
        Ok(Self {
            vm: scripts.vm(&cc.vm)?,
            title: cc.title,
            capacity: cc.capacity,
            soc: cc.soc,
        })
    }
}

impl Vehicle for ScriptVehicle {
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
impl Battery for ScriptVehicle {
    async fn soc(&self) -> Result<f64> {
        match &self.soc {
            Some(expr) => self.vm.eval_f64(expr),
            None => Err(SeleneError::NotAvailable),
        }
    }
}
