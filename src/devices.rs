//! Named device registry
//!
//! Meters, chargers and vehicles are declared once under their own config
//! sections and referenced by name from the site and the load points. The
//! registry builds every declared device up front so that configuration
//! errors surface during bootstrap rather than on first use.

use crate::api::{Charger, Meter, Vehicle};
use crate::config::{Config, NamedConfig, TypedConfig};
use crate::error::{Result, SeleneError};
use crate::scripting::ScriptRuntime;
use std::collections::HashMap;
use std::sync::Arc;

pub mod demo;
pub mod script;

/// Devices by name
#[derive(Default)]
pub struct DeviceRegistry {
    meters: HashMap<String, Arc<dyn Meter>>,
    chargers: HashMap<String, Arc<dyn Charger>>,
    vehicles: HashMap<String, Arc<dyn Vehicle>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every meter, charger and vehicle declared in `config`
    pub fn from_config(config: &Config, scripts: &ScriptRuntime) -> Result<Self> {
        let mut registry = Self::new();

        for dev in &config.meters {
            let meter = new_meter(&dev.typed(), scripts).map_err(|e| wrap("meter", dev, e))?;
            registry.add_meter(&dev.name, meter)?;
        }
        for dev in &config.chargers {
            let charger =
                new_charger(&dev.typed(), scripts).map_err(|e| wrap("charger", dev, e))?;
            registry.add_charger(&dev.name, charger)?;
        }
        for dev in &config.vehicles {
            let vehicle =
                new_vehicle(&dev.typed(), scripts).map_err(|e| wrap("vehicle", dev, e))?;
            registry.add_vehicle(&dev.name, vehicle)?;
        }

        Ok(registry)
    }

    pub fn add_meter(&mut self, name: &str, meter: Arc<dyn Meter>) -> Result<()> {
        insert_unique(&mut self.meters, "meter", name, meter)
    }

    pub fn add_charger(&mut self, name: &str, charger: Arc<dyn Charger>) -> Result<()> {
        insert_unique(&mut self.chargers, "charger", name, charger)
    }

    pub fn add_vehicle(&mut self, name: &str, vehicle: Arc<dyn Vehicle>) -> Result<()> {
        insert_unique(&mut self.vehicles, "vehicle", name, vehicle)
    }

    pub fn meter(&self, name: &str) -> Result<Arc<dyn Meter>> {
        lookup(&self.meters, "meter", name)
    }

    pub fn charger(&self, name: &str) -> Result<Arc<dyn Charger>> {
        lookup(&self.chargers, "charger", name)
    }

    pub fn vehicle(&self, name: &str) -> Result<Arc<dyn Vehicle>> {
        lookup(&self.vehicles, "vehicle", name)
    }
}

fn wrap(section: &str, dev: &NamedConfig, err: SeleneError) -> SeleneError {
    err.context(format!("{} {}", section, dev.name))
}

fn insert_unique<T: ?Sized>(
    map: &mut HashMap<String, Arc<T>>,
    section: &str,
    name: &str,
    device: Arc<T>,
) -> Result<()> {
    if map.contains_key(name) {
        return Err(SeleneError::config(format!(
            "duplicate {} name: {}",
            section, name
        )));
    }
    map.insert(name.to_string(), device);
    Ok(())
}

fn lookup<T: ?Sized>(map: &HashMap<String, Arc<T>>, section: &str, name: &str) -> Result<Arc<T>> {
    map.get(name)
        .cloned()
        .ok_or_else(|| SeleneError::config(format!("{} not found: {}", section, name)))
}

fn new_meter(cfg: &TypedConfig, scripts: &ScriptRuntime) -> Result<Arc<dyn Meter>> {
    match cfg.kind.to_lowercase().as_str() {
        "demo" => Ok(Arc::new(demo::DemoMeter::from_config(cfg)?)),
        "script" => Ok(Arc::new(script::ScriptMeter::from_config(cfg, scripts)?)),
        other => Err(SeleneError::config(format!("unknown meter type: {}", other))),
    }
}

fn new_charger(cfg: &TypedConfig, scripts: &ScriptRuntime) -> Result<Arc<dyn Charger>> {
    match cfg.kind.to_lowercase().as_str() {
        "demo" => Ok(Arc::new(demo::DemoCharger::from_config(cfg)?)),
        "script" => Ok(Arc::new(script::ScriptCharger::from_config(cfg, scripts)?)),
        other => Err(SeleneError::config(format!("unknown charger type: {}", other))),
    }
}

fn new_vehicle(cfg: &TypedConfig, scripts: &ScriptRuntime) -> Result<Arc<dyn Vehicle>> {
    match cfg.kind.to_lowercase().as_str() {
        "demo" => Ok(Arc::new(demo::DemoVehicle::from_config(cfg)?)),
        "script" => Ok(Arc::new(script::ScriptVehicle::from_config(cfg, scripts)?)),
        other => Err(SeleneError::config(format!("unknown vehicle type: {}", other))),
    }
}
