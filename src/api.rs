//! Capability interfaces of the physical devices a site is built from
//!
//! Chargers, meters and vehicles are external collaborators. The runtime
//! only talks to them through these traits; optional capabilities are
//! exposed as `Option<&dyn Capability>` accessors so callers can query them
//! without inspecting concrete types.

use crate::error::{Result, SeleneError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// IEC 61851 charge status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargeStatus {
    /// No vehicle connected
    A,
    /// Vehicle connected, not charging
    B,
    /// Vehicle charging
    C,
    /// Charger fault
    F,
}

impl ChargeStatus {
    pub fn connected(self) -> bool {
        matches!(self, ChargeStatus::B | ChargeStatus::C)
    }

    pub fn charging(self) -> bool {
        self == ChargeStatus::C
    }
}

impl FromStr for ChargeStatus {
    type Err = SeleneError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(ChargeStatus::A),
            "B" => Ok(ChargeStatus::B),
            "C" | "D" => Ok(ChargeStatus::C),
            "E" | "F" => Ok(ChargeStatus::F),
            other => Err(SeleneError::device(format!("invalid charge status: {}", other))),
        }
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChargeStatus::A => "A",
            ChargeStatus::B => "B",
            ChargeStatus::C => "C",
            ChargeStatus::F => "F",
        };
        f.write_str(s)
    }
}

/// Battery state of charge capability
#[async_trait::async_trait]
pub trait Battery: Send + Sync {
    /// State of charge in percent
    async fn soc(&self) -> Result<f64>;
}

/// Charging equipment
#[async_trait::async_trait]
pub trait Charger: Send + Sync {
    async fn status(&self) -> Result<ChargeStatus>;

    /// Some chargers read the vehicle's state of charge over the cable
    fn battery(&self) -> Option<&dyn Battery> {
        None
    }
}

/// Power meter
#[async_trait::async_trait]
pub trait Meter: Send + Sync {
    /// Current power in W; negative values mean export
    async fn current_power(&self) -> Result<f64>;
}

/// Vehicle
pub trait Vehicle: Send + Sync {
    fn title(&self) -> &str;

    /// Battery capacity in kWh
    fn capacity(&self) -> f64;

    fn battery(&self) -> Option<&dyn Battery> {
        None
    }
}
