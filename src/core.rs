//! Site and load point assembly
//!
//! A [`Site`] owns one or more [`LoadPoint`]s. Both are built from
//! configuration against a [`crate::devices::DeviceRegistry`]. The charging
//! control algorithm is not part of this crate; load points only measure
//! and publish.

mod charge_progress;
mod loadpoint;
mod site;

pub use charge_progress::ChargeProgress;
pub use loadpoint::{ChargeMode, LoadPoint, LoadPointConfig, NOMINAL_VOLTAGE};
pub use site::Site;
