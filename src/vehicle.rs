//! Vehicle API integrations for Selene
//!
//! Vehicles are consumed through [`crate::api::Vehicle`]. Provider-specific
//! account plumbing (currently the VW token service) lives in submodules.

pub mod vw;

pub use vw::VwTokenRefresher;
