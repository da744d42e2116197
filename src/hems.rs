//! Home energy management system integrations
//!
//! A HEMS adapter exposes the site's load points to an external energy
//! manager. Adapters are selected by `hems.type`; an empty type disables
//! the integration.

use crate::cache::Cache;
use crate::config::TypedConfig;
use crate::core::Site;
use crate::error::{Result, SeleneError};
use crate::shutdown::ShutdownSignal;
use std::net::SocketAddr;

#[cfg(feature = "semp")]
pub mod semp;

#[async_trait::async_trait]
pub trait Hems: Send + Sync {
    fn name(&self) -> &'static str;

    /// Bind and serve in the background until shutdown
    async fn start(&self, shutdown: ShutdownSignal) -> Result<SocketAddr>;
}

/// Build the adapter selected by `cfg.kind`, `None` when disabled
#[cfg_attr(not(feature = "semp"), allow(unused_variables))]
pub fn new_from_config(cfg: &TypedConfig, site: &Site, cache: Cache) -> Result<Option<Box<dyn Hems>>> {
    match cfg.kind.to_lowercase().as_str() {
        "" => Ok(None),
        #[cfg(feature = "semp")]
        "semp" => Ok(Some(Box::new(semp::Semp::from_config(cfg, site, cache)?))),
        other => Err(SeleneError::config(format!("unknown type: {}", other))),
    }
}
