//! Latest-value cache of the telemetry stream
//!
//! Shared between the notification hub (template values) and the HEMS
//! adapter (device status). Values are keyed by load point and field name.

use crate::pipe::{Filter, Sample};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheEntry {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

type Key = (Option<usize>, String);

#[derive(Debug, Clone, Default)]
pub struct Cache {
    inner: Arc<RwLock<HashMap<Key, CacheEntry>>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, sample: &Sample) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(
                (sample.loadpoint, sample.key.clone()),
                CacheEntry {
                    value: sample.value,
                    timestamp: sample.timestamp,
                },
            );
        }
    }

    /// Exact lookup
    pub fn get(&self, loadpoint: Option<usize>, key: &str) -> Option<CacheEntry> {
        self.inner
            .read()
            .ok()?
            .get(&(loadpoint, key.to_string()))
            .copied()
    }

    /// Load point value if present, else the site-wide value
    pub fn lookup(&self, loadpoint: Option<usize>, key: &str) -> Option<f64> {
        loadpoint
            .and_then(|lp| self.get(Some(lp), key))
            .or_else(|| self.get(None, key))
            .map(|e| e.value)
    }

    /// All values visible from a load point: site-wide ones overlaid with its own
    pub fn values(&self, loadpoint: Option<usize>) -> HashMap<String, f64> {
        let Ok(map) = self.inner.read() else {
            return HashMap::new();
        };

        let mut res: HashMap<String, f64> = map
            .iter()
            .filter(|((lp, _), _)| lp.is_none())
            .map(|((_, k), e)| (k.clone(), e.value))
            .collect();

        if loadpoint.is_some() {
            res.extend(
                map.iter()
                    .filter(|((lp, _), _)| *lp == loadpoint)
                    .map(|((_, k), e)| (k.clone(), e.value)),
            );
        }
        res
    }
}

/// Records every sample and lets it through
impl Filter for Cache {
    fn accept(&mut self, sample: &Sample) -> bool {
        self.add(sample);
        true
    }
}
