//! Telemetry sample stream and the filters applied before persistence
//!
//! Samples flow through bounded channels. Each filter stage runs as its own
//! task that reads from an input channel and forwards accepted samples to a
//! fresh output channel, so stages can be chained in any order.
//!
//! Filters measure time on the sample timestamps, not on the wall clock.

use crate::shutdown::ShutdownSignal;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;

/// Buffer size of every stage's output channel
pub const CHANNEL_CAPACITY: usize = 64;

/// One measured value
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Index of the originating load point; `None` for site-wide values
    pub loadpoint: Option<usize>,
    pub key: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn new(loadpoint: Option<usize>, key: &str, value: f64) -> Self {
        Self::at(loadpoint, key, value, Utc::now())
    }

    pub fn at(loadpoint: Option<usize>, key: &str, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            loadpoint,
            key: key.to_string(),
            value,
            timestamp,
        }
    }

    fn source(&self) -> (Option<usize>, String) {
        (self.loadpoint, self.key.clone())
    }
}

/// A stream stage deciding which samples pass
pub trait Filter: Send + 'static {
    fn accept(&mut self, sample: &Sample) -> bool;
}

/// True if `later` happened less than `window` after `earlier`.
/// Samples arriving out of order count as inside the window.
fn within(window: Duration, earlier: DateTime<Utc>, later: DateTime<Utc>) -> bool {
    (later - earlier)
        .to_std()
        .map(|elapsed| elapsed < window)
        .unwrap_or(true)
}

/// Drops repeated values of selected fields within a time window
#[derive(Debug)]
pub struct Deduplicator {
    window: Duration,
    fields: HashSet<String>,
    last: HashMap<(Option<usize>, String), (f64, DateTime<Utc>)>,
}

impl Deduplicator {
    pub fn new(window: Duration, fields: &[&str]) -> Self {
        Self {
            window,
            fields: fields.iter().map(|f| f.to_string()).collect(),
            last: HashMap::new(),
        }
    }
}

impl Filter for Deduplicator {
    fn accept(&mut self, sample: &Sample) -> bool {
        if !self.fields.contains(&sample.key) {
            return true;
        }

        let source = sample.source();
        if let Some((value, at)) = self.last.get(&source) {
            if *value == sample.value && within(self.window, *at, sample.timestamp) {
                return false;
            }
        }

        self.last.insert(source, (sample.value, sample.timestamp));
        true
    }
}

/// Forwards at most one sample per source and window
#[derive(Debug)]
pub struct Limiter {
    window: Duration,
    last: HashMap<(Option<usize>, String), DateTime<Utc>>,
}

impl Limiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: HashMap::new(),
        }
    }
}

impl Filter for Limiter {
    fn accept(&mut self, sample: &Sample) -> bool {
        let source = sample.source();
        if let Some(at) = self.last.get(&source) {
            if within(self.window, *at, sample.timestamp) {
                return false;
            }
        }

        self.last.insert(source, sample.timestamp);
        true
    }
}

/// Copies every sample into a side channel without slowing the main stream
///
/// Samples are dropped from the side channel when it is full.
#[derive(Debug, Clone)]
pub struct Tee {
    side: mpsc::Sender<Sample>,
}

impl Tee {
    pub fn new(side: mpsc::Sender<Sample>) -> Self {
        Self { side }
    }
}

impl Filter for Tee {
    fn accept(&mut self, sample: &Sample) -> bool {
        let _ = self.side.try_send(sample.clone());
        true
    }
}

/// Run `filter` over `input` in a background task and return its output
pub fn pipe<F: Filter>(
    mut filter: F,
    mut input: mpsc::Receiver<Sample>,
    shutdown: ShutdownSignal,
) -> mpsc::Receiver<Sample> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                sample = input.recv() => {
                    let Some(sample) = sample else { break };
                    if filter.accept(&sample) && tx.send(sample).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    rx
}
