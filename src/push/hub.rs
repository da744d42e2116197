use super::{Event, Messenger, render};
use crate::cache::Cache;
use crate::config::EventTemplate;
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::shutdown::ShutdownSignal;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Fans rendered events out to all registered back-ends
pub struct Hub {
    definitions: HashMap<String, EventTemplate>,
    cache: Cache,
    senders: Vec<Box<dyn Messenger>>,
    logger: StructuredLogger,
}

impl Hub {
    pub fn new(definitions: HashMap<String, EventTemplate>, cache: Cache) -> Self {
        Self {
            definitions,
            cache,
            senders: Vec::new(),
            logger: get_logger("push"),
        }
    }

    pub fn add(&mut self, sender: Box<dyn Messenger>) {
        self.senders.push(sender);
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Title and message for an event, `None` if it has no template
    pub fn format(&self, event: &Event) -> Result<Option<(String, String)>> {
        let Some(definition) = self.definitions.get(&event.event) else {
            return Ok(None);
        };

        let values = self.cache.values(event.loadpoint);
        let title = render(&definition.title, &values)?;
        let msg = render(&definition.msg, &values)?;
        Ok(Some((title, msg)))
    }

    async fn dispatch(&self, event: &Event) {
        let (title, msg) = match self.format(event) {
            Ok(Some(rendered)) => rendered,
            Ok(None) => {
                self.logger.debug(&format!("no template for event {}", event.event));
                return;
            }
            Err(e) => {
                self.logger.error(&format!("event {}: {}", event.event, e));
                return;
            }
        };

        for sender in &self.senders {
            if let Err(e) = sender.send(&title, &msg).await {
                self.logger.error(&format!("event {}: {}", event.event, e));
            }
        }
    }

    /// Consume events until the channel closes or shutdown fires
    pub async fn run(self, mut events: mpsc::Receiver<Event>, shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                event = events.recv() => match event {
                    Some(event) => self.dispatch(&event).await,
                    None => break,
                },
            }
        }
        self.logger.debug("hub stopped");
    }
}
