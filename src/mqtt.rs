//! MQTT broker connection
//!
//! One client is created during bootstrap and shared through cheap
//! [`MqttHandle`] clones. The rumqttc event loop is polled by a background
//! task for the lifetime of the process.

use crate::config::MqttConfig;
use crate::error::{Result, SeleneError};
use crate::logging::get_logger;
use crate::pipe::Sample;
use crate::shutdown::ShutdownSignal;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;

pub const DEFAULT_PORT: u16 = 1883;

/// All publications use at-least-once delivery
pub const QOS: QoS = QoS::AtLeastOnce;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CAPACITY: usize = 64;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Random client identifier
pub fn client_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("selene-{}", &id[..8])
}

/// Split `[tcp://|mqtt://]host[:port]` into host and port
pub fn parse_broker(broker: &str) -> Result<(String, u16)> {
    let broker = broker.trim();
    let address = broker
        .strip_prefix("tcp://")
        .or_else(|| broker.strip_prefix("mqtt://"))
        .unwrap_or(broker)
        .trim_end_matches('/');

    if address.contains("://") {
        return Err(SeleneError::config(format!(
            "unsupported broker scheme: {}",
            broker
        )));
    }

    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| SeleneError::config(format!("invalid broker port: {}", port)))?;
            (host, port)
        }
        None => (address, DEFAULT_PORT),
    };

    if host.is_empty() {
        return Err(SeleneError::config(format!("invalid broker: {}", broker)));
    }
    Ok((host.to_string(), port))
}

/// Shared handle to the connected client
#[derive(Clone)]
pub struct MqttHandle {
    client: AsyncClient,
    client_id: String,
}

impl std::fmt::Debug for MqttHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttHandle")
            .field("client_id", &self.client_id)
            .finish()
    }
}

impl MqttHandle {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
        retained: bool,
    ) -> Result<()> {
        self.client
            .publish(topic, QOS, retained, payload)
            .await
            .map_err(|e| SeleneError::mqtt(format!("publish {}: {}", topic, e)))
    }
}

/// Topic of a sample below `root`
pub fn topic(root: &str, sample: &Sample) -> String {
    match sample.loadpoint {
        Some(lp) => format!("{}/loadpoints/{}/{}", root, lp + 1, sample.key),
        None => format!("{}/site/{}", root, sample.key),
    }
}

/// Publish samples as retained messages until shutdown
pub async fn run_publisher(
    handle: MqttHandle,
    root: String,
    mut input: mpsc::Receiver<Sample>,
    shutdown: ShutdownSignal,
) {
    let logger = get_logger("mqtt");
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            sample = input.recv() => {
                let Some(sample) = sample else { break };
                let topic = topic(&root, &sample);
                if let Err(e) = handle.publish(&topic, sample.value.to_string(), true).await {
                    logger.warn(&e.to_string());
                }
            }
        }
    }
}

/// Connect to the configured broker and start the network loop
pub async fn configure_mqtt(config: &MqttConfig, shutdown: ShutdownSignal) -> Result<MqttHandle> {
    connect(config, shutdown)
        .await
        .map_err(|e| e.context("failed configuring mqtt"))
}

async fn connect(config: &MqttConfig, shutdown: ShutdownSignal) -> Result<MqttHandle> {
    let logger = get_logger("mqtt");
    let (host, port) = parse_broker(&config.broker)?;
    let client_id = client_id();

    let mut options = MqttOptions::new(client_id.clone(), host.clone(), port);
    options.set_keep_alive(KEEP_ALIVE);
    if !config.user.is_empty() {
        options.set_credentials(config.user.clone(), config.password.clone());
    }

    let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

    tokio::time::timeout(CONNECT_TIMEOUT, wait_for_connack(&mut eventloop))
        .await
        .map_err(|_| {
            SeleneError::timeout(format!("no response from {}:{}", host, port))
        })??;

    logger.info(&format!("connected to {}:{} as {}", host, port, client_id));

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    logger.debug("network loop stopped");
                    break;
                }
                event = eventloop.poll() => {
                    if let Err(e) = event {
                        logger.warn(&format!("connection error: {}", e));
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        }
    });

    Ok(MqttHandle { client, client_id })
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(SeleneError::mqtt(format!(
                        "connection refused: {:?}",
                        ack.code
                    )))
                };
            }
            Ok(_) => {}
            Err(e) => return Err(SeleneError::mqtt(e.to_string())),
        }
    }
}
