pub mod ha_interface;

use crate::config::MqttConfig;
use async_trait::async_trait;
use log::{debug, error, info};
use rumqttc::{AsyncClient, ClientError, ConnectionError, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum MqttError {
    #[error("Connection to {host}:{port} failed: {source}")]
    Connect { host: String, port: u16, source: ConnectionError },
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Publishing to {topic} failed: {source}")]
    Client { topic: String, source: ClientError },
}

/// Delivers one payload to the broker, at most once and retained.
///
/// Implementations must not wait for the broker, a message that cannot be
/// queued is reported as an error and dropped.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), PublishError>;
}

pub fn state_topic(base: &str, address: &str) -> String {
    return format!("{base}/{address}/state");
}

pub fn error_topic(base: &str, address: &str) -> String {
    return format!("{base}/{address}/error");
}

/// Pending requests kept while the broker is unreachable.
const REQUEST_QUEUE_SIZE: usize = 10;

pub struct MqttPublisher {
    client: AsyncClient,
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), PublishError> {
        /* The request queue fills up while the broker is unreachable */
        self.client.try_publish(topic, QoS::AtMostOnce, true, payload)
            .map_err(|e| PublishError::Client { topic: topic.to_string(), source: e })?;
        debug!("Published to {topic}");
        return Ok(());
    }
}

pub struct MqttManager {}

impl MqttManager {
    /// Connects to the broker and keeps the event loop running in its own task.
    ///
    /// Only the first connection attempt is fatal, later errors are logged and
    /// rumqttc reconnects on the next poll.
    pub async fn connect(config: &MqttConfig) -> Result<(MqttPublisher, JoinHandle<()>), MqttError> {
        info!("MQTT connection to {}:{} starting up", config.host, config.port);

        let mut mqttoptions = MqttOptions::new(config.client_name.clone(), config.host.clone(), config.port);
        mqttoptions.set_keep_alive(Duration::from_secs(60));
        if !config.user.is_empty() {
            mqttoptions.set_credentials(config.user.clone(), config.pass.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, REQUEST_QUEUE_SIZE);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to MQTT broker {}:{}", config.host, config.port);
                    break;
                },
                Ok(_) => {},
                Err(e) => {
                    return Err(MqttError::Connect { host: config.host.clone(), port: config.port, source: e });
                }
            }
        }

        let handle = tokio::spawn(async move {
            info!("MQTT Eventloop started");
            let mut last_error = String::new();
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Reconnected to MQTT broker");
                        last_error.clear();
                    },
                    Ok(_) => {},
                    Err(e) => {
                        /* Only log changes, the broker may be gone for a long time */
                        if e.to_string() != last_error {
                            error!("Error in MQTT {:?}, reconnecting", e);
                            last_error = e.to_string();
                        }
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        return Ok((MqttPublisher { client }, handle));
    }
}
