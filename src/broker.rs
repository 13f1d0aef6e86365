//! MQTT side of the bridge.
//!
//! The rumqttc event loop runs in its own task and never touches bridge
//! state: it only raises [`BridgeSignal`]s on the shared [`Signals`], which
//! never waits on the controller.

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;
use crate::error::BrokerError;
use crate::signal::Signals;
use crate::types::{Availability, BridgeSignal, EntityKind};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), BrokerError>;
    async fn subscribe(&self, filter: &str) -> Result<(), BrokerError>;
}

/// Topic layout under the bridge prefix and the discovery prefix.
#[derive(Debug, Clone)]
pub struct Topics {
    base: String,
    discovery: String,
}

impl Topics {
    pub fn new(base: &str, discovery: &str) -> Self {
        Topics {
            base: base.trim_end_matches('/').to_string(),
            discovery: discovery.trim_end_matches('/').to_string(),
        }
    }

    pub fn bridge_state(&self) -> String {
        format!("{}/bridge/state", self.base)
    }

    pub fn device(&self, serial: &str) -> String {
        format!("{}/{serial}", self.base)
    }

    pub fn availability(&self, serial: &str) -> String {
        format!("{}/{serial}/availability", self.base)
    }

    pub fn poll_filter(&self) -> String {
        format!("{}/poll/#", self.base)
    }

    pub fn autoconfig(&self, kind: EntityKind, serial: &str, name: &str) -> String {
        format!("{}/{}/h2m_{serial}/{name}/config", self.discovery, kind.as_str())
    }
}

pub struct MqttBroker {
    client: AsyncClient,
}

impl MqttBroker {
    pub fn new(cfg: &MqttConfig, topics: &Topics) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(&cfg.client_id, &cfg.host, cfg.port);
        options.set_keep_alive(KEEP_ALIVE);
        if let Some(credentials) = &cfg.credentials {
            options.set_credentials(&credentials.username, &credentials.password);
        }
        if cfg.last_will {
            info!(topic = %topics.bridge_state(), "Registering last will to mark the bridge offline");
            options.set_last_will(LastWill::new(
                topics.bridge_state(),
                Availability::Offline.as_str(),
                QoS::AtLeastOnce,
                true,
            ));
        }

        let (client, eventloop) = AsyncClient::new(options, 32);
        (MqttBroker { client }, eventloop)
    }
}

#[async_trait]
impl Broker for MqttBroker {
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), BrokerError> {
        debug!(topic, retain, "publish");
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload.as_bytes().to_vec())
            .await?;
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<(), BrokerError> {
        self.client.subscribe(filter, QoS::AtLeastOnce).await?;
        Ok(())
    }
}

/// Maps a message on the poll command topics to an intent.
pub fn classify_command(topic: &str) -> Option<BridgeSignal> {
    if topic.contains("now") {
        Some(BridgeSignal::PollNow)
    } else if topic.contains("fail") {
        Some(BridgeSignal::ForceReauth)
    } else {
        None
    }
}

/// Drives the MQTT connection. Reconnects are left to rumqttc: polling again
/// after an error starts a new connection attempt.
pub fn spawn_event_loop(mut eventloop: EventLoop, host: String, signals: Arc<Signals>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let signal = match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!(broker = %host, code = ?ack.code, "Connected to MQTT broker");
                    Some(BridgeSignal::Connected)
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    info!(topic = %publish.topic, "Received command");
                    classify_command(&publish.topic)
                }
                Ok(_) => None,
                Err(e) => {
                    warn!(broker = %host, error = %e, "MQTT connection error, retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    None
                }
            };

            if let Some(signal) = signal {
                signals.raise(signal);
            }
        }
    })
}
