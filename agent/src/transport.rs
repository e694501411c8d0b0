use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use rumqttc::{Client, ClientError, Connection, Event, Incoming, MqttOptions, QoS};
use thiserror::Error;
use tracing::{info, warn};

const POLL_WINDOW: Duration = Duration::from_millis(100);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_RETRY_PAUSE: Duration = Duration::from_millis(500);
const MAX_PAYLOAD_BYTES: usize = 512;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("mqtt client request failed: {0}")]
    Client(#[from] ClientError),
    #[error("broker did not acknowledge the connection in time")]
    ConnectTimeout,
}

/// One message received from the bus since the previous poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub topic: String,
    pub payload: String,
}

/// Publish/subscribe seam the agent runs against. `poll` is bounded in time
/// and returns messages in delivery order; `publish` is fire-and-forget and
/// must not block the caller.
pub trait Transport {
    fn connect(&mut self) -> Result<(), TransportError>;
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;
    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError>;
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), TransportError>;
    fn poll(&mut self) -> Result<Vec<Inbound>, TransportError>;
    fn subscriptions(&self) -> &BTreeSet<String>;
}

pub struct MqttTransport {
    client: Client,
    connection: Connection,
    subscribed: BTreeSet<String>,
}

impl MqttTransport {
    pub fn from_env() -> Self {
        let host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "koserver.iot".to_string());
        let port = std::env::var("MQTT_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(1883);

        let mut options = MqttOptions::new("tempswitch-agent", host, port);
        if let Ok(user) = std::env::var("MQTT_USER") {
            let pass = std::env::var("MQTT_PASS").unwrap_or_default();
            options.set_credentials(user, pass);
        }

        Self::new(options)
    }

    pub fn new(options: MqttOptions) -> Self {
        let (client, connection) = Client::new(options, 64);
        Self {
            client,
            connection,
            subscribed: BTreeSet::new(),
        }
    }

    fn handle_event(&self, event: Event, inbound: &mut Vec<Inbound>) {
        match event {
            Event::Incoming(Incoming::Publish(message)) => {
                if message.payload.len() > MAX_PAYLOAD_BYTES {
                    warn!(
                        "dropping oversized payload on {} ({} bytes)",
                        message.topic,
                        message.payload.len()
                    );
                    return;
                }
                match String::from_utf8(message.payload.to_vec()) {
                    Ok(payload) => inbound.push(Inbound {
                        topic: message.topic,
                        payload,
                    }),
                    Err(_) => warn!("dropping non-utf8 payload on {}", message.topic),
                }
            }
            Event::Incoming(Incoming::ConnAck(_)) => {
                info!("mqtt connected");
                // Sessions start clean on reconnect; restore the catalog.
                for topic in &self.subscribed {
                    if let Err(err) = self.client.subscribe(topic.as_str(), QoS::AtMostOnce) {
                        warn!("failed to restore subscription to {topic}: {err}");
                    }
                }
            }
            _ => {}
        }
    }
}

impl Transport for MqttTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        let deadline = Instant::now() + CONNECT_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::ConnectTimeout);
            }
            match self.connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Incoming::ConnAck(_)))) => {
                    info!("mqtt connected");
                    return Ok(());
                }
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    warn!("mqtt connect attempt failed: {err}");
                    std::thread::sleep(CONNECT_RETRY_PAUSE);
                }
                Err(_) => return Err(TransportError::ConnectTimeout),
            }
        }
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        // Re-subscribing an armed topic must not duplicate delivery.
        if self.subscribed.contains(topic) {
            return Ok(());
        }
        self.client.subscribe(topic, QoS::AtMostOnce)?;
        self.subscribed.insert(topic.to_string());
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if self.subscribed.remove(topic) {
            self.client.unsubscribe(topic)?;
        }
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), TransportError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)?;
        Ok(())
    }

    fn poll(&mut self) -> Result<Vec<Inbound>, TransportError> {
        let mut inbound = Vec::new();
        let deadline = Instant::now() + POLL_WINDOW;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.connection.recv_timeout(remaining) {
                Ok(Ok(event)) => self.handle_event(event, &mut inbound),
                Ok(Err(err)) => {
                    // The event loop reconnects with backoff on the next poll.
                    warn!("mqtt poll error: {err}");
                    break;
                }
                Err(_) => break,
            }
        }
        Ok(inbound)
    }

    fn subscriptions(&self) -> &BTreeSet<String> {
        &self.subscribed
    }
}
