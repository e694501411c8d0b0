use std::collections::BTreeMap;
use std::num::ParseFloatError;

use chrono::Local;
use thiserror::Error;
use tracing::{debug, info, warn};

use tempswitch_common::{
    parse_snapshot, ConfigError, ConfigSnapshot, Hysteresis, TOPIC_CONFIG, TOPIC_HEARTBEAT,
    TOPIC_SUBSCRIPTIONS,
};

use crate::store::{ConfigStore, StoreError};
use crate::transport::{Inbound, Transport, TransportError};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("temperature payload {payload:?} on {topic} is not numeric: {source}")]
    UnparsableTemperature {
        topic: String,
        payload: String,
        source: ParseFloatError,
    },
    #[error("temperature reading {value} on {topic} is not finite")]
    NonFiniteTemperature { topic: String, value: f64 },
    #[error("configuration update rejected: {0}")]
    BadConfig(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Owns all mutable control state: the active configuration snapshot, one
/// hysteresis controller per configured sensor topic, and the transport and
/// store seams. Everything runs on the single cooperative loop; there is no
/// shared-state concurrency here.
pub struct SwitchAgent<T: Transport> {
    transport: T,
    store: ConfigStore,
    config: ConfigSnapshot,
    controllers: BTreeMap<String, Hysteresis>,
}

impl<T: Transport> SwitchAgent<T> {
    pub fn new(transport: T, store: ConfigStore) -> Self {
        Self {
            transport,
            store,
            config: ConfigSnapshot::new(),
            controllers: BTreeMap::new(),
        }
    }

    /// Arms the agent: config-topic subscription plus the initial snapshot.
    pub fn setup(&mut self, initial: ConfigSnapshot) -> Result<(), TransportError> {
        self.transport.subscribe(TOPIC_CONFIG)?;
        self.apply_config(initial);
        Ok(())
    }

    /// Replaces the active snapshot wholesale and reconciles subscriptions
    /// and controllers against it. Control points that disappeared are torn
    /// down; every remaining point gets a freshly armed controller, so a
    /// configuration update always resets in-flight decision state.
    pub fn apply_config(&mut self, snapshot: ConfigSnapshot) {
        for topic in self.config.keys() {
            if !snapshot.contains_key(topic) {
                info!("control point {topic} removed; dropping subscription");
                if let Err(err) = self.transport.unsubscribe(topic) {
                    warn!("failed to unsubscribe {topic}: {err}");
                }
            }
        }
        self.controllers
            .retain(|topic, _| snapshot.contains_key(topic));

        for (topic, point) in &snapshot {
            if let Err(err) = self.transport.subscribe(topic) {
                warn!("failed to subscribe {topic}: {err}");
            }
            self.controllers.insert(
                topic.clone(),
                Hysteresis::new(point.hys_low_temp, point.hys_high_temp),
            );
        }

        info!("configuration applied: {} control point(s)", snapshot.len());
        self.config = snapshot;
    }

    /// Drains the transport and routes every inbound message. An error in
    /// one message never stops the rest of the batch.
    pub fn poll(&mut self) -> Result<(), TransportError> {
        for message in self.transport.poll()? {
            if let Err(err) = self.dispatch(&message) {
                warn!("dropping message on {}: {err}", message.topic);
            }
        }
        Ok(())
    }

    /// Operator-visible liveness: wall-clock heartbeat plus the catalog of
    /// currently subscribed topics. The scheduler only logs a failure here;
    /// it never touches the control path.
    pub fn keep_alive(&mut self) -> Result<(), TransportError> {
        let timestamp = Local::now().format("%d.%m.%Y %H:%M:%S").to_string();
        self.transport.publish(TOPIC_HEARTBEAT, &timestamp)?;

        let catalog: BTreeMap<String, bool> = self
            .transport
            .subscriptions()
            .iter()
            .map(|topic| (topic.clone(), true))
            .collect();
        match serde_json::to_string(&catalog) {
            Ok(encoded) => self.transport.publish(TOPIC_SUBSCRIPTIONS, &encoded)?,
            Err(err) => warn!("failed to encode subscription catalog: {err}"),
        }
        Ok(())
    }

    /// Scheduler duty: reconverge the persisted file with the live snapshot.
    pub fn refresh_config(&mut self) -> Result<(), StoreError> {
        self.store.save(&self.config)
    }

    fn dispatch(&mut self, message: &Inbound) -> Result<(), ProcessError> {
        if message.topic == TOPIC_CONFIG {
            self.on_config_update(&message.payload)
        } else {
            self.on_sensor_reading(&message.topic, &message.payload)
        }
    }

    fn on_config_update(&mut self, payload: &str) -> Result<(), ProcessError> {
        let (snapshot, rejected) = parse_snapshot(payload)?;
        for entry in &rejected {
            warn!(
                "skipping control point {}: {}",
                entry.sensor_topic, entry.reason
            );
        }
        if let Err(err) = self.store.save(&snapshot) {
            warn!("failed to persist configuration update: {err}");
        }
        self.apply_config(snapshot);
        Ok(())
    }

    fn on_sensor_reading(&mut self, topic: &str, payload: &str) -> Result<(), ProcessError> {
        let Some(point) = self.config.get(topic) else {
            // Deliveries may trail a control point's removal.
            debug!("ignoring reading on unconfigured topic {topic}");
            return Ok(());
        };

        let temperature: f64 =
            payload
                .trim()
                .parse()
                .map_err(|source| ProcessError::UnparsableTemperature {
                    topic: topic.to_string(),
                    payload: payload.to_string(),
                    source,
                })?;
        if !temperature.is_finite() {
            return Err(ProcessError::NonFiniteTemperature {
                topic: topic.to_string(),
                value: temperature,
            });
        }

        let demand = match self.controllers.get_mut(topic) {
            Some(controller) => controller.set_value(temperature),
            None => {
                // Registry fell out of step with the snapshot; re-arm it.
                warn!("no controller armed for {topic}; rearming from the active config");
                self.controllers
                    .entry(topic.to_string())
                    .or_insert_with(|| Hysteresis::new(point.hys_low_temp, point.hys_high_temp))
                    .set_value(temperature)
            }
        };

        let command = if demand {
            &point.switch_on
        } else {
            &point.switch_off
        };
        debug!(
            "{}: {temperature} -> {command} on {}",
            point.subject, point.switch_topic_control
        );
        self.transport.publish(&point.switch_topic_control, command)?;
        Ok(())
    }
}
