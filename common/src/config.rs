use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One configured sensor-to-actuator binding, keyed by its sensor topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPointConfig {
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "SwitchTopicControl")]
    pub switch_topic_control: String,
    #[serde(rename = "SwitchTopicStatus")]
    pub switch_topic_status: String,
    #[serde(rename = "SwitchOn")]
    pub switch_on: String,
    #[serde(rename = "SwitchOff")]
    pub switch_off: String,
    #[serde(rename = "HysLowTemp")]
    pub hys_low_temp: f64,
    #[serde(rename = "HysHighTemp")]
    pub hys_high_temp: f64,
}

/// The authoritative configuration at a point in time. Replaced wholesale on
/// every update, never mutated in place.
pub type ConfigSnapshot = BTreeMap<String, ControlPointConfig>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration payload is not a JSON object: {0}")]
    Payload(#[source] serde_json::Error),
    #[error("control point entry is malformed: {0}")]
    Entry(#[source] serde_json::Error),
    #[error("HysLowTemp {low} and HysHighTemp {high} must both be finite")]
    NonFiniteBand { low: f64, high: f64 },
    #[error("HysHighTemp {high} lies below HysLowTemp {low}")]
    InvertedBand { low: f64, high: f64 },
    #[error("HysLowTemp {0} must not be negative")]
    NegativeLow(f64),
    #[error("SwitchTopicControl must not be empty")]
    EmptyControlTopic,
}

/// A config entry that failed validation, with the reason it was skipped.
#[derive(Debug)]
pub struct RejectedEntry {
    pub sensor_topic: String,
    pub reason: ConfigError,
}

impl ControlPointConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.hys_low_temp.is_finite() || !self.hys_high_temp.is_finite() {
            return Err(ConfigError::NonFiniteBand {
                low: self.hys_low_temp,
                high: self.hys_high_temp,
            });
        }
        if self.hys_low_temp < 0.0 {
            return Err(ConfigError::NegativeLow(self.hys_low_temp));
        }
        if self.hys_high_temp < self.hys_low_temp {
            return Err(ConfigError::InvertedBand {
                low: self.hys_low_temp,
                high: self.hys_high_temp,
            });
        }
        if self.switch_topic_control.is_empty() {
            return Err(ConfigError::EmptyControlTopic);
        }
        Ok(())
    }
}

/// Parses a JSON configuration mapping, validating each control point on its
/// own. A malformed entry never poisons its siblings; it comes back in the
/// rejected list so the caller can log it.
pub fn parse_snapshot(raw: &str) -> Result<(ConfigSnapshot, Vec<RejectedEntry>), ConfigError> {
    let entries: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(raw).map_err(ConfigError::Payload)?;

    let mut snapshot = ConfigSnapshot::new();
    let mut rejected = Vec::new();

    for (sensor_topic, value) in entries {
        let point = match serde_json::from_value::<ControlPointConfig>(value) {
            Ok(point) => point,
            Err(err) => {
                rejected.push(RejectedEntry {
                    sensor_topic,
                    reason: ConfigError::Entry(err),
                });
                continue;
            }
        };
        if let Err(reason) = point.validate() {
            rejected.push(RejectedEntry {
                sensor_topic,
                reason,
            });
            continue;
        }
        snapshot.insert(sensor_topic, point);
    }

    Ok((snapshot, rejected))
}

/// Built-in binding used until a persisted or remote override arrives.
pub fn default_config() -> ConfigSnapshot {
    let mut snapshot = ConfigSnapshot::new();
    snapshot.insert(
        "/TempSensor1/Temperature".to_string(),
        ControlPointConfig {
            subject: "Gewaechshaus".to_string(),
            switch_topic_control: "cmnd/tasmota_17C3AD/POWER".to_string(),
            switch_topic_status: "stat/tasmota_17C3AD/POWER".to_string(),
            switch_on: "ON".to_string(),
            switch_off: "OFF".to_string(),
            hys_low_temp: 2.0,
            hys_high_temp: 3.0,
        },
    );
    snapshot
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn entry_round_trips_through_wire_keys() {
        let raw = r#"{
            "/TempSensor1/Temperature": {
                "Subject": "Gewaechshaus",
                "SwitchTopicControl": "cmnd/tasmota_17C3AD/POWER",
                "SwitchTopicStatus": "stat/tasmota_17C3AD/POWER",
                "SwitchOn": "ON",
                "SwitchOff": "OFF",
                "HysLowTemp": 2.0,
                "HysHighTemp": 3.0
            }
        }"#;

        let (snapshot, rejected) = parse_snapshot(raw).unwrap();
        assert!(rejected.is_empty());
        assert_eq!(snapshot, default_config());

        let encoded = serde_json::to_string(&snapshot).unwrap();
        let (reparsed, _) = parse_snapshot(&encoded).unwrap();
        assert_eq!(reparsed, snapshot);
    }

    #[test]
    fn malformed_entries_are_skipped_individually() {
        let raw = r#"{
            "/Sensors/Cellar": {
                "Subject": "Cellar",
                "SwitchTopicControl": "cmnd/cellar/POWER",
                "SwitchTopicStatus": "stat/cellar/POWER",
                "SwitchOn": "ON",
                "SwitchOff": "OFF",
                "HysLowTemp": 4.0,
                "HysHighTemp": 6.0
            },
            "/Sensors/MissingField": {
                "Subject": "NoCommands",
                "SwitchTopicControl": "cmnd/x/POWER",
                "SwitchTopicStatus": "stat/x/POWER",
                "HysLowTemp": 1.0,
                "HysHighTemp": 2.0
            },
            "/Sensors/TextThreshold": {
                "Subject": "Bad",
                "SwitchTopicControl": "cmnd/y/POWER",
                "SwitchTopicStatus": "stat/y/POWER",
                "SwitchOn": "ON",
                "SwitchOff": "OFF",
                "HysLowTemp": "cold",
                "HysHighTemp": 2.0
            }
        }"#;

        let (snapshot, rejected) = parse_snapshot(raw).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("/Sensors/Cellar"));
        assert_eq!(rejected.len(), 2);
    }

    #[test]
    fn inverted_band_is_rejected() {
        let mut point = default_config().remove("/TempSensor1/Temperature").unwrap();
        point.hys_low_temp = 5.0;
        point.hys_high_temp = 3.0;

        assert!(matches!(
            point.validate(),
            Err(ConfigError::InvertedBand { .. })
        ));
    }

    #[test]
    fn collapsed_band_is_allowed() {
        let mut point = default_config().remove("/TempSensor1/Temperature").unwrap();
        point.hys_low_temp = 3.0;
        point.hys_high_temp = 3.0;

        assert!(point.validate().is_ok());
    }

    #[test]
    fn negative_low_is_rejected() {
        let mut point = default_config().remove("/TempSensor1/Temperature").unwrap();
        point.hys_low_temp = -1.0;

        assert!(matches!(point.validate(), Err(ConfigError::NegativeLow(_))));
    }

    #[test]
    fn non_object_payload_is_an_error() {
        assert!(matches!(
            parse_snapshot("[1, 2, 3]"),
            Err(ConfigError::Payload(_))
        ));
        assert!(matches!(
            parse_snapshot("not json"),
            Err(ConfigError::Payload(_))
        ));
    }
}
