//! Birth manifest.
//!
//! Published retained on `P/BIRTH` together with `P/STATE = ALIVE`, so that
//! other participants on the bus can discover which topics this application
//! reads and writes.

use serde::Serialize;

use crate::error::Result;
use crate::topic::TopicScheme;

/// Whether the application publishes or subscribes to a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Pub,
    Sub,
}

/// Payload kind carried on a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Null,
    Numeric,
    Text,
}

/// One entry of the manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicDescriptor {
    pub topic: String,
    pub modes: Vec<Mode>,
    #[serde(rename = "type")]
    pub kind: ValueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
}

impl TopicDescriptor {
    fn new(topic: String, mode: Mode, kind: ValueKind) -> Self {
        Self {
            topic,
            modes: vec![mode],
            kind,
            quantity: None,
            unit: None,
        }
    }

    fn temperature(mut self) -> Self {
        self.quantity = Some("temperature");
        self.unit = Some("degree_celsius");
        self
    }
}

/// List the topics used by an application with the given layout.
pub fn manifest(topics: &TopicScheme, threshold_property: &str) -> Vec<TopicDescriptor> {
    vec![
        TopicDescriptor::new(topics.state(), Mode::Pub, ValueKind::Text),
        TopicDescriptor::new(topics.command("rebirth"), Mode::Sub, ValueKind::Null),
        TopicDescriptor::new(topics.command("shutdown"), Mode::Sub, ValueKind::Text),
        TopicDescriptor::new(
            topics.property(threshold_property),
            Mode::Pub,
            ValueKind::Numeric,
        )
        .temperature(),
        TopicDescriptor::new(
            topics.property_set(threshold_property),
            Mode::Sub,
            ValueKind::Numeric,
        )
        .temperature(),
        TopicDescriptor::new(topics.property("alarms/#"), Mode::Pub, ValueKind::Text),
        TopicDescriptor::new(
            topics.sensors().filter().to_string(),
            Mode::Sub,
            ValueKind::Numeric,
        )
        .temperature(),
    ]
}

/// Render the manifest as pretty-printed JSON.
pub fn encode_manifest(topics: &TopicScheme, threshold_property: &str) -> Result<String> {
    Ok(serde_json::to_string_pretty(&manifest(
        topics,
        threshold_property,
    ))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::SensorScheme;

    #[test]
    fn test_manifest_lists_threshold_topics() {
        let topics = TopicScheme::new("watchdog", SensorScheme::Property);
        let entries = manifest(&topics, "cpu-threshold");

        let set = entries
            .iter()
            .find(|e| e.topic == "watchdog/property/cpu-threshold/set")
            .unwrap();
        assert_eq!(set.modes, vec![Mode::Sub]);
        assert_eq!(set.unit, Some("degree_celsius"));

        assert!(entries
            .iter()
            .any(|e| e.topic == "+/property/temperature/cpu/#" && e.modes == vec![Mode::Sub]));
    }

    #[test]
    fn test_encode_manifest_json_shape() {
        let topics = TopicScheme::new("watchdog", SensorScheme::Property);
        let json = encode_manifest(&topics, "threshold").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let first = &value[0];
        assert_eq!(first["topic"], "watchdog/STATE");
        assert_eq!(first["modes"][0], "pub");
        assert_eq!(first["type"], "text");
        assert!(first.get("unit").is_none());
        assert_eq!(value.as_array().unwrap().len(), 7);
    }
}
