//! Topic grammar.
//!
//! Classifies inbound topics into routes and builds the topics this
//! application publishes. All application topics live under the application
//! id `P`:
//!
//! | Purpose        | Topic                          |
//! |----------------|--------------------------------|
//! | Liveness       | `P/STATE`                      |
//! | Birth manifest | `P/BIRTH`                      |
//! | Commands       | `P/command/<name>`             |
//! | Property set   | `P/property/<name>/set`        |
//! | Property echo  | `P/property/<name>`            |
//! | Alarm state    | `P/property/alarms/<source>`   |
//!
//! Remote readings follow one of the [`SensorScheme`] layouts.

use serde::Deserialize;

use crate::ledger::AlarmKey;

/// Component reported on by the fixed sensor layouts.
pub const CPU: &str = "cpu";

/// Layout of the topics remote sensors publish temperatures on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SensorScheme {
    /// `<source>/property/temperature/cpu[/...]`
    #[default]
    Property,
    /// `sensor/temperature/<source>/cpu[/...]`
    SensorPrefix,
    /// `<source>/property/<component>/temperature`, any component
    ComponentProperty,
}

impl SensorScheme {
    /// Subscription filter covering every topic of this layout.
    ///
    /// A trailing `#` also matches its parent level, so `.../cpu/#` covers
    /// `.../cpu` itself.
    pub fn filter(&self) -> &'static str {
        match self {
            SensorScheme::Property => "+/property/temperature/cpu/#",
            SensorScheme::SensorPrefix => "sensor/temperature/+/cpu/#",
            SensorScheme::ComponentProperty => "+/property/+/temperature",
        }
    }

    /// Whether readings of different components of one source arrive under
    /// this layout. Such layouts need a per-component alarm key.
    pub fn is_multi_component(&self) -> bool {
        matches!(self, SensorScheme::ComponentProperty)
    }

    /// Extract `(source, component)` from a topic of this layout.
    pub fn parse<'a>(&self, topic: &'a str) -> Option<(&'a str, &'a str)> {
        let segments: Vec<&str> = topic.split('/').collect();
        if segments.len() < 4 {
            return None;
        }

        let (source, component) = match self {
            SensorScheme::Property => {
                if segments[1] != "property" || segments[2] != "temperature" || segments[3] != CPU
                {
                    return None;
                }
                (segments[0], segments[3])
            }
            SensorScheme::SensorPrefix => {
                if segments[0] != "sensor" || segments[1] != "temperature" || segments[3] != CPU {
                    return None;
                }
                (segments[2], segments[3])
            }
            SensorScheme::ComponentProperty => {
                if segments.len() != 4 || segments[1] != "property" || segments[3] != "temperature"
                {
                    return None;
                }
                (segments[0], segments[2])
            }
        };

        if source.is_empty() || component.is_empty() {
            return None;
        }
        Some((source, component))
    }
}

/// The kind of an inbound message, decided from its topic alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// `P/command/<name>`
    Command(&'a str),
    /// `P/property/<name>/set`
    PropertySet(&'a str),
    /// A temperature reported by a remote source.
    RemoteTemperature {
        source: &'a str,
        component: &'a str,
    },
    /// Anything else.
    Unhandled,
}

/// Topic layout for one application id.
#[derive(Debug, Clone)]
pub struct TopicScheme {
    application_id: String,
    sensors: SensorScheme,
}

impl TopicScheme {
    pub fn new(application_id: impl Into<String>, sensors: SensorScheme) -> Self {
        Self {
            application_id: application_id.into(),
            sensors,
        }
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn sensors(&self) -> SensorScheme {
        self.sensors
    }

    /// Liveness topic carrying `ALIVE` / `DEAD`.
    pub fn state(&self) -> String {
        format!("{}/STATE", self.application_id)
    }

    /// Retained topic manifest.
    pub fn birth(&self) -> String {
        format!("{}/BIRTH", self.application_id)
    }

    pub fn command(&self, name: &str) -> String {
        format!("{}/command/{}", self.application_id, name)
    }

    pub fn property(&self, name: &str) -> String {
        format!("{}/property/{}", self.application_id, name)
    }

    pub fn property_set(&self, name: &str) -> String {
        format!("{}/property/{}/set", self.application_id, name)
    }

    /// Alarm state topic for a key.
    pub fn alarm(&self, key: &AlarmKey) -> String {
        match key.component() {
            Some(component) => format!(
                "{}/property/alarms/{}/{}",
                self.application_id,
                key.source_id(),
                component
            ),
            None => format!(
                "{}/property/alarms/{}",
                self.application_id,
                key.source_id()
            ),
        }
    }

    /// Filters for commands, property updates and remote readings, in that order.
    pub fn subscriptions(&self) -> Vec<String> {
        vec![
            format!("{}/command/#", self.application_id),
            format!("{}/property/+/set", self.application_id),
            self.sensors.filter().to_string(),
        ]
    }

    /// Classify a topic.
    ///
    /// Commands win over property updates, which win over sensor readings.
    /// Topics published by this application are never readings.
    pub fn classify<'a>(&self, topic: &'a str) -> Route<'a> {
        let own = topic
            .strip_prefix(self.application_id.as_str())
            .and_then(|rest| rest.strip_prefix('/'));

        if let Some(rest) = own {
            if let Some(name) = rest.strip_prefix("command/") {
                if !name.is_empty() {
                    return Route::Command(name);
                }
            }

            if let Some(name) = rest
                .strip_prefix("property/")
                .and_then(|r| r.strip_suffix("/set"))
            {
                if !name.is_empty() && !name.contains('/') {
                    return Route::PropertySet(name);
                }
            }
        }

        match self.sensors.parse(topic) {
            Some((source, component)) if source != self.application_id => {
                Route::RemoteTemperature { source, component }
            }
            _ => Route::Unhandled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> TopicScheme {
        TopicScheme::new("temperature-alarm", SensorScheme::Property)
    }

    #[test]
    fn test_classify_commands() {
        let s = scheme();
        assert_eq!(
            s.classify("temperature-alarm/command/shutdown"),
            Route::Command("shutdown")
        );
        assert_eq!(
            s.classify("temperature-alarm/command/rebirth"),
            Route::Command("rebirth")
        );
        assert_eq!(s.classify("temperature-alarm/command/"), Route::Unhandled);
    }

    #[test]
    fn test_classify_property_set() {
        let s = scheme();
        assert_eq!(
            s.classify("temperature-alarm/property/threshold/set"),
            Route::PropertySet("threshold")
        );
        assert_eq!(
            s.classify("temperature-alarm/property/cpu-threshold/set"),
            Route::PropertySet("cpu-threshold")
        );
        // the echo topic is not a set request
        assert_eq!(
            s.classify("temperature-alarm/property/threshold"),
            Route::Unhandled
        );
    }

    #[test]
    fn test_command_wins_over_property() {
        let s = scheme();
        assert_eq!(
            s.classify("temperature-alarm/command/property/x/set"),
            Route::Command("property/x/set")
        );
    }

    #[test]
    fn test_classify_remote_temperature() {
        let s = scheme();
        assert_eq!(
            s.classify("node-1/property/temperature/cpu"),
            Route::RemoteTemperature {
                source: "node-1",
                component: "cpu"
            }
        );
        assert_eq!(
            s.classify("node-1/property/temperature/cpu/core0"),
            Route::RemoteTemperature {
                source: "node-1",
                component: "cpu"
            }
        );
    }

    #[test]
    fn test_other_components_are_not_readings() {
        let s = scheme();
        assert_eq!(
            s.classify("node-1/property/temperature/gpu"),
            Route::Unhandled
        );
        assert_eq!(
            s.classify("node-1/property/temperature/gpu/cpu"),
            Route::Unhandled
        );

        let s = TopicScheme::new("watchdog", SensorScheme::SensorPrefix);
        assert_eq!(
            s.classify("sensor/temperature/node-7/gpu"),
            Route::Unhandled
        );
    }

    #[test]
    fn test_other_application_prefix_is_not_ours() {
        let s = scheme();
        assert_eq!(
            s.classify("temperature-alarm-2/command/shutdown"),
            Route::Unhandled
        );
    }

    #[test]
    fn test_own_topics_are_not_readings() {
        let s = scheme();
        assert_eq!(
            s.classify("temperature-alarm/property/temperature/cpu"),
            Route::Unhandled
        );
    }

    #[test]
    fn test_unhandled() {
        let s = scheme();
        assert_eq!(s.classify("node-1/STATE"), Route::Unhandled);
        assert_eq!(s.classify("node-1/property/fan/rpm"), Route::Unhandled);
        assert_eq!(s.classify("node-1/property/temperature/cpu-old"), Route::Unhandled);
        assert_eq!(s.classify(""), Route::Unhandled);
    }

    #[test]
    fn test_sensor_prefix_scheme() {
        let s = TopicScheme::new("watchdog", SensorScheme::SensorPrefix);
        assert_eq!(
            s.classify("sensor/temperature/node-7/cpu/package"),
            Route::RemoteTemperature {
                source: "node-7",
                component: "cpu"
            }
        );
        assert_eq!(
            s.classify("node-7/property/temperature/cpu"),
            Route::Unhandled
        );
    }

    #[test]
    fn test_component_property_scheme() {
        let s = TopicScheme::new("watchdog", SensorScheme::ComponentProperty);
        assert_eq!(
            s.classify("node-3/property/gpu/temperature"),
            Route::RemoteTemperature {
                source: "node-3",
                component: "gpu"
            }
        );
        assert_eq!(s.classify("node-3/property/gpu/load"), Route::Unhandled);
        assert_eq!(
            s.classify("node-3/property/gpu/temperature/max"),
            Route::Unhandled
        );
    }

    #[test]
    fn test_published_topics() {
        let s = scheme();
        assert_eq!(s.state(), "temperature-alarm/STATE");
        assert_eq!(s.birth(), "temperature-alarm/BIRTH");
        assert_eq!(s.property("threshold"), "temperature-alarm/property/threshold");
        assert_eq!(
            s.alarm(&AlarmKey::source("node-1")),
            "temperature-alarm/property/alarms/node-1"
        );
        assert_eq!(
            s.alarm(&AlarmKey::with_component("node-1", "cpu")),
            "temperature-alarm/property/alarms/node-1/cpu"
        );
    }

    #[test]
    fn test_subscriptions() {
        assert_eq!(
            scheme().subscriptions(),
            vec![
                "temperature-alarm/command/#".to_string(),
                "temperature-alarm/property/+/set".to_string(),
                "+/property/temperature/cpu/#".to_string(),
            ]
        );
        assert_eq!(
            SensorScheme::SensorPrefix.filter(),
            "sensor/temperature/+/cpu/#"
        );
    }
}
