//! Alarm ledger: per-source alarm state and the raise/resolve policy.
//!
//! The ledger holds one record per alarmed source. A record is created when a
//! reading first reaches the threshold, replaced when a strictly higher reading
//! arrives while alarmed, and removed when a reading falls below the threshold.
//!
//! ```text
//!                 value >= threshold
//!    (no record) ───────────────────▶ (record v)  ── AlarmRaised
//!         ▲                             │    ▲
//!         │   value < threshold         │    │ value > v
//!         └─────── AlarmResolved ───────┘    └── AlarmRaised (re-announce)
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

/// Identifies one monitored source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlarmKey {
    source: String,
    component: Option<String>,
}

impl AlarmKey {
    /// A key that only distinguishes the remote application.
    pub fn source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            component: None,
        }
    }

    /// A key that distinguishes the remote application and its component.
    pub fn with_component(source: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            component: Some(component.into()),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source
    }

    pub fn component(&self) -> Option<&str> {
        self.component.as_deref()
    }
}

impl fmt::Display for AlarmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.component {
            Some(component) => write!(f, "{}/{}", self.source, component),
            None => f.write_str(&self.source),
        }
    }
}

/// How finely readings are grouped into alarm keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyGranularity {
    /// One alarm per remote application.
    #[default]
    Source,
    /// One alarm per remote application and component.
    SourceAndComponent,
}

impl KeyGranularity {
    /// Build the key for a reading from `source`/`component`.
    pub fn key(&self, source: &str, component: &str) -> AlarmKey {
        match self {
            KeyGranularity::Source => AlarmKey::source(source),
            KeyGranularity::SourceAndComponent => AlarmKey::with_component(source, component),
        }
    }
}

/// What the ledger decided for a single reading.
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    /// A new alarm, or an existing one re-announced at a higher value.
    AlarmRaised {
        key: AlarmKey,
        value: f64,
        threshold: f64,
    },
    /// Still alarmed, but not above the recorded value.
    AlarmSustainedSilently { recorded: f64 },
    /// Below threshold and nothing to resolve.
    NoAlarm,
    /// The alarm for this key is cleared.
    AlarmResolved { key: AlarmKey, value: f64 },
}

/// An active alarm: the value last announced and the threshold it crossed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlarmRecord {
    pub value: f64,
    pub threshold: f64,
}

/// Active alarms keyed by source.
#[derive(Debug, Clone, Default)]
pub struct AlarmLedger {
    records: BTreeMap<AlarmKey, AlarmRecord>,
}

impl AlarmLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded value for an active alarm.
    pub fn get(&self, key: &AlarmKey) -> Option<f64> {
        self.records.get(key).map(|record| record.value)
    }

    pub fn record(&self, key: &AlarmKey) -> Option<AlarmRecord> {
        self.records.get(key).copied()
    }

    /// Put back a record taken with [`AlarmLedger::record`], undoing any
    /// evaluation since.
    pub fn restore(&mut self, key: AlarmKey, record: Option<AlarmRecord>) {
        match record {
            Some(record) => {
                self.records.insert(key, record);
            }
            None => {
                self.records.remove(&key);
            }
        }
    }

    pub fn contains(&self, key: &AlarmKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over active alarms in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&AlarmKey, AlarmRecord)> {
        self.records.iter().map(|(key, record)| (key, *record))
    }

    /// Apply a reading and return what should be published.
    ///
    /// | record      | reading                 | result                     |
    /// |-------------|-------------------------|----------------------------|
    /// | none        | `value >= threshold`    | insert, `AlarmRaised`      |
    /// | `v >= value`| `value >= threshold`    | `AlarmSustainedSilently`   |
    /// | `v < value` | `value >= threshold`    | update, `AlarmRaised`      |
    /// | none        | `value < threshold`     | `NoAlarm`                  |
    /// | any         | `value < threshold`     | remove, `AlarmResolved`    |
    pub fn evaluate(&mut self, key: AlarmKey, value: f64, threshold: f64) -> Emission {
        if value >= threshold {
            match self.records.get_mut(&key) {
                Some(record) if record.value >= value => Emission::AlarmSustainedSilently {
                    recorded: record.value,
                },
                Some(record) => {
                    *record = AlarmRecord { value, threshold };
                    Emission::AlarmRaised {
                        key,
                        value,
                        threshold,
                    }
                }
                None => {
                    self.records.insert(key.clone(), AlarmRecord { value, threshold });
                    Emission::AlarmRaised {
                        key,
                        value,
                        threshold,
                    }
                }
            }
        } else if self.records.remove(&key).is_some() {
            Emission::AlarmResolved { key, value }
        } else {
            Emission::NoAlarm
        }
    }
}
