//! Event, envelope and wire types.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// File name prefix for event envelopes.
pub const EVENT_PREFIX: &str = "_google_analytics4_";

/// File name prefix for user property updates.
pub const SET_USER_PROPERTIES_PREFIX: &str = "_ga4_userprops_";

/// File name prefix for user property removal.
pub const CLEAR_USER_PROPERTIES_PREFIX: &str = "_ga4_clearuserprops_";

/// Exclusive upper bound of the random suffix on queue file names and client ids.
pub(crate) const RANDOM_SUFFIX_BOUND: u64 = 10_000_000_000_000_000;

/// Stored user properties, values already normalized to strings.
pub type UserProperties = BTreeMap<String, String>;

/// Get current timestamp in milliseconds.
pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub(crate) fn random_suffix() -> u64 {
    rand::thread_rng().gen_range(0..RANDOM_SUFFIX_BOUND)
}

/// A single analytics event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, Value>>,
}

impl Event {
    /// Create an event with no params.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: None,
        }
    }

    /// Add a param.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }
}

impl From<&str> for Event {
    fn from(name: &str) -> Self {
        Event::new(name)
    }
}

/// One event or an ordered sequence of events, as accepted by `send`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch(Vec<Event>);

impl EventBatch {
    pub fn into_events(self) -> Vec<Event> {
        self.0
    }
}

impl From<Event> for EventBatch {
    fn from(event: Event) -> Self {
        EventBatch(vec![event])
    }
}

impl From<&str> for EventBatch {
    fn from(name: &str) -> Self {
        EventBatch(vec![Event::new(name)])
    }
}

impl From<Vec<Event>> for EventBatch {
    fn from(events: Vec<Event>) -> Self {
        EventBatch(events)
    }
}

impl<const N: usize> From<[Event; N]> for EventBatch {
    fn from(events: [Event; N]) -> Self {
        EventBatch(events.into())
    }
}

/// Timestamped wrapper around the events of one `send` call.
///
/// This is the unit written to the file queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Capture time, milliseconds since the epoch.
    pub timestamp: i64,
    pub events: Vec<Event>,
}

impl Envelope {
    /// Wrap events, stamped with the current time.
    pub fn new(batch: impl Into<EventBatch>) -> Self {
        Self::at(batch, now_ms())
    }

    /// Wrap events with an explicit timestamp.
    pub fn at(batch: impl Into<EventBatch>, timestamp: i64) -> Self {
        Self {
            timestamp,
            events: batch.into().into_events(),
        }
    }
}

/// Kinds of file exchanged through the queue, identified by name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Event,
    SetUserProperties,
    ClearUserProperties,
}

impl MessageKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            MessageKind::Event => EVENT_PREFIX,
            MessageKind::SetUserProperties => SET_USER_PROPERTIES_PREFIX,
            MessageKind::ClearUserProperties => CLEAR_USER_PROPERTIES_PREFIX,
        }
    }

    /// Generate a fresh queue file name for this kind.
    ///
    /// Collisions are not checked.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.prefix(), random_suffix())
    }

    /// Classify a queue file by its name. `None` means the file is not ours.
    pub fn classify(file_name: &str) -> Option<MessageKind> {
        [
            MessageKind::Event,
            MessageKind::SetUserProperties,
            MessageKind::ClearUserProperties,
        ]
        .into_iter()
        .find(|kind| file_name.starts_with(kind.prefix()))
    }
}

/// User property wrapper required by the Measurement Protocol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserPropertyValue {
    pub value: String,
}

/// Request body for `/mp/collect`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementPayload {
    pub client_id: String,
    pub events: Vec<Event>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_micros: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_properties: Option<BTreeMap<String, UserPropertyValue>>,
}

impl MeasurementPayload {
    /// Shape an envelope into a request body.
    ///
    /// `user_properties` is only present when `properties` is non-empty.
    pub fn from_envelope(
        client_id: impl Into<String>,
        envelope: Envelope,
        properties: &UserProperties,
    ) -> Self {
        let user_properties = if properties.is_empty() {
            None
        } else {
            Some(
                properties
                    .iter()
                    .map(|(k, v)| (k.clone(), UserPropertyValue { value: v.clone() }))
                    .collect(),
            )
        };

        Self {
            client_id: client_id.into(),
            events: envelope.events,
            timestamp_micros: Some(envelope.timestamp.saturating_mul(1000)),
            user_properties,
        }
    }
}

/// Normalize a user property value to its stored string form.
///
/// Strings are kept verbatim; every other JSON value uses its JSON text.
pub(crate) fn property_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
