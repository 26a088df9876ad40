use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{Display, Formatter};

/// Lifecycle signal carried by every Frigate event message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    New,
    Update,
    End,
    #[serde(other)]
    Unknown,
}

impl Display for EventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Update => write!(f, "update"),
            Self::End => write!(f, "end"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// One sighting of a tracked object, as reported in `before`/`after`
///
/// Only `id`, `camera`, `label`, `stationary` and `entered_zones` drive any
/// decision; the rest is carried along untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventDetail {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub camera: String,
    #[serde(deserialize_with = "null_as_default")]
    pub label: String,
    #[serde(deserialize_with = "null_as_default")]
    pub stationary: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub entered_zones: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub current_zones: Vec<String>,
    pub frame_time: Option<f64>,
    pub snapshot_time: Option<f64>,
    pub top_score: Option<f64>,
    pub score: Option<f64>,
    pub false_positive: Option<bool>,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    #[serde(rename = "box", deserialize_with = "null_as_default")]
    pub bounding_box: Vec<f64>,
    pub area: Option<f64>,
    #[serde(deserialize_with = "null_as_default")]
    pub region: Vec<f64>,
    #[serde(deserialize_with = "null_as_default")]
    pub has_snapshot: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub has_clip: bool,
    pub motionless_count: Option<i64>,
    pub position_changes: Option<i64>,
}

/// Frigate sends `null` for empty lists and unset flags; treat it like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Payload published on `frigate/events`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub before: EventDetail,
    #[serde(default, deserialize_with = "null_as_default")]
    pub after: EventDetail,
}

impl EventPayload {
    /// Parse a raw JSON payload
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// Category segment of a Frigate topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicCategory {
    Events,
    Stats,
    Other(String),
}

/// Parse `frigate/<category>/...` (MQTT) or `frigate.<category>....` (AMQP routing key).
///
/// Returns `None` for topics outside the `frigate` prefix.
pub fn topic_category(topic: &str) -> Option<TopicCategory> {
    let mut parts = topic.split(|c| c == '/' || c == '.');
    if parts.next()? != "frigate" {
        return None;
    }

    let category = match parts.next()? {
        "events" => TopicCategory::Events,
        "stats" => TopicCategory::Stats,
        other => TopicCategory::Other(other.to_string()),
    };
    Some(category)
}
