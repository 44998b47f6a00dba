//! Outbound attention events.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;

use super::{SessionRef, SessionRefError};

/// Label of an event scored by the sequence model.
pub const LABEL_MODEL: &str = "attention_model_score";
/// Label of an event scored by the temporal heuristic.
pub const LABEL_SEQUENCE: &str = "attention_sequence_score";
/// Label of a frame without a detectable face.
pub const LABEL_NO_FACE: &str = "no_face";
/// Label assumed for externally computed events that carry none.
pub const LABEL_DEFAULT: &str = "attention_score";

/// An attention observation posted to the backend.
///
/// The session is a [`SessionRef`], so "exactly one of `session_id` /
/// `diagnostic_session_id`" holds by construction. Deserialising a payload
/// that sets both or neither fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EventWire", into = "EventWire")]
pub struct AttentionEvent {
    /// Session the observation belongs to.
    pub session: SessionRef,
    /// Observed user.
    pub user_id: i64,
    /// Capture time.
    pub timestamp: OffsetDateTime,
    /// Attention score, absent when no face was detected.
    pub value: Option<f32>,
    /// Score provenance label.
    pub label: String,
    /// Structured payload (frame cues, window stats, context).
    pub data: serde_json::Value,
}

impl AttentionEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(
        session: SessionRef,
        user_id: i64,
        value: Option<f32>,
        label: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            session,
            user_id,
            timestamp: OffsetDateTime::now_utc(),
            value: value.map(|v| v.clamp(0.0, 1.0)),
            label: label.into(),
            data,
        }
    }
}

/// Wire shape with the two optional id fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    diagnostic_session_id: Option<i64>,
    user_id: i64,
    #[serde(default = "OffsetDateTime::now_utc", with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    #[serde(default)]
    value: Option<f32>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default = "empty_object")]
    data: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl TryFrom<EventWire> for AttentionEvent {
    type Error = SessionRefError;

    fn try_from(wire: EventWire) -> Result<Self, Self::Error> {
        let session = SessionRef::from_parts(wire.session_id, wire.diagnostic_session_id)?;
        Ok(Self {
            session,
            user_id: wire.user_id,
            timestamp: wire.timestamp,
            value: wire.value.map(|v| v.clamp(0.0, 1.0)),
            label: wire.label.unwrap_or_else(|| LABEL_DEFAULT.to_string()),
            data: wire.data,
        })
    }
}

impl From<AttentionEvent> for EventWire {
    fn from(event: AttentionEvent) -> Self {
        let (session_id, diagnostic_session_id) = event.session.to_parts();
        Self {
            session_id,
            diagnostic_session_id,
            user_id: event.user_id,
            timestamp: event.timestamp,
            value: event.value,
            label: Some(event.label),
            data: event.data,
        }
    }
}

/// Pass-through annotations supplied by the capture client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    /// Current test phase (0 outside diagnostic tests).
    #[serde(default)]
    pub phase: i64,
    /// Whether the frame falls in a distractor ("spinning") interval.
    #[serde(default, with = "flag")]
    pub spinning: bool,
    /// Seconds left in the current test, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_left: Option<f32>,
    /// Name of the running test, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
}

/// Serialises a flag as `0`/`1` and accepts booleans or numbers on input.
pub mod flag {
    use super::{Deserialize, Deserializer, Serializer};

    /// Serialises `true` as `1` and `false` as `0`.
    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    /// Reads a flag from a boolean, a number or null.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(from_json(&value))
    }

    /// Interprets a JSON value as a flag; non-zero numbers and `true` are set.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> bool {
        match value {
            serde_json::Value::Bool(b) => *b,
            serde_json::Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
            serde_json::Value::String(s) => s.trim().parse::<f64>().is_ok_and(|v| v != 0.0),
            _ => false,
        }
    }
}
