//! Wire format for the dashboard push channel.
//!
//! Every frame in either direction is a JSON envelope `{type, data}`. The
//! discriminant is an open string set: unrecognized server frame types decode
//! to `None` so the channel tolerates protocol additions, while a payload
//! that fails to match its declared type is an error scoped to that single
//! frame.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::eventlog::{LogEntry, LogEntryDraft, LogLevel};
use crate::registry::{TestCase, TestStatus};
use crate::system::SystemState;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid frame envelope: {0}")]
    InvalidEnvelope(#[source] serde_json::Error),

    #[error("Malformed {frame} payload: {source}")]
    MalformedPayload {
        frame: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Raw `{type, data}` envelope shared by both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(default)]
    pub data: Value,
}

/// Frames the monitor emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientFrame {
    /// System-wide subscription, sent once per successful connect.
    #[serde(rename = "subscribe_system")]
    SubscribeSystem {},

    /// Per-test subscription, sent when a run starts.
    #[serde(rename = "subscribe_test")]
    SubscribeTest {
        #[serde(rename = "testId")]
        test_id: String,
    },
}

impl ClientFrame {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Per-test progress event relayed to the log feed.
#[derive(Debug, Clone, Deserialize)]
pub struct TestEvent {
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub phase: String,
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub data: TestEventData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestEventData {
    #[serde(default)]
    pub message: Option<String>,
}

impl TestEvent {
    /// Feed form: `[phase] type: message`.
    pub fn into_log_entry(self) -> LogEntry {
        let message = format!(
            "[{}] {}: {}",
            self.phase,
            self.event_type,
            self.data.message.unwrap_or_default()
        );
        LogEntry {
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            level: LogLevel::Info,
            source: self.source,
            message,
        }
    }
}

/// Payload of a `test_status_update` frame.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    #[serde(rename = "testId")]
    pub test_id: String,
    pub status: TestStatus,
}

/// Frames the harness emits, decoded from the envelope discriminant.
#[derive(Debug, Clone)]
pub enum ServerFrame {
    TestEvent(TestEvent),
    TestStatusUpdate(StatusUpdate),
    TestCreated(TestCase),
    SystemStateUpdate(SystemState),
    Log(LogEntryDraft),
}

/// Decode one inbound text frame. `Ok(None)` means the frame type is not
/// recognized and the frame should be dropped without error.
pub fn decode_frame(text: &str) -> Result<Option<ServerFrame>, ProtocolError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(ProtocolError::InvalidEnvelope)?;
    classify(envelope)
}

/// Map an envelope to a typed frame by its discriminant.
pub fn classify(envelope: Envelope) -> Result<Option<ServerFrame>, ProtocolError> {
    let Envelope { frame_type, data } = envelope;
    let frame = match frame_type.as_str() {
        "test_event" => ServerFrame::TestEvent(payload(data, "test_event")?),
        "test_status_update" => {
            ServerFrame::TestStatusUpdate(payload(data, "test_status_update")?)
        }
        "test_created" => ServerFrame::TestCreated(payload(data, "test_created")?),
        "system_state_update" => {
            ServerFrame::SystemStateUpdate(payload(data, "system_state_update")?)
        }
        "log" => ServerFrame::Log(payload(data, "log")?),
        _ => return Ok(None),
    };
    Ok(Some(frame))
}

fn payload<T: DeserializeOwned>(data: Value, frame: &'static str) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::MalformedPayload { frame, source })
}
