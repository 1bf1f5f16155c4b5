use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// one message as drained from the gateway's debug buffer
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    /// source channel (mqtt topic)
    pub topic: String,
    /// payload, usually a json-encoded object
    pub message: String,
    /// gateway clock at publish time, "HH:MM:SS" since boot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_time: Option<String>,
    /// gateway-side delta since the previous message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_delta: Option<String>,
    /// gateway-side delta since the previous message of the same device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_device_delta: Option<String>,
    /// gateway uptime millis, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl RawMessage {
    #[allow(dead_code)]
    pub fn new(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            message: message.into(),
            ..Default::default()
        }
    }
}

/// a parsed device message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataEntry {
    pub device_name: String,
    pub device_id: String,
    pub topic: String,
    /// telemetry: every payload key that is not routing/metadata
    pub payload_fields: Map<String, Value>,
    /// normalized epoch ms used for all timing
    pub device_timestamp: u64,
    pub received_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_delta: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_same_device_delta: Option<String>,
    /// gap to the next newer entry, recomputed on every change
    #[serde(default)]
    pub delta: String,
    /// gap to the previous entry of the same device, recomputed on every change
    #[serde(default)]
    pub same_device_delta: String,
}

impl DataEntry {
    pub fn same_device(&self, other: &DataEntry) -> bool {
        self.device_id == other.device_id && self.device_name == other.device_name
    }
}

/// synthetic "one polling round completed" marker
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeparatorEntry {
    pub message: String,
    pub timestamp: u64,
    pub received_at: u64,
    #[serde(default)]
    pub delta: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEntry {
    Data(DataEntry),
    Separator(SeparatorEntry),
}

impl LedgerEntry {
    pub fn timestamp(&self) -> u64 {
        match self {
            LedgerEntry::Data(d) => d.device_timestamp,
            LedgerEntry::Separator(s) => s.timestamp,
        }
    }

    #[allow(dead_code)]
    pub fn delta(&self) -> &str {
        match self {
            LedgerEntry::Data(d) => &d.delta,
            LedgerEntry::Separator(s) => &s.delta,
        }
    }

    pub fn set_delta(&mut self, delta: String) {
        match self {
            LedgerEntry::Data(d) => d.delta = delta,
            LedgerEntry::Separator(s) => s.delta = delta,
        }
    }

    pub fn as_data(&self) -> Option<&DataEntry> {
        match self {
            LedgerEntry::Data(d) => Some(d),
            LedgerEntry::Separator(_) => None,
        }
    }
}

/// one telemetry cell, already formatted
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldView {
    pub name: String,
    pub value: String,
}

/// row view-model handed to the render target, newest first
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowView {
    Data {
        time: String,
        topic: String,
        device: String,
        device_id: String,
        fields: Vec<FieldView>,
        delta: String,
        same_device_delta: String,
    },
    /// spans the full table width
    Separator { message: String, delta: String },
}
