//! ==============================================================================
//! ledger.rs - bounded message ledger with inter-arrival timing
//! ==============================================================================
//!
//! purpose:
//!     keeps the last `max_rows` device messages, newest first.
//!     every structural change (insert at head, evict at tail) shifts the
//!     neighbours, so all display deltas are recomputed after each one.
//!
//! invariants:
//!     - len() <= max_rows, in memory and in the persisted copy
//!     - entries[0] is the most recently ingested message
//!     - entries[0].delta == "0s"
//!     - delta[i] = max(0, ts[i-1] - ts[i])
//!
//! relationships:
//!     - used by: console.rs (DebugConsole owns one ledger)
//!     - uses: storage.rs (persistence), timing.rs (clock + formatting)
//!
//! ==============================================================================

use crate::domain::{DataEntry, FieldView, LedgerEntry, RawMessage, RowView, SeparatorEntry};
use crate::storage::{self, KeyValueStore};
use crate::timing::{self, Clock};

use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;

pub const DEFAULT_MAX_ROWS: usize = 30;

/// storage key holding the serialized ledger
pub const MESSAGES_KEY: &str = "debug_messages";

/// routing/metadata keys that are not telemetry
const EXCLUDED_FIELDS: [&str; 6] = ["id", "name", "mqtt_topic", "timestamp", "type", "timeDelta"];

const SEPARATOR_TYPE: &str = "batch_separator";
const DEFAULT_SEPARATOR_MESSAGE: &str = "Polling cycle complete";

const UNKNOWN_DEVICE: &str = "Unknown";
const PARSE_ERROR_DEVICE: &str = "Parse Error";
const NO_ID: &str = "N/A";
const FIRST_SEEN: &str = "First";

// ==============================================================================
// parsing
// ==============================================================================

/// result of turning a raw message into an entry; never an error
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(LedgerEntry),
    /// payload was not json, entry is a visible placeholder
    Malformed(LedgerEntry),
}

impl ParseOutcome {
    pub fn is_malformed(&self) -> bool {
        matches!(self, ParseOutcome::Malformed(_))
    }

    pub fn into_entry(self) -> LedgerEntry {
        match self {
            ParseOutcome::Parsed(entry) | ParseOutcome::Malformed(entry) => entry,
        }
    }
}

pub fn parse_message(raw: &RawMessage, now: u64) -> ParseOutcome {
    let payload: Value = match serde_json::from_str(&raw.message) {
        Ok(value) => value,
        Err(_) => {
            let mut fields = Map::new();
            fields.insert("raw".to_string(), Value::String(raw.message.clone()));
            return ParseOutcome::Malformed(LedgerEntry::Data(DataEntry {
                device_name: PARSE_ERROR_DEVICE.to_string(),
                device_id: NO_ID.to_string(),
                topic: raw.topic.clone(),
                payload_fields: fields,
                device_timestamp: now,
                received_at: now,
                reported_time: raw.real_time.clone(),
                reported_delta: raw.time_delta.clone(),
                reported_same_device_delta: raw.same_device_delta.clone(),
                delta: String::new(),
                same_device_delta: String::new(),
            }));
        }
    };

    let object = match payload {
        Value::Object(map) => map,
        // scalars and arrays carry no routing keys, show them as a single value
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };

    let timestamp = timing::normalize_timestamp(object.get("timestamp"), now);

    if object.get("type").and_then(Value::as_str) == Some(SEPARATOR_TYPE) {
        let message = object
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_SEPARATOR_MESSAGE)
            .to_string();
        return ParseOutcome::Parsed(LedgerEntry::Separator(SeparatorEntry {
            message,
            timestamp,
            received_at: now,
            delta: String::new(),
        }));
    }

    let device_name = match object.get("name") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => UNKNOWN_DEVICE.to_string(),
        Some(other) => other.to_string(),
    };
    let device_id = match object.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => NO_ID.to_string(),
        Some(other) => other.to_string(),
    };

    let payload_fields: Map<String, Value> = object
        .into_iter()
        .filter(|(key, _)| !EXCLUDED_FIELDS.contains(&key.as_str()))
        .collect();

    ParseOutcome::Parsed(LedgerEntry::Data(DataEntry {
        device_name,
        device_id,
        topic: raw.topic.clone(),
        payload_fields,
        device_timestamp: timestamp,
        received_at: now,
        reported_time: raw.real_time.clone(),
        reported_delta: raw.time_delta.clone(),
        reported_same_device_delta: raw.same_device_delta.clone(),
        delta: String::new(),
        same_device_delta: String::new(),
    }))
}

// ==============================================================================
// ledger
// ==============================================================================

pub struct MessageLedger {
    entries: VecDeque<LedgerEntry>,
    max_rows: usize,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl MessageLedger {
    pub fn new(max_rows: usize, store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        let max_rows = max_rows.max(1);
        Self {
            entries: VecDeque::with_capacity(max_rows + 1),
            max_rows,
            store,
            clock,
        }
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// newest first
    #[allow(dead_code)]
    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter()
    }

    #[allow(dead_code)]
    pub fn get(&self, index: usize) -> Option<&LedgerEntry> {
        self.entries.get(index)
    }

    /// parse, insert at head, evict, recompute, persist
    pub fn ingest(&mut self, raw: &RawMessage) {
        let outcome = parse_message(raw, self.clock.now_ms());
        if outcome.is_malformed() {
            tracing::debug!(topic = %raw.topic, "payload is not json, keeping raw text");
        }

        self.entries.push_front(outcome.into_entry());
        while self.entries.len() > self.max_rows {
            self.entries.pop_back();
        }

        self.recompute();
        self.persist();
    }

    /// drop every entry and the persisted copy
    pub fn clear(&mut self) {
        self.entries.clear();
        if let Err(e) = self.store.remove(MESSAGES_KEY) {
            tracing::warn!("failed to remove persisted messages: {}", e);
        }
    }

    /// load the persisted ledger; absent or corrupt data starts empty
    pub fn restore_from_storage(&mut self) -> usize {
        let stored: Vec<LedgerEntry> = match storage::load_json(self.store.as_ref(), MESSAGES_KEY) {
            Ok(Some(entries)) => entries,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("discarding unreadable persisted messages: {}", e);
                Vec::new()
            }
        };

        self.entries = stored.into_iter().take(self.max_rows).collect();
        self.recompute();
        self.entries.len()
    }

    /// pure projection of the ledger into row view-models, newest first
    pub fn rows(&self) -> Vec<RowView> {
        self.entries
            .iter()
            .map(|entry| match entry {
                LedgerEntry::Data(d) => RowView::Data {
                    time: d
                        .reported_time
                        .clone()
                        .unwrap_or_else(|| timing::format_clock(d.received_at)),
                    topic: d.topic.clone(),
                    device: d.device_name.clone(),
                    device_id: d.device_id.clone(),
                    fields: d
                        .payload_fields
                        .iter()
                        .map(|(name, value)| FieldView {
                            name: name.clone(),
                            value: timing::format_value(value),
                        })
                        .collect(),
                    delta: d.delta.clone(),
                    same_device_delta: d.same_device_delta.clone(),
                },
                LedgerEntry::Separator(s) => RowView::Separator {
                    message: s.message.clone(),
                    delta: s.delta.clone(),
                },
            })
            .collect()
    }

    fn recompute(&mut self) {
        let stamps: Vec<u64> = self.entries.iter().map(LedgerEntry::timestamp).collect();

        for (i, entry) in self.entries.iter_mut().enumerate() {
            let gap = if i == 0 { 0 } else { stamps[i - 1].saturating_sub(stamps[i]) };
            entry.set_delta(timing::format_delta(gap));
        }

        // nearest older entry from the same device, or "First"
        let same_device: Vec<Option<String>> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let data = entry.as_data()?;
                if let Some(reported) = &data.reported_same_device_delta {
                    return Some(reported.clone());
                }
                let older = self
                    .entries
                    .iter()
                    .skip(i + 1)
                    .filter_map(LedgerEntry::as_data)
                    .find(|other| data.same_device(other));
                Some(match older {
                    Some(other) => {
                        timing::format_delta(data.device_timestamp.saturating_sub(other.device_timestamp))
                    }
                    None => FIRST_SEEN.to_string(),
                })
            })
            .collect();

        for (entry, value) in self.entries.iter_mut().zip(same_device) {
            if let (LedgerEntry::Data(d), Some(value)) = (entry, value) {
                d.same_device_delta = value;
            }
        }
    }

    fn persist(&self) {
        // entries never exceed max_rows, the take() keeps the stored copy bounded regardless
        let bounded: Vec<&LedgerEntry> = self.entries.iter().take(self.max_rows).collect();
        if let Err(e) = storage::save_json(self.store.as_ref(), MESSAGES_KEY, &bounded) {
            tracing::warn!("failed to persist messages: {}", e);
        }
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::timing::manual::ManualClock;
    use serde_json::json;

    const START: u64 = 1_750_000_000_000;

    fn ledger_with(max_rows: usize) -> (MessageLedger, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(START));
        let ledger = MessageLedger::new(max_rows, store.clone(), clock.clone());
        (ledger, store, clock)
    }

    fn device_msg(id: u32, name: &str, timestamp: u64) -> RawMessage {
        RawMessage::new(
            "Lora/receive",
            json!({ "id": id, "name": name, "timestamp": timestamp, "temp": 21.5 }).to_string(),
        )
    }

    fn persisted(store: &MemoryStore) -> Option<Vec<LedgerEntry>> {
        storage::load_json(store, MESSAGES_KEY).unwrap()
    }

    #[test]
    fn test_parse_extracts_device_and_fields() {
        let raw = RawMessage::new(
            "Lora/receive",
            json!({
                "id": 3,
                "name": "G01S_room",
                "mqtt_topic": "x",
                "timestamp": 1_700_000_000,
                "type": "reading",
                "timeDelta": "+1s",
                "temp": 21.5,
                "humid": 40
            })
            .to_string(),
        );
        let entry = parse_message(&raw, START).into_entry();
        let data = entry.as_data().unwrap();

        assert_eq!(data.device_name, "G01S_room");
        assert_eq!(data.device_id, "3");
        assert_eq!(data.topic, "Lora/receive");
        assert_eq!(data.device_timestamp, 1_700_000_000_000);
        assert_eq!(data.received_at, START);
        let keys: Vec<&str> = data.payload_fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["humid", "temp"]);
    }

    #[test]
    fn test_parse_defaults_for_missing_identity() {
        let raw = RawMessage::new("t", r#"{"voltage": 229.9}"#);
        let entry = parse_message(&raw, START).into_entry();
        let data = entry.as_data().unwrap();
        assert_eq!(data.device_name, "Unknown");
        assert_eq!(data.device_id, "N/A");
        assert_eq!(data.device_timestamp, START);
    }

    #[test]
    fn test_parse_failure_is_a_placeholder_row() {
        let outcome = parse_message(&RawMessage::new("t", "not json"), START);
        assert!(outcome.is_malformed());

        let entry = outcome.into_entry();
        let data = entry.as_data().unwrap();
        assert_eq!(data.device_name, "Parse Error");
        assert_eq!(data.device_id, "N/A");
        assert_eq!(data.payload_fields.get("raw"), Some(&json!("not json")));
        assert_eq!(data.device_timestamp, START);
    }

    #[test]
    fn test_parse_separator() {
        let raw = RawMessage::new(
            "debug",
            json!({ "type": "batch_separator", "message": "Round 4 done", "timestamp": START - 10 }).to_string(),
        );
        match parse_message(&raw, START).into_entry() {
            LedgerEntry::Separator(s) => {
                assert_eq!(s.message, "Round 4 done");
                assert_eq!(s.timestamp, START - 10);
            }
            other => panic!("expected separator, got {:?}", other),
        }

        let raw = RawMessage::new("debug", r#"{"type":"batch_separator"}"#);
        match parse_message(&raw, START).into_entry() {
            LedgerEntry::Separator(s) => assert_eq!(s.message, DEFAULT_SEPARATOR_MESSAGE),
            other => panic!("expected separator, got {:?}", other),
        }
    }

    #[test]
    fn test_ingest_parse_failure_does_not_block() {
        let (mut ledger, _store, _clock) = ledger_with(DEFAULT_MAX_ROWS);
        ledger.ingest(&RawMessage::new("t", "not json"));
        ledger.ingest(&device_msg(1, "G01S_a", START));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get(1).unwrap().as_data().unwrap().device_name, "Parse Error");
    }

    #[test]
    fn test_bound_and_order_invariants() {
        let (mut ledger, store, clock) = ledger_with(DEFAULT_MAX_ROWS);

        for i in 0..75u64 {
            clock.advance(1000);
            ledger.ingest(&device_msg(i as u32, "dev", START + i * 1000));

            assert!(ledger.len() <= DEFAULT_MAX_ROWS);
            assert!(persisted(&store).unwrap().len() <= DEFAULT_MAX_ROWS);
            assert_eq!(ledger.get(0).unwrap().as_data().unwrap().device_id, i.to_string());
            assert_eq!(ledger.get(0).unwrap().delta(), "0s");
        }
    }

    #[test]
    fn test_eviction_drops_first_message() {
        let (mut ledger, store, _clock) = ledger_with(30);
        for i in 0..31u64 {
            ledger.ingest(&device_msg(i as u32, &format!("dev{}", i), START + i));
        }

        assert_eq!(ledger.len(), 30);
        assert!(ledger.entries().all(|e| e.as_data().unwrap().device_name != "dev0"));
        assert_eq!(ledger.get(29).unwrap().as_data().unwrap().device_name, "dev1");
        assert_eq!(persisted(&store).unwrap().len(), 30);
    }

    #[test]
    fn test_deltas_follow_newer_neighbour() {
        let (mut ledger, _store, _clock) = ledger_with(DEFAULT_MAX_ROWS);
        ledger.ingest(&device_msg(1, "a", START));
        ledger.ingest(&device_msg(2, "b", START + 250));
        ledger.ingest(&device_msg(3, "c", START + 3_750));

        let deltas: Vec<&str> = ledger.entries().map(LedgerEntry::delta).collect();
        assert_eq!(deltas, vec!["0s", "+3s", "+250ms"]);
    }

    #[test]
    fn test_negative_gaps_clamp_to_zero() {
        let (mut ledger, _store, _clock) = ledger_with(DEFAULT_MAX_ROWS);
        ledger.ingest(&device_msg(1, "a", START + 5_000));
        // older embedded clock on the newer message
        ledger.ingest(&device_msg(2, "b", START));

        let deltas: Vec<&str> = ledger.entries().map(LedgerEntry::delta).collect();
        assert_eq!(deltas, vec!["0s", "0s"]);
    }

    #[test]
    fn test_deltas_recomputed_after_eviction() {
        let (mut ledger, _store, _clock) = ledger_with(2);
        ledger.ingest(&device_msg(1, "a", START));
        ledger.ingest(&device_msg(2, "b", START + 2_000));
        ledger.ingest(&device_msg(3, "c", START + 2_500));

        let deltas: Vec<&str> = ledger.entries().map(LedgerEntry::delta).collect();
        assert_eq!(deltas, vec!["0s", "+500ms"]);
    }

    #[test]
    fn test_same_device_delta() {
        let (mut ledger, _store, _clock) = ledger_with(DEFAULT_MAX_ROWS);
        ledger.ingest(&device_msg(1, "a", START));
        ledger.ingest(&device_msg(2, "b", START + 400));
        ledger.ingest(&RawMessage::new(
            "debug",
            json!({ "type": "batch_separator", "timestamp": START + 500 }).to_string(),
        ));
        ledger.ingest(&device_msg(1, "a", START + 10_000));

        let same: Vec<String> = ledger
            .entries()
            .filter_map(LedgerEntry::as_data)
            .map(|d| d.same_device_delta.clone())
            .collect();
        assert_eq!(same, vec!["+10s", "First", "First"]);
    }

    #[test]
    fn test_reported_same_device_delta_wins() {
        let (mut ledger, _store, _clock) = ledger_with(DEFAULT_MAX_ROWS);
        let mut raw = device_msg(1, "a", START);
        raw.same_device_delta = Some("+2.0s".to_string());
        ledger.ingest(&raw);
        assert_eq!(ledger.get(0).unwrap().as_data().unwrap().same_device_delta, "+2.0s");
    }

    #[test]
    fn test_clear_empties_memory_and_storage() {
        let (mut ledger, store, _clock) = ledger_with(DEFAULT_MAX_ROWS);
        for i in 0..5 {
            ledger.ingest(&device_msg(i, "dev", START + i as u64));
        }
        assert!(persisted(&store).is_some());

        ledger.clear();
        assert_eq!(ledger.len(), 0);
        assert!(ledger.rows().is_empty());
        assert_eq!(persisted(&store), None);
    }

    #[test]
    fn test_restore_roundtrip() {
        let (mut ledger, store, clock) = ledger_with(DEFAULT_MAX_ROWS);
        for i in 0..5u64 {
            ledger.ingest(&device_msg(i as u32, "dev", START + i * 1500));
        }
        let before: Vec<LedgerEntry> = ledger.entries().cloned().collect();

        let mut fresh = MessageLedger::new(DEFAULT_MAX_ROWS, store.clone(), clock.clone());
        assert_eq!(fresh.restore_from_storage(), 5);
        let after: Vec<LedgerEntry> = fresh.entries().cloned().collect();

        assert_eq!(before, after);
        let deltas: Vec<&str> = fresh.entries().map(LedgerEntry::delta).collect();
        assert_eq!(deltas, vec!["0s", "+1s", "+1s", "+1s", "+1s"]);
    }

    #[test]
    fn test_restore_caps_oversized_storage() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(START));

        let mut big = MessageLedger::new(50, store.clone(), clock.clone());
        for i in 0..50u64 {
            big.ingest(&device_msg(i as u32, "dev", START + i));
        }

        let mut small = MessageLedger::new(30, store.clone(), clock);
        assert_eq!(small.restore_from_storage(), 30);
        // newest survive
        assert_eq!(small.get(0).unwrap().as_data().unwrap().device_id, "49");
        assert_eq!(small.get(0).unwrap().delta(), "0s");
    }

    #[test]
    fn test_restore_tolerates_corrupt_or_missing_blob() {
        let (mut ledger, store, _clock) = ledger_with(DEFAULT_MAX_ROWS);
        assert_eq!(ledger.restore_from_storage(), 0);

        store.set(MESSAGES_KEY, "[{\"kind\":").unwrap();
        assert_eq!(ledger.restore_from_storage(), 0);

        store.set(MESSAGES_KEY, "{\"not\":\"a list\"}").unwrap();
        assert_eq!(ledger.restore_from_storage(), 0);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_rows_projection() {
        let (mut ledger, _store, _clock) = ledger_with(DEFAULT_MAX_ROWS);
        let mut raw = device_msg(7, "HeylaVoltage_1", START);
        raw.real_time = Some("00:01:02".to_string());
        ledger.ingest(&raw);
        ledger.ingest(&RawMessage::new(
            "debug",
            json!({ "type": "batch_separator", "message": "done", "timestamp": START + 20 }).to_string(),
        ));

        let rows = ledger.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            RowView::Separator { message: "done".to_string(), delta: "0s".to_string() }
        );
        match &rows[1] {
            RowView::Data { time, device, device_id, fields, delta, same_device_delta, .. } => {
                assert_eq!(time, "00:01:02");
                assert_eq!(device, "HeylaVoltage_1");
                assert_eq!(device_id, "7");
                assert_eq!(fields, &vec![FieldView { name: "temp".into(), value: "21.50".into() }]);
                assert_eq!(delta, "+20ms");
                assert_eq!(same_device_delta, "First");
            }
            other => panic!("expected data row, got {:?}", other),
        }
    }

    #[test]
    fn test_independent_instances_do_not_interfere() {
        let (mut a, _sa, _ca) = ledger_with(DEFAULT_MAX_ROWS);
        let (b, _sb, _cb) = ledger_with(DEFAULT_MAX_ROWS);
        a.ingest(&device_msg(1, "a", START));
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }
}
