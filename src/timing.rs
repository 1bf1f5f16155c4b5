//! ==============================================================================
//! timing.rs - clock capability and display formatting
//! ==============================================================================
//!
//! purpose:
//!     everything the ledger needs to turn raw timestamps into display strings.
//!     - Clock: "what time is it?" as a capability, so tests can pin it.
//!     - normalize_timestamp: tames the gateway's untrusted embedded clock.
//!     - format_delta / format_number / format_value: pure display helpers.
//!
//! relationships:
//!     - used by: ledger.rs (delta computation), console.rs (log line times)
//!
//! ==============================================================================

use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// anything further ahead of the wall clock than this is a broken device clock
pub const ONE_YEAR_MS: u64 = 365 * 24 * 60 * 60 * 1000;

// a raw timestamp in this range is unix seconds, not milliseconds
const SECONDS_RANGE_MIN: f64 = 1e9;
const SECONDS_RANGE_MAX: f64 = 2e9;

/// wall clock capability (unix epoch milliseconds)
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// normalize a payload `timestamp` into sane epoch milliseconds
///
/// - missing, zero, negative or non-numeric -> `now`
/// - whole seconds (1e9..=2e9) -> rescaled to milliseconds
/// - more than a year ahead of `now` -> `now`
pub fn normalize_timestamp(raw: Option<&Value>, now: u64) -> u64 {
    let Some(ts) = raw.and_then(Value::as_f64) else {
        return now;
    };
    if !ts.is_finite() || ts <= 0.0 {
        return now;
    }

    let ms = if (SECONDS_RANGE_MIN..=SECONDS_RANGE_MAX).contains(&ts) {
        ts * 1000.0
    } else {
        ts
    };

    if ms > now.saturating_add(ONE_YEAR_MS) as f64 {
        return now;
    }
    ms as u64
}

/// "0s", "+{ms}ms" below one second, "+{whole seconds}s" otherwise
pub fn format_delta(delta_ms: u64) -> String {
    match delta_ms {
        0 => "0s".to_string(),
        1..=999 => format!("+{}ms", delta_ms),
        _ => format!("+{}s", delta_ms / 1000),
    }
}

/// integral values print as integers, otherwise precision shrinks as magnitude grows
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value.fract() == 0.0 {
        return format!("{:.0}", value);
    }

    let magnitude = value.abs();
    let decimals = if magnitude >= 1000.0 {
        0
    } else if magnitude >= 100.0 {
        1
    } else if magnitude >= 10.0 {
        2
    } else if magnitude >= 1.0 {
        3
    } else if magnitude >= 0.1 {
        4
    } else if magnitude >= 0.01 {
        5
    } else {
        6
    };
    format!("{:.*}", decimals, value)
}

/// display form of a telemetry field
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Number(n) => n.as_f64().map(format_number).unwrap_or_else(|| n.to_string()),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// local wall clock time of an epoch-ms instant as HH:MM:SS
pub fn format_clock(epoch_ms: u64) -> String {
    use chrono::{Local, TimeZone};

    Local
        .timestamp_millis_opt(epoch_ms as i64)
        .single()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}
