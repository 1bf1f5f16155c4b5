//! ==============================================================================
//! console.rs - debug console state
//! ==============================================================================
//!
//! purpose:
//!     everything the dashboard shows, owned by one instance:
//!     - the message ledger (ledger.rs)
//!     - a bounded, persisted console log of status events
//!     - the gateway's debug-mode flag as last seen
//!
//! relationships:
//!     - shared by: poller.rs and main.rs behind Arc<RwLock<DebugConsole>>
//!
//! ==============================================================================

use crate::config::LedgerConfig;
use crate::domain::RawMessage;
use crate::ledger::MessageLedger;
use crate::storage::{self, KeyValueStore};
use crate::timing::{self, Clock};

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

pub const DEFAULT_CONSOLE_LINES: usize = 100;

/// storage key holding the serialized console log
pub const CONSOLE_KEY: &str = "console_log";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsoleLine {
    pub at_ms: u64,
    pub level: StatusLevel,
    pub text: String,
}

impl ConsoleLine {
    /// "[HH:MM:SS] text"
    pub fn render(&self) -> String {
        format!("[{}] {}", timing::format_clock(self.at_ms), self.text)
    }
}

/// bounded append-only log, oldest first
pub struct ConsoleLog {
    lines: VecDeque<ConsoleLine>,
    max_lines: usize,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl ConsoleLog {
    pub fn new(max_lines: usize, store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            lines: VecDeque::new(),
            max_lines: max_lines.max(1),
            store,
            clock,
        }
    }

    pub fn push(&mut self, level: StatusLevel, text: impl Into<String>) -> &ConsoleLine {
        self.lines.push_back(ConsoleLine {
            at_ms: self.clock.now_ms(),
            level,
            text: text.into(),
        });
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }

        let bounded: Vec<&ConsoleLine> = self.lines.iter().collect();
        if let Err(e) = storage::save_json(self.store.as_ref(), CONSOLE_KEY, &bounded) {
            tracing::warn!("failed to persist console log: {}", e);
        }

        &self.lines[self.lines.len() - 1]
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        if let Err(e) = self.store.remove(CONSOLE_KEY) {
            tracing::warn!("failed to remove persisted console log: {}", e);
        }
    }

    pub fn restore_from_storage(&mut self) -> usize {
        let stored: Vec<ConsoleLine> = match storage::load_json(self.store.as_ref(), CONSOLE_KEY) {
            Ok(Some(lines)) => lines,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("discarding unreadable console log: {}", e);
                Vec::new()
            }
        };

        // keep the newest lines
        let skip = stored.len().saturating_sub(self.max_lines);
        self.lines = stored.into_iter().skip(skip).collect();
        self.lines.len()
    }

    pub fn lines(&self) -> impl Iterator<Item = &ConsoleLine> {
        self.lines.iter()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// the newest line doubles as the status message
    pub fn status(&self) -> Option<&ConsoleLine> {
        self.lines.back()
    }
}

pub struct DebugConsole {
    pub ledger: MessageLedger,
    pub log: ConsoleLog,
    pub debug_enabled: bool,
}

impl DebugConsole {
    pub fn new(config: &LedgerConfig, store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger: MessageLedger::new(config.max_rows, store.clone(), clock.clone()),
            log: ConsoleLog::new(config.console_lines, store, clock),
            debug_enabled: false,
        }
    }

    /// startup: reload both persisted sequences
    pub fn restore(&mut self) {
        let messages = self.ledger.restore_from_storage();
        let lines = self.log.restore_from_storage();
        tracing::info!(messages, lines, max_rows = self.ledger.max_rows(), "restored console state");
    }

    /// ingest a drained batch in array order
    pub fn ingest_batch(&mut self, batch: &[RawMessage]) -> usize {
        for raw in batch {
            self.ledger.ingest(raw);
        }
        batch.len()
    }

    /// local half of a clear: always succeeds
    pub fn clear_local(&mut self) {
        self.ledger.clear();
    }

    /// outcome of the remote timing reset that follows a local clear
    pub fn record_reset(&mut self, result: anyhow::Result<()>) -> ConsoleLine {
        match result {
            Ok(()) => self
                .log
                .push(StatusLevel::Success, "Table cleared and timing reset")
                .clone(),
            Err(e) => {
                tracing::warn!("timing reset failed: {:#}", e);
                self.log
                    .push(StatusLevel::Error, format!("Table cleared locally, timing reset failed: {}", e))
                    .clone()
            }
        }
    }

    pub fn set_debug_enabled(&mut self, enabled: bool) -> ConsoleLine {
        self.debug_enabled = enabled;
        let text = if enabled {
            "Debug ENABLED - MQTT + Console"
        } else {
            "Debug DISABLED - MQTT only"
        };
        self.log.push(StatusLevel::Success, text).clone()
    }
}
