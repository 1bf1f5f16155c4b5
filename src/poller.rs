//! ==============================================================================
//! poller.rs - drains the gateway debug buffer on a fixed cadence
//! ==============================================================================
//!
//! purpose:
//!     the only writer of new ledger rows. each tick, if debug mode is on,
//!     fetch pending messages and ingest them in array order. a failed fetch
//!     is a silent no-op; the next tick is the retry.
//!
//! concurrency:
//!     console state sits behind one tokio RwLock. a whole batch is ingested
//!     under a single write guard, so a clear from the dashboard lands either
//!     before or after it, never inside it. the remote reset after a local
//!     clear runs with the lock released.
//!
//! ==============================================================================

use crate::console::{ConsoleLine, DebugConsole, StatusLevel};
use crate::device::DeviceClient;
use crate::domain::RawMessage;

use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;

pub type SharedConsole = Arc<RwLock<DebugConsole>>;

pub async fn run(console: SharedConsole, device: DeviceClient, interval: Duration) {
    sync_debug_state(&console, device.debug_state()).await;

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !console.read().await.debug_enabled {
            continue;
        }
        apply_poll(&console, device.fetch_messages().await).await;
    }
}

/// feed one fetch result into the ledger; returns the number ingested
pub async fn apply_poll(console: &SharedConsole, result: Result<Vec<RawMessage>>) -> usize {
    match result {
        Ok(batch) if batch.is_empty() => 0,
        Ok(batch) => {
            let count = console.write().await.ingest_batch(&batch);
            tracing::debug!(count, "ingested debug messages");
            count
        }
        Err(e) => {
            tracing::debug!("no messages this cycle: {:#}", e);
            0
        }
    }
}

/// adopt the gateway's debug flag at startup
pub async fn sync_debug_state<F>(console: &SharedConsole, request: F)
where
    F: Future<Output = Result<bool>>,
{
    match request.await {
        Ok(enabled) => {
            console.write().await.debug_enabled = enabled;
            tracing::info!(enabled, "gateway debug state loaded");
        }
        Err(e) => {
            tracing::warn!("failed to load debug state: {:#}", e);
            console.write().await.log.push(StatusLevel::Error, "Error loading debug state");
        }
    }
}

/// clear locally first, then attempt the remote timing reset
///
/// `reset` is not polled until the local clear is done.
pub async fn clear_and_reset<F>(console: &SharedConsole, reset: F) -> ConsoleLine
where
    F: Future<Output = Result<()>>,
{
    console.write().await.clear_local();
    let result = reset.await;
    console.write().await.record_reset(result)
}

/// ask the gateway to switch debug mode; local flag follows only on success
pub async fn toggle_debug<F>(console: &SharedConsole, enabled: bool, request: F) -> ConsoleLine
where
    F: Future<Output = Result<()>>,
{
    match request.await {
        Ok(()) => console.write().await.set_debug_enabled(enabled),
        Err(e) => {
            tracing::warn!("debug toggle failed: {:#}", e);
            console
                .write()
                .await
                .log
                .push(StatusLevel::Error, "Error toggling debug mode")
                .clone()
        }
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::storage::MemoryStore;
    use crate::timing::manual::ManualClock;
    use anyhow::anyhow;

    fn shared() -> SharedConsole {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_750_000_000_000));
        Arc::new(RwLock::new(DebugConsole::new(&LedgerConfig::default(), store, clock)))
    }

    fn batch(n: usize) -> Vec<RawMessage> {
        (0..n)
            .map(|i| RawMessage::new("Lora/receive", format!(r#"{{"id":{},"name":"G01S_{}"}}"#, i, i)))
            .collect()
    }

    #[tokio::test]
    async fn test_poll_ingests_in_array_order() {
        let console = shared();
        assert_eq!(apply_poll(&console, Ok(batch(3))).await, 3);

        let guard = console.read().await;
        // last element of the batch is the newest row
        assert_eq!(guard.ledger.get(0).unwrap().as_data().unwrap().device_id, "2");
        assert_eq!(guard.ledger.get(2).unwrap().as_data().unwrap().device_id, "0");
    }

    #[tokio::test]
    async fn test_failed_poll_is_silent() {
        let console = shared();
        apply_poll(&console, Ok(batch(2))).await;
        assert_eq!(apply_poll(&console, Err(anyhow!("timeout"))).await, 0);

        let guard = console.read().await;
        assert_eq!(guard.ledger.len(), 2);
        assert_eq!(guard.log.len(), 0);
    }

    #[tokio::test]
    async fn test_clear_happens_before_reset_runs() {
        let console = shared();
        apply_poll(&console, Ok(batch(4))).await;

        let probe = console.clone();
        let line = clear_and_reset(&console, async move {
            assert!(probe.read().await.ledger.is_empty());
            Ok::<(), anyhow::Error>(())
        })
        .await;

        assert_eq!(line.level, StatusLevel::Success);
        assert!(console.read().await.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_reset_failure_keeps_local_clear() {
        let console = shared();
        apply_poll(&console, Ok(batch(4))).await;

        let line = clear_and_reset(&console, async { Err::<(), _>(anyhow!("HTTP 503")) }).await;
        assert_eq!(line.level, StatusLevel::Error);
        assert!(console.read().await.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_toggle_and_sync() {
        let console = shared();

        sync_debug_state(&console, async { Ok::<_, anyhow::Error>(true) }).await;
        assert!(console.read().await.debug_enabled);

        let line = toggle_debug(&console, false, async { Ok::<_, anyhow::Error>(()) }).await;
        assert_eq!(line.text, "Debug DISABLED - MQTT only");
        assert!(!console.read().await.debug_enabled);

        let line = toggle_debug(&console, true, async { Err::<(), _>(anyhow!("refused")) }).await;
        assert_eq!(line.level, StatusLevel::Error);
        assert!(!console.read().await.debug_enabled);

        sync_debug_state(&console, async { Err::<bool, _>(anyhow!("offline")) }).await;
        let guard = console.read().await;
        assert_eq!(guard.log.status().unwrap().text, "Error loading debug state");
    }
}
