//! ==============================================================================
//! device.rs - http client for the gateway's debug endpoints
//! ==============================================================================
//!
//! endpoints (served by the gateway firmware):
//!     GET  /getdebugmessages   drains the gateway's debug buffer
//!     POST /cleartable         resets per-device timing on the gateway
//!     GET  /getdebugstate      {"enabled": bool}
//!     POST /toggledebug        {"enabled": bool}
//!
//! ==============================================================================

use crate::config::DeviceConfig;
use crate::domain::RawMessage;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize)]
struct DebugState {
    enabled: bool,
}

#[derive(Clone)]
pub struct DeviceClient {
    client: Client,
    base_url: String,
}

impl DeviceClient {
    pub fn new(config: &DeviceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// pending messages, in the order the gateway buffered them
    pub async fn fetch_messages(&self) -> Result<Vec<RawMessage>> {
        let messages = self
            .client
            .get(self.url("getdebugmessages"))
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<RawMessage>>()
            .await
            .context("malformed debug message list")?;
        Ok(messages)
    }

    /// POST with an empty body
    pub async fn reset_timing(&self) -> Result<()> {
        self.client
            .post(self.url("cleartable"))
            .send()
            .await?
            .error_for_status()
            .context("timing reset rejected")?;
        Ok(())
    }

    pub async fn debug_state(&self) -> Result<bool> {
        let state = self
            .client
            .get(self.url("getdebugstate"))
            .send()
            .await?
            .error_for_status()?
            .json::<DebugState>()
            .await
            .context("malformed debug state")?;
        Ok(state.enabled)
    }

    pub async fn set_debug(&self, enabled: bool) -> Result<()> {
        self.client
            .post(self.url("toggledebug"))
            .json(&DebugState { enabled })
            .send()
            .await?
            .error_for_status()
            .context("debug toggle rejected")?;
        Ok(())
    }
}
