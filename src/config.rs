//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `console.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - DeviceConfig: Where the gateway lives and how long to wait for it.
//!     - PollingConfig: How often the debug buffer is drained.
//!     - LedgerConfig: Row bound of the message table and console log.
//!     - StorageConfig: Directory for the persisted ledger.
//!     - ServerConfig: Dashboard bind address.
//!     - LoggingConfig: Default log filter.
//!
//! ==============================================================================

use crate::console::DEFAULT_CONSOLE_LINES;
use crate::ledger::DEFAULT_MAX_ROWS;

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    pub interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    #[serde(default = "default_console_lines")]
    pub console_lines: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// unset keeps state in memory only
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_max_rows() -> usize {
    DEFAULT_MAX_ROWS
}

fn default_console_lines() -> usize {
    DEFAULT_CONSOLE_LINES
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { base_url: "http://192.168.4.1".to_string(), timeout_ms: default_timeout_ms() }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { max_rows: DEFAULT_MAX_ROWS, console_lines: DEFAULT_CONSOLE_LINES }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { dir: Some(PathBuf::from("state")) }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:3000".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl ConsoleConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse config")
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            PathBuf::from("config").join("console.toml"),
            PathBuf::from("..").join("config").join("console.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: {:#}", e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Self::default()
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let storage = self
            .storage
            .dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "memory".to_string());

        println!("┌─────────────────────────────────────────┐");
        println!("│          CONSOLE CONFIGURATION          │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Device: {}", self.device.base_url);
        println!("│ Poll Interval: {}ms", self.polling.interval_ms);
        println!("│ Max Rows: {}", self.ledger.max_rows);
        println!("│ Storage: {}", storage);
        println!("│ Dashboard: {}", self.server.bind);
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}
