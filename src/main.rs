//! ==============================================================================
//! main.rs - gateway debug console entry point
//! ==============================================================================
//!
//! purpose:
//!     a host-side console for an esp8266 modbus/mqtt gateway. it drains the
//!     gateway's debug buffer once a second and keeps the last 30 messages,
//!     newest first, with "since previous" and "same device" timing.
//!
//! responsibilities:
//!     - load configuration and set up logging
//!     - restore the persisted ledger and console log
//!     - serve the dashboard and its json api
//!     - run the polling loop
//!
//! relationships:
//!     - uses: console.rs (state), poller.rs (poll loop, clear/toggle flows)
//!     - uses: device.rs (gateway http api), render.rs (html)
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────┐
//!     │                    console host (this file)              │
//!     │  ┌─────────────┐        ┌──────────────────────────┐     │
//!     │  │ poll loop   │        │ web server (port 3000)   │     │
//!     │  │ (1s cycle)  │        │ dashboard + json api     │     │
//!     │  └──────┬──────┘        └────────────┬─────────────┘     │
//!     │         │   Arc<RwLock<DebugConsole>>│                   │
//!     │         └──────────────┬─────────────┘                   │
//!     │                  ┌─────┴─────┐      ┌──────────────┐     │
//!     │                  │  ledger   │─────▶│ state/*.json │     │
//!     │                  └───────────┘      └──────────────┘     │
//!     └──────────────────────────┬───────────────────────────────┘
//!                                │ http
//!                        ┌───────┴───────┐
//!                        │ esp8266       │
//!                        │ gateway       │
//!                        └───────────────┘
//!
//! ==============================================================================

mod config;
mod console;
mod device;
mod domain;
mod ledger;
mod poller;
mod render;
mod storage;
mod timing;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use console::{ConsoleLine, DebugConsole};
use device::DeviceClient;
use domain::RowView;
use poller::SharedConsole;
use storage::{FileStore, KeyValueStore, MemoryStore};
use timing::SystemClock;

// shared between the poll loop (writes rows) and the web server (reads, clears)
#[derive(Clone)]
struct AppContext {
    console: SharedConsole,
    device: DeviceClient,
}

// ==============================================================================
// main entry point
// ==============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  Gateway Debug Console");
    println!("  \"Last 30 messages, newest first\"");
    println!("===========================================================");

    // step 1: load configuration
    let config = config::ConsoleConfig::load_or_default();
    config.print_summary();
    init_tracing(&config.logging.level);

    // step 2: restore persisted state
    let store: Arc<dyn KeyValueStore> = match &config.storage.dir {
        Some(dir) => Arc::new(FileStore::new(dir)),
        None => Arc::new(MemoryStore::new()),
    };
    let mut console = DebugConsole::new(&config.ledger, store, Arc::new(SystemClock));
    console.restore();
    let console: SharedConsole = Arc::new(RwLock::new(console));

    // step 3: gateway client
    let device = DeviceClient::new(&config.device)?;

    // step 4: start the web server in background
    let ctx = AppContext { console: console.clone(), device: device.clone() };
    let bind = config.server.bind.clone();
    tokio::spawn(async move {
        tracing::info!("dashboard live at http://{}", bind);
        if let Err(e) = run_server(ctx, &bind).await {
            tracing::error!("web server error: {:#}", e);
        }
    });

    // step 5: main polling loop
    let interval = Duration::from_millis(config.polling.interval_ms.max(1));
    tracing::info!("polling {} every {}ms", config.device.base_url, config.polling.interval_ms);
    poller::run(console, device, interval).await;
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

// ==============================================================================
// web server
// ==============================================================================

async fn run_server(ctx: AppContext, bind: &str) -> Result<()> {
    let app = Router::new()
        .route("/", get(dashboard_handler))
        .route("/api/messages", get(messages_handler))
        .route("/api/console", get(console_handler))
        .route("/api/console/clear", post(console_clear_handler))
        .route("/api/clear", post(clear_handler))
        .route("/api/debug", post(debug_handler))
        .layer(CorsLayer::permissive())
        .with_state(ctx);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn dashboard_handler(State(ctx): State<AppContext>) -> Html<String> {
    let console = ctx.console.read().await;
    let rows = console.ledger.rows();
    let lines: Vec<ConsoleLine> = console.log.lines().cloned().collect();
    Html(render::render_page(&rows, &lines, console.debug_enabled))
}

/// json rows, newest first
async fn messages_handler(State(ctx): State<AppContext>) -> Json<Vec<RowView>> {
    Json(ctx.console.read().await.ledger.rows())
}

#[derive(serde::Serialize)]
struct ConsoleView {
    debug_enabled: bool,
    message_count: usize,
    status: Option<ConsoleLine>,
    lines: Vec<ConsoleLine>,
}

async fn console_handler(State(ctx): State<AppContext>) -> Json<ConsoleView> {
    let console = ctx.console.read().await;
    Json(ConsoleView {
        debug_enabled: console.debug_enabled,
        message_count: console.ledger.len(),
        status: console.log.status().cloned(),
        lines: console.log.lines().cloned().collect(),
    })
}

async fn console_clear_handler(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    ctx.console.write().await.log.clear();
    Json(serde_json::json!({"status": "success"}))
}

/// POST /api/clear - local clear, then best-effort timing reset on the gateway
async fn clear_handler(State(ctx): State<AppContext>) -> Json<ConsoleLine> {
    let line = poller::clear_and_reset(&ctx.console, ctx.device.reset_timing()).await;
    Json(line)
}

#[derive(Deserialize)]
struct DebugParams {
    enabled: bool,
}

/// POST /api/debug {"enabled": bool}
async fn debug_handler(
    State(ctx): State<AppContext>,
    Json(params): Json<DebugParams>,
) -> Json<ConsoleLine> {
    let line = poller::toggle_debug(&ctx.console, params.enabled, ctx.device.set_debug(params.enabled)).await;
    Json(line)
}
