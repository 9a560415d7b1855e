//! ==============================================================================
//! main.rs - device panel entry point
//! ==============================================================================
//!
//! purpose:
//!     host process for a microcontroller sensor board that speaks plain http.
//!     it polls the board, keeps a bounded history of readings, switches the
//!     board's motor and alarm outputs on request and serves a small api.
//!
//! responsibilities:
//!     - load configuration (panel.toml + ESP32_IP override)
//!     - build the Panel (history + connection status owner)
//!     - optionally restore history from the last json / csv export
//!     - serve the control api
//!     - run the polling loop until ctrl-c
//!
//! relationships:
//!     - uses: config.rs (settings)
//!     - uses: panel.rs (refresh / command / view)
//!     - uses: server.rs (axum routes)
//!     - uses: export.rs (restore on start)
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                    rust host (this file)                     │
//!     │  ┌─────────────┐            ┌─────────────────────┐         │
//!     │  │ poll loop   │            │ web server          │         │
//!     │  │ (5s cycle)  │            │ (port 8050)         │         │
//!     │  └──────┬──────┘            └──────────┬──────────┘         │
//!     │         └─────────────┬────────────────┘                    │
//!     │                 ┌─────┴─────┐                               │
//!     │                 │   panel   │ <- panel.rs                   │
//!     │                 └─────┬─────┘                               │
//!     └───────────────────────┼─────────────────────────────────────┘
//!                             │ http GET
//!                      ┌──────┴──────┐
//!                      │   device    │  /  /motor1_h  /motor1_l
//!                      │  (esp32)    │     /alarme_h  /alarme_l
//!                      └─────────────┘
//!
//! ==============================================================================

mod config;
mod device;
mod domain;
mod export;
mod forward;
mod history;
#[cfg(test)]
mod mock;
mod panel;
mod server;

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  Device Panel Host");
    println!("  \"Poll, Keep, Switch\"");
    println!("===========================================================");

    // step 1: load configuration
    let config = config::PanelConfig::load_or_default();
    init_logging(&config.logging.level);
    config.print_summary();

    // step 2: build the panel, seeding history if asked to
    let panel = panel::Panel::new(&config);
    if config.export.restore_on_start {
        if let Err(e) = panel.restore_from_exports().await {
            tracing::warn!("could not restore history: {}", e);
        }
    }

    // step 3: start the web server in background
    let api = server::ApiState { panel: panel.clone(), recent_rows: config.polling.recent_rows };
    let bind = config.server.bind.clone();
    tokio::spawn(async move {
        tracing::info!("control api live at http://{}", bind);
        if let Err(e) = server::run_server(&bind, api).await {
            tracing::error!("web server error: {:#}", e);
        }
    });

    // step 4: polling loop
    if !config.polling.auto {
        tracing::info!("automatic polling disabled; waiting for POST /api/refresh");
        tokio::signal::ctrl_c().await?;
        return Ok(());
    }

    let interval = Duration::from_secs(config.polling.interval_seconds.max(1));
    tracing::info!("starting device polling ({}s interval)", interval.as_secs());
    run_polling(&panel, interval, tokio::signal::ctrl_c()).await;
    tracing::info!("shutting down");

    Ok(())
}

/// poll on every tick until `shutdown` resolves
///
/// the shutdown future is created once by the caller and also pre-empts a
/// refresh that is still waiting on the device.
async fn run_polling<F: Future>(panel: &panel::Panel, interval: Duration, shutdown: F) {
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(interval);
    // a slow device delays the next tick instead of bunching polls up
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = async {
                ticker.tick().await;
                // failures are already folded into the status by the panel
                let _ = panel.refresh().await;
            } => {}
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
