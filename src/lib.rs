//! BLE sensor gatherer library
//! Keeps a fixed set of sensor peripherals connected and appends their
//! motion and heart-rate readings to a timestamped event log.

// Module declarations
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod state;
mod utils;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use crate::config::GatherConfig;
use crate::core::BluetoothManager;
use crate::logging::EventLog;
use crate::state::AppState;
use crate::utils::ensure_parent_directory;

/// Opens the event log and the adapter, then runs every task until Ctrl-C.
pub async fn run(config: GatherConfig) -> Result<()> {
    info!("Starting with configuration {}", serde_json::to_string(&config)?);

    ensure_parent_directory(&config.log_path).await?;
    let log = EventLog::open(&config.log_path)
        .with_context(|| format!("Failed to open event log {:?}", config.log_path))?;

    let (manager, events) = BluetoothManager::new()
        .await
        .context("Failed to initialize BluetoothManager")?;

    let state = Arc::new(AppState::new(Arc::new(manager), Arc::new(log), config));
    state.populate().await;
    let tasks = state.spawn_tasks(events);

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, shutting down.");
    for task in tasks {
        task.abort();
    }
    Ok(())
}
