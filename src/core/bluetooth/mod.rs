//! Bluetooth functionality for the sensor gatherer
//! This module holds the device-management seam the scheduler drives,
//! its bluest implementation, and the registry that classifies what the
//! stack reports.

mod commands;
pub mod constants;
mod manager;
mod registry;
mod scanner;
mod stack;
mod types;

// Re-export types that should be publicly accessible
pub use commands::HeartRateCommand;
pub use manager::BluetoothManager;
pub use registry::{ConnectToken, EntityKind, Registry, Transition};
pub use stack::BleStack;
pub use types::{DiscoveredObject, DiscoveryEvent, HeartRatePair, ObjectId, ObjectRole};
