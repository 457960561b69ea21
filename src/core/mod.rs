//! Core functionality for the sensor gatherer
//! Connection reconciliation and telemetry polling over a Bluetooth stack.

pub mod bluetooth;
pub mod poller;
pub mod reconcile;
pub mod telemetry;

// Re-export commonly used types
pub use bluetooth::{BleStack, BluetoothManager, Registry};
pub use poller::{HeartRatePoller, MotionPoller};
pub use reconcile::Reconciler;
