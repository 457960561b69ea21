//! Constants used throughout the application
//! This module contains all the constant values used in the application,
//! such as UUIDs, the peripheral allow-list and timing defaults.

use uuid::Uuid;

/// Hardware addresses of the sensors we keep connected
pub const DEVICE_ALLOW_LIST: [&str; 2] = ["C4:0E:54:C5:A9:EA", "DB:47:A9:51:E7:68"];

/// Identity of the single bluest adapter
pub const DEFAULT_ADAPTER_ID: &str = "default-adapter";

/// Vendor motion characteristic (three little-endian i16 axes)
pub const UUID_MOTION_CHAR: Uuid = Uuid::from_u128(0x00030002_78fc_48fe_8e23_433b3a1942d0);

/// Standard Heart Rate service
pub const UUID_HEART_RATE_SERVICE: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);

/// Standard Heart Rate Measurement characteristic
pub const UUID_HEART_RATE_CHAR: Uuid = Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);

/// Vendor characteristic that switches the heart-rate sensor on and off
pub const UUID_HEART_RATE_CTRL_CHAR: Uuid = Uuid::from_u128(0x00050001_78fc_48fe_8e23_433b3a1942d0);

/// Motion poll period in milliseconds
pub const MOTION_POLL_INTERVAL_MS: u64 = 3_000;

/// Heart-rate poll period in milliseconds
pub const HEART_RATE_POLL_INTERVAL_MS: u64 = 10_000;

/// Wait between enabling the heart-rate sensor and reading it
pub const HEART_RATE_WARMUP_MS: u64 = 16_000;

/// Reconnect-only reconciliation period
pub const SOFT_RECONCILE_INTERVAL_MS: u64 = 5_000;

/// Full reset reconciliation period
pub const HARD_RECONCILE_INTERVAL_MS: u64 = 300_000;

/// Wait after starting discovery in a hard reset
pub const DISCOVERY_SETTLE_MS: u64 = 10_000;

/// Wait after a forced disconnect in a hard reset
pub const DISCONNECT_SETTLE_MS: u64 = 4_000;

/// Delay between attempts of the per-peripheral reconnect loop
pub const RECONNECT_RETRY_DELAY_MS: u64 = 15_000;

/// Default location of the event log
pub const DEFAULT_LOG_PATH: &str = "data/gather.log";
