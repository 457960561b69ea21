use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::{
    DEFAULT_LOG_PATH, DEVICE_ALLOW_LIST, DISCONNECT_SETTLE_MS, DISCOVERY_SETTLE_MS,
    HARD_RECONCILE_INTERVAL_MS, HEART_RATE_POLL_INTERVAL_MS, HEART_RATE_WARMUP_MS,
    MOTION_POLL_INTERVAL_MS, RECONNECT_RETRY_DELAY_MS, SOFT_RECONCILE_INTERVAL_MS,
};

/// Periods and delays of the periodic tasks, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timing {
    pub motion_poll_ms: u64,
    pub heart_rate_poll_ms: u64,
    /// Wait between enabling the heart-rate sensor and reading it.
    /// Longer than the heart-rate period on purpose.
    pub heart_rate_warmup_ms: u64,
    pub soft_reconcile_ms: u64,
    pub hard_reconcile_ms: u64,
    pub discovery_settle_ms: u64,
    pub disconnect_settle_ms: u64,
    pub reconnect_retry_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            motion_poll_ms: MOTION_POLL_INTERVAL_MS,
            heart_rate_poll_ms: HEART_RATE_POLL_INTERVAL_MS,
            heart_rate_warmup_ms: HEART_RATE_WARMUP_MS,
            soft_reconcile_ms: SOFT_RECONCILE_INTERVAL_MS,
            hard_reconcile_ms: HARD_RECONCILE_INTERVAL_MS,
            discovery_settle_ms: DISCOVERY_SETTLE_MS,
            disconnect_settle_ms: DISCONNECT_SETTLE_MS,
            reconnect_retry_ms: RECONNECT_RETRY_DELAY_MS,
        }
    }
}

impl Timing {
    pub fn motion_poll(&self) -> Duration {
        Duration::from_millis(self.motion_poll_ms)
    }

    pub fn heart_rate_poll(&self) -> Duration {
        Duration::from_millis(self.heart_rate_poll_ms)
    }

    pub fn heart_rate_warmup(&self) -> Duration {
        Duration::from_millis(self.heart_rate_warmup_ms)
    }

    pub fn soft_reconcile(&self) -> Duration {
        Duration::from_millis(self.soft_reconcile_ms)
    }

    pub fn hard_reconcile(&self) -> Duration {
        Duration::from_millis(self.hard_reconcile_ms)
    }

    pub fn discovery_settle(&self) -> Duration {
        Duration::from_millis(self.discovery_settle_ms)
    }

    pub fn disconnect_settle(&self) -> Duration {
        Duration::from_millis(self.disconnect_settle_ms)
    }

    pub fn reconnect_retry(&self) -> Duration {
        Duration::from_millis(self.reconnect_retry_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatherConfig {
    /// Hardware addresses of the peripherals to keep connected
    pub allow_list: Vec<String>,
    /// Event log file, opened for appending
    pub log_path: PathBuf,
    pub timing: Timing,
}

impl Default for GatherConfig {
    fn default() -> Self {
        GatherConfig {
            allow_list: DEVICE_ALLOW_LIST.iter().map(|a| a.to_string()).collect(),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            timing: Timing::default(),
        }
    }
}
