//! The device-management surface the scheduler drives.
//!
//! Every call may fail with a transport error, and every call must be safe to
//! issue concurrently from independent tasks. Implementations answer from live
//! state; callers re-enumerate instead of caching handles across ticks.

use async_trait::async_trait;

use crate::core::bluetooth::types::{DiscoveredObject, ObjectId};
use crate::error::Result;

#[async_trait]
pub trait BleStack: Send + Sync {
    /// Fresh enumeration of every adapter, peripheral, service and characteristic.
    async fn managed_objects(&self) -> Result<Vec<DiscoveredObject>>;

    async fn start_discovery(&self, adapter: &ObjectId) -> Result<()>;

    async fn stop_discovery(&self, adapter: &ObjectId) -> Result<()>;

    async fn connect(&self, peripheral: &ObjectId) -> Result<()>;

    async fn disconnect(&self, peripheral: &ObjectId) -> Result<()>;

    async fn is_connected(&self, peripheral: &ObjectId) -> Result<bool>;

    async fn read_value(&self, endpoint: &ObjectId) -> Result<Vec<u8>>;

    async fn write_value(&self, endpoint: &ObjectId, value: &[u8]) -> Result<()>;
}
