use std::collections::BTreeMap;
use std::sync::Arc;

use bluest::{Adapter, Device};
use futures_util::StreamExt;
use log::{debug, error, info};
use regex::Regex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::types::{DiscoveredObject, DiscoveryEvent, KnownDevice, ObjectId};
use crate::error::{GatherError, Result};

pub type DeviceMap = Arc<Mutex<BTreeMap<ObjectId, KnownDevice>>>;

struct ScanTask {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs adapter discovery in a background task, recording every peripheral
/// it sees and announcing new ones on the event channel.
pub struct BluetoothScanner {
    adapter: Adapter,
    devices: DeviceMap,
    events: UnboundedSender<DiscoveryEvent>,
    scan_task: Mutex<Option<ScanTask>>,
}

impl BluetoothScanner {
    pub fn new(adapter: Adapter, devices: DeviceMap, events: UnboundedSender<DiscoveryEvent>) -> Self {
        Self {
            adapter,
            devices,
            events,
            scan_task: Mutex::new(None),
        }
    }

    pub async fn start_scan(&self) -> Result<()> {
        let mut scan_task = self.scan_task.lock().await;
        if scan_task.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            return Err(GatherError::DiscoveryActive);
        }

        let cancel_token = CancellationToken::new();
        let cancel_token_for_task = cancel_token.clone();
        let adapter_for_task = self.adapter.clone();
        let devices_for_task = self.devices.clone();
        let events_for_task = self.events.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = Self::internal_scan_task(
                adapter_for_task,
                devices_for_task,
                events_for_task,
                cancel_token_for_task,
            )
            .await
            {
                error!("Bluetooth scan failed: {}", e);
            }
        });

        *scan_task = Some(ScanTask {
            cancel_token,
            handle,
        });
        info!("Device scan task started.");
        Ok(())
    }

    async fn internal_scan_task(
        adapter: Adapter,
        devices: DeviceMap,
        events: UnboundedSender<DiscoveryEvent>,
        cancel_token: CancellationToken,
    ) -> Result<()> {
        // already connected peripherals never advertise
        for device in adapter.connected_devices().await? {
            Self::register_device(&devices, &events, device).await;
        }

        info!("Starting bluetooth scan");
        let mut scan_stream = adapter.scan(&[]).await?;
        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered_device) => {
                            debug!("Found device - Device: {:?}, RSSI: {:?}", discovered_device.device, discovered_device.rssi);
                            Self::register_device(&devices, &events, discovered_device.device).await;
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
        Ok(())
    }

    pub async fn stop_scan(&self) -> Result<()> {
        let scan_task = self
            .scan_task
            .lock()
            .await
            .take()
            .ok_or(GatherError::DiscoveryInactive)?;
        info!("Stopping Bluetooth scan.");
        scan_task.cancel_token.cancel();

        if let Err(e) = scan_task.handle.await {
            error!("Scan task finished with an unexpected join error: {:?}", e);
        }
        Ok(())
    }

    async fn register_device(devices: &DeviceMap, events: &UnboundedSender<DiscoveryEvent>, device: Device) {
        let id = ObjectId::new(device.id().to_string());
        let address = Self::extract_mac_address(id.as_str()).unwrap_or_else(|| id.as_str().to_uppercase());

        let fresh = {
            let mut devices = devices.lock().await;
            devices
                .insert(
                    id.clone(),
                    KnownDevice {
                        device,
                        address: address.clone(),
                    },
                )
                .is_none()
        };
        if fresh {
            debug!("Registered device {} ({})", id, address);
            let _ = events.send(DiscoveryEvent::Added(DiscoveredObject::peripheral(id, &address)));
        }
    }

    /// Finds a MAC address in a platform device id. BlueZ object paths use
    /// underscores as separators.
    pub fn extract_mac_address(device_id_str: &str) -> Option<String> {
        let re = Regex::new(r"([0-9A-Fa-f]{2}[:_-]){5}[0-9A-Fa-f]{2}").ok()?;
        re.find_iter(device_id_str)
            .last()
            .map(|m| m.as_str().replace(['_', '-'], ":").to_uppercase())
    }
}
