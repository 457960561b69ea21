//! Bluetooth manager for the sensor gatherer
//! This module provides the bluest implementation of the device-management seam

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use bluest::{Adapter, Device};
use log::{debug, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

use crate::core::bluetooth::constants::DEFAULT_ADAPTER_ID;
use crate::core::bluetooth::scanner::{BluetoothScanner, DeviceMap};
use crate::core::bluetooth::stack::BleStack;
use crate::core::bluetooth::types::{
    CharacteristicHandle, DiscoveredObject, DiscoveryEvent, ObjectId,
};
use crate::error::{GatherError, Result};

/// Manages Bluetooth operations
pub struct BluetoothManager {
    adapter: Adapter,
    adapter_id: ObjectId,
    /// Peripherals seen by the scanner, keyed by sanitised device id
    devices: DeviceMap,
    /// GATT objects of each peripheral as of its last enumeration
    gatt: Mutex<BTreeMap<ObjectId, Vec<DiscoveredObject>>>,
    /// Characteristic handles resolved during enumeration
    characteristics: Mutex<BTreeMap<ObjectId, CharacteristicHandle>>,
    scanner: BluetoothScanner,
    events: UnboundedSender<DiscoveryEvent>,
}

impl BluetoothManager {
    /// Opens the default adapter. The receiver yields added/removed events
    /// for everything the manager learns about.
    pub async fn new() -> Result<(Self, UnboundedReceiver<DiscoveryEvent>)> {
        let adapter = Adapter::default()
            .await
            .ok_or(GatherError::AdapterUnavailable)?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        let (events, receiver) = mpsc::unbounded_channel();
        let devices: DeviceMap = Arc::new(Mutex::new(BTreeMap::new()));
        let scanner = BluetoothScanner::new(adapter.clone(), devices.clone(), events.clone());

        let manager = Self {
            adapter,
            adapter_id: ObjectId::from(DEFAULT_ADAPTER_ID),
            devices,
            gatt: Mutex::new(BTreeMap::new()),
            characteristics: Mutex::new(BTreeMap::new()),
            scanner,
            events,
        };
        Ok((manager, receiver))
    }

    async fn device(&self, id: &ObjectId) -> Result<Device> {
        self.devices
            .lock()
            .await
            .get(id)
            .map(|known| known.device.clone())
            .ok_or_else(|| GatherError::UnknownObject(id.clone()))
    }

    async fn characteristic(&self, id: &ObjectId) -> Result<bluest::Characteristic> {
        self.characteristics
            .lock()
            .await
            .get(id)
            .map(|handle| handle.characteristic.clone())
            .ok_or_else(|| GatherError::UnknownObject(id.clone()))
    }

    fn check_adapter(&self, adapter: &ObjectId) -> Result<()> {
        if *adapter == self.adapter_id {
            Ok(())
        } else {
            Err(GatherError::UnknownObject(adapter.clone()))
        }
    }

    /// Walks the services and characteristics of a connected peripheral.
    async fn enumerate_gatt(
        &self,
        peripheral: &ObjectId,
        device: &Device,
    ) -> Result<(Vec<DiscoveredObject>, Vec<(ObjectId, CharacteristicHandle)>)> {
        let mut objects = Vec::new();
        let mut handles = Vec::new();
        for service in device.services().await? {
            let service_id = peripheral.child(service.uuid());
            objects.push(DiscoveredObject::service(
                service_id.clone(),
                service.uuid(),
                peripheral.clone(),
            ));
            for characteristic in service.characteristics().await? {
                let uuid = characteristic.uuid();
                let id = service_id.child(uuid);
                objects.push(DiscoveredObject::characteristic(id.clone(), uuid, service_id.clone()));
                handles.push((
                    id,
                    CharacteristicHandle {
                        peripheral: peripheral.clone(),
                        characteristic,
                    },
                ));
            }
        }
        Ok((objects, handles))
    }

    /// Replaces the recorded GATT objects of `peripheral` and announces the difference.
    async fn update_gatt(
        &self,
        peripheral: &ObjectId,
        objects: Vec<DiscoveredObject>,
        handles: Vec<(ObjectId, CharacteristicHandle)>,
    ) {
        {
            let mut characteristics = self.characteristics.lock().await;
            characteristics.retain(|_, handle| handle.peripheral != *peripheral);
            characteristics.extend(handles);
        }

        let previous = self
            .gatt
            .lock()
            .await
            .insert(peripheral.clone(), objects.clone())
            .unwrap_or_default();
        let current: BTreeSet<&ObjectId> = objects.iter().map(|o| &o.id).collect();
        let known: BTreeSet<&ObjectId> = previous.iter().map(|o| &o.id).collect();

        for object in previous.iter().filter(|o| !current.contains(&o.id)) {
            let _ = self.events.send(DiscoveryEvent::Removed(object.id.clone()));
        }
        for object in objects.into_iter().filter(|o| !known.contains(&o.id)) {
            let _ = self.events.send(DiscoveryEvent::Added(object));
        }
    }
}

#[async_trait]
impl BleStack for BluetoothManager {
    async fn managed_objects(&self) -> Result<Vec<DiscoveredObject>> {
        let devices: Vec<_> = self
            .devices
            .lock()
            .await
            .iter()
            .map(|(id, known)| (id.clone(), known.clone()))
            .collect();

        let mut objects = vec![DiscoveredObject::adapter(self.adapter_id.clone())];
        for (id, known) in devices {
            objects.push(DiscoveredObject::peripheral(id.clone(), &known.address));

            let (gatt, handles) = if known.device.is_connected().await {
                match self.enumerate_gatt(&id, &known.device).await {
                    Ok(found) => found,
                    Err(e) => {
                        debug!("GATT enumeration of {} failed: {}", id, e);
                        (Vec::new(), Vec::new())
                    }
                }
            } else {
                (Vec::new(), Vec::new())
            };
            objects.extend(gatt.iter().cloned());
            self.update_gatt(&id, gatt, handles).await;
        }
        Ok(objects)
    }

    async fn start_discovery(&self, adapter: &ObjectId) -> Result<()> {
        self.check_adapter(adapter)?;
        self.scanner.start_scan().await
    }

    async fn stop_discovery(&self, adapter: &ObjectId) -> Result<()> {
        self.check_adapter(adapter)?;
        self.scanner.stop_scan().await
    }

    async fn connect(&self, peripheral: &ObjectId) -> Result<()> {
        let device = self.device(peripheral).await?;
        info!("Initiating connection to {}...", peripheral);
        self.adapter.connect_device(&device).await?;
        if let Err(e) = device.discover_services().await {
            warn!("Service discovery on {} failed: {}", peripheral, e);
        }
        Ok(())
    }

    async fn disconnect(&self, peripheral: &ObjectId) -> Result<()> {
        let device = self.device(peripheral).await?;
        info!("Disconnecting from device {}", peripheral);
        self.adapter.disconnect_device(&device).await?;
        Ok(())
    }

    async fn is_connected(&self, peripheral: &ObjectId) -> Result<bool> {
        Ok(self.device(peripheral).await?.is_connected().await)
    }

    async fn read_value(&self, endpoint: &ObjectId) -> Result<Vec<u8>> {
        Ok(self.characteristic(endpoint).await?.read().await?)
    }

    async fn write_value(&self, endpoint: &ObjectId, value: &[u8]) -> Result<()> {
        self.characteristic(endpoint).await?.write(value).await?;
        Ok(())
    }
}
