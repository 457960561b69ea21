//! In-memory stand-ins for the Bluetooth stack and the log file.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::bluetooth::constants::{
    UUID_HEART_RATE_CHAR, UUID_HEART_RATE_CTRL_CHAR, UUID_HEART_RATE_SERVICE, UUID_MOTION_CHAR,
};
use crate::core::bluetooth::{BleStack, DiscoveredObject, ObjectId};
use crate::error::{GatherError, Result};

const MOTION_SERVICE: Uuid = Uuid::from_u128(0x00030000_78fc_48fe_8e23_433b3a1942d0);
const BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);

/// Objects of one sensor: a motion characteristic and a heart-rate pair.
pub(crate) fn sensor_tree(peripheral: &str, address: &str) -> Vec<DiscoveredObject> {
    let id = |suffix: &str| format!("{}/{}", peripheral, suffix);
    vec![
        DiscoveredObject::peripheral(peripheral, address),
        DiscoveredObject::service(id("motion").as_str(), MOTION_SERVICE, peripheral),
        DiscoveredObject::characteristic(id("motion/data").as_str(), UUID_MOTION_CHAR, id("motion").as_str()),
        DiscoveredObject::service(id("battery").as_str(), BATTERY_SERVICE, peripheral),
        DiscoveredObject::service(id("hr").as_str(), UUID_HEART_RATE_SERVICE, peripheral),
        DiscoveredObject::characteristic(id("hr/value").as_str(), UUID_HEART_RATE_CHAR, id("hr").as_str()),
        DiscoveredObject::characteristic(id("hr/ctrl").as_str(), UUID_HEART_RATE_CTRL_CHAR, id("hr").as_str()),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    ManagedObjects,
    StartDiscovery(ObjectId),
    StopDiscovery(ObjectId),
    Connect(ObjectId),
    Disconnect(ObjectId),
    IsConnected(ObjectId),
    Read(ObjectId),
    Write(ObjectId, Vec<u8>),
}

#[derive(Default)]
struct FakeState {
    objects: Vec<DiscoveredObject>,
    connected: BTreeSet<ObjectId>,
    values: BTreeMap<ObjectId, Vec<u8>>,
    failing_reads: BTreeSet<ObjectId>,
    failing_writes: BTreeSet<(ObjectId, Vec<u8>)>,
    connect_failures: BTreeMap<ObjectId, usize>,
    discovery_fails: bool,
    calls: Vec<Call>,
}

pub(crate) struct FakeStack {
    state: Mutex<FakeState>,
}

impl FakeStack {
    pub(crate) fn new() -> Self {
        let stack = Self {
            state: Mutex::new(FakeState::default()),
        };
        stack.add_objects([DiscoveredObject::adapter("hci0")]);
        stack
    }

    fn with<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub(crate) fn add_objects(&self, objects: impl IntoIterator<Item = DiscoveredObject>) {
        self.with(|s| s.objects.extend(objects));
    }

    pub(crate) fn remove_object(&self, id: &str) {
        let id = ObjectId::from(id);
        self.with(|s| s.objects.retain(|o| o.id != id));
    }

    pub(crate) fn set_connected(&self, id: &str, connected: bool) {
        self.with(|s| {
            if connected {
                s.connected.insert(id.into());
            } else {
                s.connected.remove(&ObjectId::from(id));
            }
        });
    }

    pub(crate) fn is_connected_now(&self, id: &str) -> bool {
        self.with(|s| s.connected.contains(&ObjectId::from(id)))
    }

    pub(crate) fn set_value(&self, id: &str, value: Vec<u8>) {
        self.with(|s| s.values.insert(id.into(), value));
    }

    pub(crate) fn fail_reads(&self, id: &str) {
        self.with(|s| s.failing_reads.insert(id.into()));
    }

    pub(crate) fn fail_writes_of(&self, id: &str, value: Vec<u8>) {
        self.with(|s| s.failing_writes.insert((id.into(), value)));
    }

    pub(crate) fn fail_connects(&self, id: &str, times: usize) {
        self.with(|s| s.connect_failures.insert(id.into(), times));
    }

    pub(crate) fn fail_discovery(&self) {
        self.with(|s| s.discovery_fails = true);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.with(|s| s.calls.clone())
    }

    pub(crate) fn connects(&self) -> Vec<ObjectId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Connect(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn disconnects(&self) -> Vec<ObjectId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Disconnect(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}

fn failed(detail: &str) -> GatherError {
    GatherError::Transport(format!("org.bluez.Error.Failed: {}", detail))
}

#[async_trait]
impl BleStack for FakeStack {
    async fn managed_objects(&self) -> Result<Vec<DiscoveredObject>> {
        Ok(self.with(|s| {
            s.calls.push(Call::ManagedObjects);
            s.objects.clone()
        }))
    }

    async fn start_discovery(&self, adapter: &ObjectId) -> Result<()> {
        self.with(|s| {
            s.calls.push(Call::StartDiscovery(adapter.clone()));
            if s.discovery_fails {
                return Err(GatherError::DiscoveryActive);
            }
            Ok(())
        })
    }

    async fn stop_discovery(&self, adapter: &ObjectId) -> Result<()> {
        self.with(|s| {
            s.calls.push(Call::StopDiscovery(adapter.clone()));
            if s.discovery_fails {
                return Err(GatherError::DiscoveryInactive);
            }
            Ok(())
        })
    }

    async fn connect(&self, peripheral: &ObjectId) -> Result<()> {
        self.with(|s| {
            s.calls.push(Call::Connect(peripheral.clone()));
            if let Some(remaining) = s.connect_failures.get_mut(peripheral) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(failed("le-connection-abort-by-local"));
                }
            }
            s.connected.insert(peripheral.clone());
            Ok(())
        })
    }

    async fn disconnect(&self, peripheral: &ObjectId) -> Result<()> {
        self.with(|s| {
            s.calls.push(Call::Disconnect(peripheral.clone()));
            s.connected.remove(peripheral);
            Ok(())
        })
    }

    async fn is_connected(&self, peripheral: &ObjectId) -> Result<bool> {
        self.with(|s| {
            s.calls.push(Call::IsConnected(peripheral.clone()));
            Ok(s.connected.contains(peripheral))
        })
    }

    async fn read_value(&self, endpoint: &ObjectId) -> Result<Vec<u8>> {
        self.with(|s| {
            s.calls.push(Call::Read(endpoint.clone()));
            if s.failing_reads.contains(endpoint) {
                return Err(failed("Not connected"));
            }
            s.values
                .get(endpoint)
                .cloned()
                .ok_or_else(|| GatherError::UnknownObject(endpoint.clone()))
        })
    }

    async fn write_value(&self, endpoint: &ObjectId, value: &[u8]) -> Result<()> {
        self.with(|s| {
            s.calls.push(Call::Write(endpoint.clone(), value.to_vec()));
            if s.failing_writes.contains(&(endpoint.clone(), value.to_vec())) {
                return Err(failed("Operation is not supported"));
            }
            Ok(())
        })
    }
}

/// Clonable in-memory writer; every clone appends to the same buffer.
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub(crate) fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
