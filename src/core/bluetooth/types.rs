//! Defines shared data structures for the Bluetooth module.

use std::fmt;

use bluest::{Characteristic, Device};
use serde::Serialize;
use uuid::Uuid;

/// Opaque handle of an object known to the Bluetooth stack.
///
/// Ids never contain whitespace, so they can be used as fields of a
/// space-delimited log line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let sanitized = raw
            .as_ref()
            .chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect();
        Self(sanitized)
    }

    /// Derives the id of a GATT object nested below this one.
    pub fn child(&self, uuid: Uuid) -> Self {
        Self(format!("{}/{}", self.0, uuid))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// What kind of object a discovery event describes, with the attributes
/// the registry needs to classify it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectRole {
    Adapter,
    Peripheral {
        /// Hardware address, upper case, colon separated.
        address: String,
    },
    Service {
        uuid: Uuid,
        peripheral: ObjectId,
    },
    Characteristic {
        uuid: Uuid,
        /// Parent service reference.
        service: ObjectId,
    },
}

/// An object as reported by the stack, either in an enumeration or an added event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredObject {
    pub id: ObjectId,
    pub role: ObjectRole,
}

impl DiscoveredObject {
    pub fn new(id: ObjectId, role: ObjectRole) -> Self {
        Self { id, role }
    }

    pub fn adapter(id: impl Into<ObjectId>) -> Self {
        Self::new(id.into(), ObjectRole::Adapter)
    }

    pub fn peripheral(id: impl Into<ObjectId>, address: &str) -> Self {
        Self::new(
            id.into(),
            ObjectRole::Peripheral {
                address: address.to_uppercase(),
            },
        )
    }

    pub fn service(id: impl Into<ObjectId>, uuid: Uuid, peripheral: impl Into<ObjectId>) -> Self {
        Self::new(
            id.into(),
            ObjectRole::Service {
                uuid,
                peripheral: peripheral.into(),
            },
        )
    }

    pub fn characteristic(id: impl Into<ObjectId>, uuid: Uuid, service: impl Into<ObjectId>) -> Self {
        Self::new(
            id.into(),
            ObjectRole::Characteristic {
                uuid,
                service: service.into(),
            },
        )
    }
}

/// Discovery event delivered by the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Added(DiscoveredObject),
    Removed(ObjectId),
}

/// A heart-rate value characteristic and its control characteristic,
/// correlated through their shared parent service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct HeartRatePair {
    pub service: ObjectId,
    pub value: ObjectId,
    pub control: ObjectId,
}

/// A peripheral found by the scanner together with its live bluest handle.
#[derive(Clone)]
pub struct KnownDevice {
    pub device: Device,
    pub address: String,
}

/// A characteristic handle resolved during the last GATT enumeration.
#[derive(Clone)]
pub struct CharacteristicHandle {
    pub peripheral: ObjectId,
    pub characteristic: Characteristic,
}
