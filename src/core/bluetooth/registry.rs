//! Device registry
//! Classifies discovery events into adapters, allow-listed peripherals and
//! telemetry endpoints, and answers which endpoints are currently usable.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use uuid::Uuid;

use crate::core::bluetooth::constants::{
    UUID_HEART_RATE_CHAR, UUID_HEART_RATE_CTRL_CHAR, UUID_HEART_RATE_SERVICE, UUID_MOTION_CHAR,
};
use crate::core::bluetooth::types::{
    DiscoveredObject, DiscoveryEvent, HeartRatePair, ObjectId, ObjectRole,
};

/// Kind of entity a registry transition refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Adapter,
    Device,
    MotionChar,
    HeartRateService,
    HeartRateChar,
    HeartRateCtrl,
}

impl EntityKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Adapter => "adapter",
            Self::Device => "device",
            Self::MotionChar => "motion char",
            Self::HeartRateService => "heartrate svc",
            Self::HeartRateChar => "heartrate char",
            Self::HeartRateCtrl => "heartrate ctrl",
        }
    }
}

/// A change to the registry worth logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Added(ObjectId, EntityKind),
    Removed(ObjectId, EntityKind),
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added(id, kind) => write!(f, "{} {} discovered", id, kind.label()),
            Self::Removed(id, kind) => write!(f, "{} {} removed", id, kind.label()),
        }
    }
}

/// Proof of holding a peripheral's pending-connect guard. Removing the
/// peripheral or handing the guard to a later attempt invalidates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectToken(u64);

#[derive(Debug, Clone)]
struct ServiceEntry {
    uuid: Uuid,
    peripheral: ObjectId,
}

/// Bookkeeping over the objects the stack reported.
///
/// Endpoints are stored with their parent service and services with their
/// peripheral, so every query can check that an endpoint still hangs off an
/// allow-listed peripheral that has not been removed.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    allow_list: BTreeSet<String>,
    adapters: BTreeSet<ObjectId>,
    peripherals: BTreeMap<ObjectId, String>,
    services: BTreeMap<ObjectId, ServiceEntry>,
    motion: BTreeMap<ObjectId, ObjectId>,
    heart_rate_values: BTreeMap<ObjectId, ObjectId>,
    heart_rate_controls: BTreeMap<ObjectId, ObjectId>,
    connecting: BTreeMap<ObjectId, ConnectToken>,
    next_token: u64,
    /// Peripherals the last connection check found connected
    observed_connected: BTreeSet<ObjectId>,
}

impl Registry {
    pub fn new<I, S>(allow_list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allow_list: allow_list
                .into_iter()
                .map(|address| address.as_ref().to_uppercase())
                .collect(),
            ..Self::default()
        }
    }

    /// Builds a registry from a fresh enumeration, using the same allow-list.
    pub fn snapshot(&self, objects: impl IntoIterator<Item = DiscoveredObject>) -> Self {
        let mut registry = Self {
            allow_list: self.allow_list.clone(),
            ..Self::default()
        };
        for object in objects {
            registry.insert(object);
        }
        registry
    }

    pub fn apply(&mut self, event: DiscoveryEvent) -> Option<Transition> {
        match event {
            DiscoveryEvent::Added(object) => self.insert(object),
            DiscoveryEvent::Removed(id) => self.remove(&id),
        }
    }

    pub fn insert(&mut self, object: DiscoveredObject) -> Option<Transition> {
        let DiscoveredObject { id, role } = object;
        let kind = match role {
            ObjectRole::Adapter => {
                self.adapters.insert(id.clone()).then_some(EntityKind::Adapter)
            }
            ObjectRole::Peripheral { address } => {
                if !self.allow_list.contains(&address.to_uppercase()) {
                    return None;
                }
                self.peripherals
                    .insert(id.clone(), address)
                    .is_none()
                    .then_some(EntityKind::Device)
            }
            ObjectRole::Service { uuid, peripheral } => {
                let fresh = self
                    .services
                    .insert(id.clone(), ServiceEntry { uuid, peripheral })
                    .is_none();
                (fresh && uuid == UUID_HEART_RATE_SERVICE).then_some(EntityKind::HeartRateService)
            }
            ObjectRole::Characteristic { uuid, service } => {
                let (map, kind) = if uuid == UUID_MOTION_CHAR {
                    (&mut self.motion, EntityKind::MotionChar)
                } else if uuid == UUID_HEART_RATE_CHAR {
                    (&mut self.heart_rate_values, EntityKind::HeartRateChar)
                } else if uuid == UUID_HEART_RATE_CTRL_CHAR {
                    (&mut self.heart_rate_controls, EntityKind::HeartRateCtrl)
                } else {
                    return None;
                };
                map.insert(id.clone(), service).is_none().then_some(kind)
            }
        };
        kind.map(|kind| Transition::Added(id, kind))
    }

    /// Forgets `id`. Endpoints of a removed peripheral stay recorded but are
    /// no longer returned by any query.
    pub fn remove(&mut self, id: &ObjectId) -> Option<Transition> {
        let kind = if self.adapters.remove(id) {
            EntityKind::Adapter
        } else if self.peripherals.remove(id).is_some() {
            self.connecting.remove(id);
            self.observed_connected.remove(id);
            EntityKind::Device
        } else if let Some(entry) = self.services.remove(id) {
            if entry.uuid != UUID_HEART_RATE_SERVICE {
                return None;
            }
            EntityKind::HeartRateService
        } else if self.motion.remove(id).is_some() {
            EntityKind::MotionChar
        } else if self.heart_rate_values.remove(id).is_some() {
            EntityKind::HeartRateChar
        } else if self.heart_rate_controls.remove(id).is_some() {
            EntityKind::HeartRateCtrl
        } else {
            return None;
        };
        Some(Transition::Removed(id.clone(), kind))
    }

    pub fn adapters(&self) -> Vec<ObjectId> {
        self.adapters.iter().cloned().collect()
    }

    pub fn peripherals(&self) -> Vec<ObjectId> {
        self.peripherals.keys().cloned().collect()
    }

    pub fn contains_peripheral(&self, id: &ObjectId) -> bool {
        self.peripherals.contains_key(id)
    }

    /// Allow-listed peripheral owning `service`, if both are still known.
    pub fn owner_of(&self, service: &ObjectId) -> Option<&ObjectId> {
        self.services
            .get(service)
            .map(|entry| &entry.peripheral)
            .filter(|peripheral| self.peripherals.contains_key(*peripheral))
    }

    pub fn motion_endpoints(&self) -> Vec<ObjectId> {
        self.motion
            .iter()
            .filter(|(_, service)| self.owner_of(service).is_some())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Complete value/control pairs, one per heart-rate service. Services
    /// missing either half are skipped.
    pub fn heart_rate_pairs(&self) -> Vec<HeartRatePair> {
        self.services
            .iter()
            .filter(|(id, entry)| {
                entry.uuid == UUID_HEART_RATE_SERVICE && self.owner_of(id).is_some()
            })
            .filter_map(|(service, _)| {
                let value = Self::child_of(&self.heart_rate_values, service)?;
                let control = Self::child_of(&self.heart_rate_controls, service)?;
                Some(HeartRatePair {
                    service: service.clone(),
                    value,
                    control,
                })
            })
            .collect()
    }

    fn child_of(map: &BTreeMap<ObjectId, ObjectId>, service: &ObjectId) -> Option<ObjectId> {
        map.iter()
            .find(|(_, parent)| *parent == service)
            .map(|(id, _)| id.clone())
    }

    /// Marks a connect attempt as outstanding. Returns `None` if one already is.
    pub fn begin_connect(&mut self, peripheral: &ObjectId) -> Option<ConnectToken> {
        if self.connecting.contains_key(peripheral) {
            return None;
        }
        self.next_token += 1;
        let token = ConnectToken(self.next_token);
        self.connecting.insert(peripheral.clone(), token);
        Some(token)
    }

    pub fn holds_connect(&self, peripheral: &ObjectId, token: ConnectToken) -> bool {
        self.connecting.get(peripheral) == Some(&token)
    }

    /// Releases the guard, unless it has since passed to another attempt.
    pub fn end_connect(&mut self, peripheral: &ObjectId, token: ConnectToken) {
        if self.holds_connect(peripheral, token) {
            self.connecting.remove(peripheral);
        }
    }

    pub fn is_connecting(&self, peripheral: &ObjectId) -> bool {
        self.connecting.contains_key(peripheral)
    }

    /// Records the latest connection check and returns whether the previous
    /// one had found the peripheral connected.
    pub fn observe_connection(&mut self, peripheral: &ObjectId, connected: bool) -> bool {
        if connected {
            !self.observed_connected.insert(peripheral.clone())
        } else {
            self.observed_connected.remove(peripheral)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sensor_tree;

    const A1: &str = "C4:0E:54:C5:A9:EA";
    const B2: &str = "DB:47:A9:51:E7:68";

    fn registry() -> Registry {
        Registry::new([A1, B2])
    }

    #[test]
    fn filters_peripherals_by_allow_list() {
        let mut registry = registry();
        assert_eq!(
            registry.insert(DiscoveredObject::peripheral("dev_a", &A1.to_lowercase())),
            Some(Transition::Added("dev_a".into(), EntityKind::Device))
        );
        assert_eq!(
            registry.insert(DiscoveredObject::peripheral("dev_x", "00:11:22:33:44:55")),
            None
        );
        assert_eq!(registry.peripherals(), vec![ObjectId::from("dev_a")]);
    }

    #[test]
    fn replay_keeps_added_but_not_removed() {
        let events = [
            ("add", "dev_a", A1),
            ("add", "dev_x", "00:11:22:33:44:55"),
            ("add", "dev_b", B2),
            ("remove", "dev_a", A1),
            ("remove", "dev_x", "00:11:22:33:44:55"),
            ("add", "dev_a", A1),
            ("remove", "dev_b", B2),
            ("remove", "dev_b", B2),
            ("add", "dev_b2", B2),
        ];

        let mut registry = registry();
        let mut expected = BTreeSet::new();
        for (op, id, address) in events {
            let allowed = address == A1 || address == B2;
            if op == "add" {
                registry.apply(DiscoveryEvent::Added(DiscoveredObject::peripheral(id, address)));
                if allowed {
                    expected.insert(ObjectId::from(id));
                }
            } else {
                registry.apply(DiscoveryEvent::Removed(id.into()));
                expected.remove(&ObjectId::from(id));
            }
            let current: BTreeSet<_> = registry.peripherals().into_iter().collect();
            assert_eq!(current, expected);
        }
    }

    #[test]
    fn pairs_heart_rate_endpoints_in_any_order() {
        let objects = sensor_tree("dev_a", A1)
            .into_iter()
            .chain(sensor_tree("dev_b", B2))
            .collect::<Vec<_>>();

        let forward = registry().snapshot(objects.clone());
        let backward = registry().snapshot(objects.into_iter().rev());

        assert_eq!(forward.heart_rate_pairs().len(), 2);
        assert_eq!(forward.heart_rate_pairs(), backward.heart_rate_pairs());
        let pair = &forward.heart_rate_pairs()[0];
        assert_eq!(pair.value, ObjectId::from("dev_a/hr/value"));
        assert_eq!(pair.control, ObjectId::from("dev_a/hr/ctrl"));
    }

    #[test]
    fn pairs_by_parent_service_not_path() {
        let mut registry = registry();
        registry.insert(DiscoveredObject::peripheral("dev_a", A1));
        registry.insert(DiscoveredObject::service("svc1", UUID_HEART_RATE_SERVICE, "dev_a"));
        registry.insert(DiscoveredObject::service("svc10", UUID_HEART_RATE_SERVICE, "dev_a"));
        // "svc10/char" would prefix-match "svc1" as well
        registry.insert(DiscoveredObject::characteristic("svc10/value", UUID_HEART_RATE_CHAR, "svc10"));
        registry.insert(DiscoveredObject::characteristic("svc10/ctrl", UUID_HEART_RATE_CTRL_CHAR, "svc10"));
        registry.insert(DiscoveredObject::characteristic("svc1/ctrl", UUID_HEART_RATE_CTRL_CHAR, "svc1"));

        let pairs = registry.heart_rate_pairs();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].service, ObjectId::from("svc10"));
    }

    #[test]
    fn endpoints_of_removed_peripheral_are_hidden() {
        let mut registry = registry().snapshot(sensor_tree("dev_a", A1));
        assert_eq!(registry.motion_endpoints().len(), 1);
        assert_eq!(registry.heart_rate_pairs().len(), 1);

        assert_eq!(
            registry.remove(&"dev_a".into()),
            Some(Transition::Removed("dev_a".into(), EntityKind::Device))
        );
        assert!(registry.motion_endpoints().is_empty());
        assert!(registry.heart_rate_pairs().is_empty());
    }

    #[test]
    fn removing_heart_rate_service_breaks_pair() {
        let mut registry = registry().snapshot(sensor_tree("dev_a", A1));
        let transition = registry.remove(&"dev_a/hr".into());
        assert_eq!(transition.map(|t| t.to_string()).as_deref(), Some("dev_a/hr heartrate svc removed"));
        assert!(registry.heart_rate_pairs().is_empty());
        assert_eq!(registry.motion_endpoints().len(), 1);
    }

    #[test]
    fn transitions_use_log_wording() {
        let mut registry = registry();
        let lines: Vec<String> = sensor_tree("dev_a", A1)
            .into_iter()
            .filter_map(|object| registry.insert(object))
            .map(|t| t.to_string())
            .collect();
        assert!(lines.contains(&"dev_a device discovered".to_string()));
        assert!(lines.contains(&"dev_a/motion/data motion char discovered".to_string()));
        assert!(lines.contains(&"dev_a/hr heartrate svc discovered".to_string()));
        assert!(lines.contains(&"dev_a/hr/value heartrate char discovered".to_string()));
        assert!(lines.contains(&"dev_a/hr/ctrl heartrate ctrl discovered".to_string()));
        // duplicates are not transitions
        assert_eq!(registry.insert(DiscoveredObject::peripheral("dev_a", A1)), None);
    }

    #[test]
    fn connect_guard_is_exclusive() {
        let mut registry = registry();
        let id = ObjectId::from("dev_a");
        registry.insert(DiscoveredObject::peripheral("dev_a", A1));
        let token = registry.begin_connect(&id).unwrap();
        assert!(registry.begin_connect(&id).is_none());
        registry.end_connect(&id, token);
        assert!(!registry.is_connecting(&id));
    }

    #[test]
    fn removal_invalidates_connect_guard() {
        let mut registry = registry();
        let id = ObjectId::from("dev_a");
        registry.insert(DiscoveredObject::peripheral("dev_a", A1));
        let stale = registry.begin_connect(&id).unwrap();

        registry.remove(&id);
        registry.insert(DiscoveredObject::peripheral("dev_a", A1));
        let current = registry.begin_connect(&id).unwrap();
        assert!(!registry.holds_connect(&id, stale));

        // the stale owner must not release the new owner's guard
        registry.end_connect(&id, stale);
        assert!(registry.holds_connect(&id, current));
        registry.end_connect(&id, current);
        assert!(!registry.is_connecting(&id));
    }

    #[test]
    fn reports_only_connected_to_disconnected_drops() {
        let mut registry = registry();
        let id = ObjectId::from("dev_a");
        assert!(!registry.observe_connection(&id, false));
        assert!(!registry.observe_connection(&id, true));
        assert!(registry.observe_connection(&id, true));
        assert!(registry.observe_connection(&id, false));
        assert!(!registry.observe_connection(&id, false));
    }
}
