//! Application state management
//! The shared handles every task receives, and the tasks themselves.

use std::sync::Arc;

use log::info;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::GatherConfig;
use crate::core::bluetooth::{BleStack, DiscoveryEvent, EntityKind, Registry, Transition};
use crate::core::{HeartRatePoller, MotionPoller, Reconciler};
use crate::logging::EventLog;

pub struct AppState {
    pub stack: Arc<dyn BleStack>,
    pub registry: Arc<Mutex<Registry>>,
    pub log: Arc<EventLog>,
    pub config: GatherConfig,
    reconciler: Arc<Reconciler>,
}

impl AppState {
    pub fn new(stack: Arc<dyn BleStack>, log: Arc<EventLog>, config: GatherConfig) -> Self {
        let registry = Arc::new(Mutex::new(Registry::new(&config.allow_list)));
        let reconciler = Arc::new(Reconciler::new(
            stack.clone(),
            registry.clone(),
            log.clone(),
            config.timing.clone(),
        ));
        Self {
            stack,
            registry,
            log,
            config,
            reconciler,
        }
    }

    /// Feeds the stack's current objects through the registry as added
    /// events and starts discovery on every adapter.
    pub async fn populate(&self) -> Vec<JoinHandle<()>> {
        let objects = match self.stack.managed_objects().await {
            Ok(objects) => objects,
            Err(e) => {
                self.log.warn(format!("initial enumeration failed: {}", e));
                return Vec::new();
            }
        };
        info!("Initial enumeration returned {} objects", objects.len());

        let mut spawned = Vec::new();
        for object in objects {
            if let Some(handle) = self.handle_event(DiscoveryEvent::Added(object)).await {
                spawned.push(handle);
            }
        }
        spawned
    }

    /// Applies one discovery event and reacts to it. A newly discovered
    /// peripheral gets a reconnect task, whose handle is returned.
    pub async fn handle_event(&self, event: DiscoveryEvent) -> Option<JoinHandle<()>> {
        let transition = self.registry.lock().await.apply(event)?;
        self.log.info(&transition);

        match transition {
            Transition::Added(adapter, EntityKind::Adapter) => {
                self.log.info(format!("{} starting discovery", adapter));
                if let Err(e) = self.stack.start_discovery(&adapter).await {
                    self.log.warn(format!("{} start discovery failed: {}", adapter, e));
                }
                None
            }
            Transition::Added(peripheral, EntityKind::Device) => {
                let reconciler = self.reconciler.clone();
                Some(tokio::spawn(async move {
                    reconciler.on_peripheral_added(peripheral).await;
                }))
            }
            _ => None,
        }
    }

    /// Spawns the event drain and the four periodic tasks. None of them return.
    pub fn spawn_tasks(self: &Arc<Self>, mut events: UnboundedReceiver<DiscoveryEvent>) -> Vec<JoinHandle<()>> {
        let timing = &self.config.timing;
        let motion = Arc::new(MotionPoller::new(
            self.stack.clone(),
            self.registry.clone(),
            self.log.clone(),
            timing.clone(),
        ));
        let heart_rate = Arc::new(HeartRatePoller::new(
            self.stack.clone(),
            self.registry.clone(),
            self.log.clone(),
            timing.clone(),
        ));

        let state = self.clone();
        let drain = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                state.handle_event(event).await;
            }
            info!("Discovery event channel closed");
        });

        vec![
            drain,
            tokio::spawn(self.reconciler.clone().run_soft()),
            tokio::spawn(self.reconciler.clone().run_hard()),
            tokio::spawn(motion.run()),
            tokio::spawn(heart_rate.run()),
        ]
    }
}
