//! Connection reconciliation
//! Keeps every allow-listed peripheral connected. A frequent soft tick
//! reconnects dropped peripherals; a rare hard tick restarts discovery and
//! cycles every connection to clear stuck stack state.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, sleep, Instant, MissedTickBehavior};

use crate::config::Timing;
use crate::core::bluetooth::{BleStack, ObjectId, Registry};
use crate::error::Result;
use crate::logging::EventLog;

pub struct Reconciler {
    stack: Arc<dyn BleStack>,
    registry: Arc<Mutex<Registry>>,
    log: Arc<EventLog>,
    timing: Timing,
}

impl Reconciler {
    pub fn new(
        stack: Arc<dyn BleStack>,
        registry: Arc<Mutex<Registry>>,
        log: Arc<EventLog>,
        timing: Timing,
    ) -> Self {
        Self {
            stack,
            registry,
            log,
            timing,
        }
    }

    /// Allow-listed peripherals, enumerated fresh from the stack.
    async fn peripherals(&self) -> Result<Vec<ObjectId>> {
        let objects = self.stack.managed_objects().await?;
        let snapshot = self.registry.lock().await.snapshot(objects);
        Ok(snapshot.peripherals())
    }

    async fn adapters(&self) -> Result<Vec<ObjectId>> {
        let objects = self.stack.managed_objects().await?;
        let snapshot = self.registry.lock().await.snapshot(objects);
        Ok(snapshot.adapters())
    }

    /// Starts a connect attempt for every disconnected peripheral without
    /// waiting for it. Never disconnects.
    pub async fn soft_tick(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let peripherals = match self.peripherals().await {
            Ok(peripherals) => peripherals,
            Err(e) => {
                self.log.warn(format!("peripheral enumeration failed: {}", e));
                return Vec::new();
            }
        };

        let mut attempts = Vec::new();
        for peripheral in peripherals {
            match self.stack.is_connected(&peripheral).await {
                Ok(true) => {
                    self.registry.lock().await.observe_connection(&peripheral, true);
                }
                Ok(false) => {
                    let (token, dropped) = {
                        let mut registry = self.registry.lock().await;
                        let Some(token) = registry.begin_connect(&peripheral) else {
                            debug!("{} connect already pending", peripheral);
                            continue;
                        };
                        (token, registry.observe_connection(&peripheral, false))
                    };
                    if dropped {
                        self.log.info(format!("{} disconnected", peripheral));
                    }
                    self.log.info(format!("{} trying to reconnect", peripheral));
                    let this = self.clone();
                    attempts.push(tokio::spawn(async move {
                        this.connect_once(&peripheral).await;
                        this.registry.lock().await.end_connect(&peripheral, token);
                    }));
                }
                Err(e) => self.log.warn(format!("{} connection check failed: {}", peripheral, e)),
            }
        }
        attempts
    }

    /// Restarts discovery, then disconnects and reconnects every peripheral.
    pub async fn hard_tick(&self) {
        self.log.info("hard reset started");
        let adapters = self.adapters().await.unwrap_or_else(|e| {
            self.log.warn(format!("adapter enumeration failed: {}", e));
            Vec::new()
        });
        for adapter in &adapters {
            if let Err(e) = self.stack.start_discovery(adapter).await {
                self.log.warn(format!("{} start discovery failed: {}", adapter, e));
            }
        }
        sleep(self.timing.discovery_settle()).await;

        match self.peripherals().await {
            Ok(peripherals) => {
                for peripheral in peripherals {
                    self.reset_peripheral(&peripheral).await;
                }
            }
            Err(e) => self.log.warn(format!("peripheral enumeration failed: {}", e)),
        }

        for adapter in &adapters {
            if let Err(e) = self.stack.stop_discovery(adapter).await {
                self.log.warn(format!("{} stop discovery failed: {}", adapter, e));
            }
        }
        self.log.info("hard reset finished");
    }

    async fn reset_peripheral(&self, peripheral: &ObjectId) {
        match self.stack.is_connected(peripheral).await {
            Ok(true) => {
                if let Err(e) = self.stack.disconnect(peripheral).await {
                    self.log.warn(format!("{} disconnect failed: {}", peripheral, e));
                    return;
                }
                self.registry.lock().await.observe_connection(peripheral, false);
                self.log.info(format!("{} disconnected", peripheral));
                sleep(self.timing.disconnect_settle()).await;
            }
            Ok(false) => {}
            Err(e) => {
                self.log.warn(format!("{} connection check failed: {}", peripheral, e));
                return;
            }
        }

        let Some(token) = self.registry.lock().await.begin_connect(peripheral) else {
            debug!("{} connect already pending", peripheral);
            return;
        };
        self.connect_once(peripheral).await;
        self.registry.lock().await.end_connect(peripheral, token);
    }

    async fn connect_once(&self, peripheral: &ObjectId) {
        match self.stack.connect(peripheral).await {
            Ok(()) => self.connected(peripheral).await,
            Err(e) => self.log.warn(format!("{} connection failed: {}", peripheral, e)),
        }
    }

    async fn connected(&self, peripheral: &ObjectId) {
        self.registry.lock().await.observe_connection(peripheral, true);
        self.log.info(format!("{} connected", peripheral));
    }

    /// Reports the connection state of a newly discovered peripheral and
    /// starts the reconnect loop if it is not connected.
    pub async fn on_peripheral_added(&self, peripheral: ObjectId) {
        match self.stack.is_connected(&peripheral).await {
            Ok(true) => self.connected(&peripheral).await,
            Ok(false) => self.reconnect_until_connected(peripheral).await,
            Err(e) => {
                self.log.warn(format!("{} connection check failed: {}", peripheral, e));
                self.reconnect_until_connected(peripheral).await;
            }
        }
    }

    /// Retries connecting to a newly discovered peripheral until it succeeds,
    /// the peripheral disappears from the registry, or a later attempt takes
    /// over its connect guard.
    pub async fn reconnect_until_connected(&self, peripheral: ObjectId) {
        let Some(token) = self.registry.lock().await.begin_connect(&peripheral) else {
            debug!("{} connect already pending", peripheral);
            return;
        };

        let retry = self.timing.reconnect_retry();
        loop {
            let (known, owned) = {
                let registry = self.registry.lock().await;
                (
                    registry.contains_peripheral(&peripheral),
                    registry.holds_connect(&peripheral, token),
                )
            };
            if !known {
                self.log.info(format!("{} disappeared, not reconnecting", peripheral));
                break;
            }
            if !owned {
                debug!("{} reconnect handed over to a newer attempt", peripheral);
                return;
            }
            self.log.info(format!("{} trying to reconnect", peripheral));
            match self.stack.connect(&peripheral).await {
                Ok(()) => {
                    self.connected(&peripheral).await;
                    break;
                }
                Err(e) => {
                    self.log.warn(format!(
                        "{} connection failed retrying in {}s: {}",
                        peripheral,
                        retry.as_secs(),
                        e
                    ));
                    sleep(retry).await;
                }
            }
        }

        self.registry.lock().await.end_connect(&peripheral, token);
    }

    pub async fn run_soft(self: Arc<Self>) {
        let mut ticker = interval(self.timing.soft_reconcile());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.soft_tick().await;
        }
    }

    /// The first hard reset runs one full period after start.
    pub async fn run_hard(self: Arc<Self>) {
        let period: Duration = self.timing.hard_reconcile();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.hard_tick().await;
        }
    }
}
