//! Telemetry polling
//! Two independent periodic tasks: motion reads and heart-rate measurements.
//! Both re-enumerate endpoints every tick and keep no state between ticks.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

use crate::config::Timing;
use crate::core::bluetooth::{BleStack, HeartRateCommand, HeartRatePair, ObjectId, Registry};
use crate::core::telemetry::{parse_heart_rate, MotionSample, TelemetryRecord};
use crate::error::Result;
use crate::logging::EventLog;

/// Fresh view of the stack's objects, classified with the registry's allow-list.
async fn snapshot(stack: &dyn BleStack, registry: &Mutex<Registry>) -> Result<Registry> {
    let objects = stack.managed_objects().await?;
    Ok(registry.lock().await.snapshot(objects))
}

pub struct MotionPoller {
    stack: Arc<dyn BleStack>,
    registry: Arc<Mutex<Registry>>,
    log: Arc<EventLog>,
    timing: Timing,
}

impl MotionPoller {
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

    /// Reads every motion endpoint once. A failing endpoint is logged and
    /// the next tick retries it.
    pub async fn tick(&self) {
        let endpoints = match snapshot(self.stack.as_ref(), &self.registry).await {
            Ok(snapshot) => snapshot.motion_endpoints(),
            Err(e) => {
                self.log.warn(format!("motion enumeration failed: {}", e));
                return;
            }
        };

        for endpoint in endpoints {
            match self.read(&endpoint).await {
                Ok(record) => self.log.record(&record),
                Err(e) => self.log.warn(format!("{} read failed: {}", endpoint, e)),
            }
        }
    }

    async fn read(&self, endpoint: &ObjectId) -> Result<TelemetryRecord> {
        let data = self.stack.read_value(endpoint).await?;
        let sample = MotionSample::parse(&data)?;
        Ok(TelemetryRecord::motion(endpoint.clone(), sample))
    }

    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.timing.motion_poll());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }
}

pub struct HeartRatePoller {
    stack: Arc<dyn BleStack>,
    registry: Arc<Mutex<Registry>>,
    log: Arc<EventLog>,
    timing: Timing,
}

impl HeartRatePoller {
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

    /// Starts one measurement per complete pair and returns without waiting.
    /// The warm-up outlasts the tick period, so measurements from
    /// consecutive ticks overlap.
    pub async fn tick(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let pairs = match snapshot(self.stack.as_ref(), &self.registry).await {
            Ok(snapshot) => snapshot.heart_rate_pairs(),
            Err(e) => {
                self.log.warn(format!("heart-rate enumeration failed: {}", e));
                return Vec::new();
            }
        };

        pairs
            .into_iter()
            .map(|pair| {
                let this = self.clone();
                tokio::spawn(async move {
                    match this.measure(&pair).await {
                        Ok(record) => this.log.record(&record),
                        Err(e) => this.log.warn(format!("{} measure failed: {}", pair.service, e)),
                    }
                })
            })
            .collect()
    }

    /// Enable, wait, read, disable. A failed disable is only logged; the
    /// reading taken before it is still reported.
    pub async fn measure(&self, pair: &HeartRatePair) -> Result<TelemetryRecord> {
        self.stack
            .write_value(&pair.control, &HeartRateCommand::Enable.to_bytes())
            .await?;
        sleep(self.timing.heart_rate_warmup()).await;

        let data = self.stack.read_value(&pair.value).await?;
        let bpm = parse_heart_rate(&data)?;

        if let Err(e) = self
            .stack
            .write_value(&pair.control, &HeartRateCommand::Disable.to_bytes())
            .await
        {
            self.log.warn(format!("{} disable failed: {}", pair.control, e));
        }
        Ok(TelemetryRecord::heart_rate(pair, bpm))
    }

    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.timing.heart_rate_poll());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }
}
