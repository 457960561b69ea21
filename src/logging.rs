//! Event log
//! Append-only, timestamp-prefixed text sink shared by every task.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn, Level};
use serde::{Serialize, Serializer};

use crate::core::telemetry::TelemetryRecord;

/// Wall-clock instant, printed as unix seconds with six decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.timestamp() as f64 + f64::from(self.0.timestamp_subsec_micros()) / 1_000_000.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.0.timestamp(), self.0.timestamp_subsec_micros())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_secs_f64())
    }
}

/// Every line is written and flushed under one lock, so lines from
/// concurrent tasks never interleave.
pub struct EventLog {
    out: Mutex<Box<dyn Write + Send>>,
}

impl EventLog {
    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::from_writer(file))
    }

    pub fn from_writer(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.line(Level::Info, Timestamp::now(), message);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.line(Level::Warn, Timestamp::now(), message);
    }

    pub fn record(&self, record: &TelemetryRecord) {
        self.line(Level::Debug, record.timestamp, &record.reading);
    }

    fn line(&self, level: Level, at: Timestamp, message: impl fmt::Display) {
        let line = format!("{} {}\n", at, message);
        match level {
            Level::Error | Level::Warn => warn!("{}", message),
            Level::Info => info!("{}", message),
            Level::Debug | Level::Trace => debug!("{}", message),
        }

        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = out.write_all(line.as_bytes()).and_then(|()| out.flush()) {
            error!("Failed to append to event log: {}", e);
        }
    }
}
