//! Sensor payload decoding
//! Turns raw characteristic values into telemetry records for the event log.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::core::bluetooth::{HeartRatePair, ObjectId};
use crate::logging::Timestamp;

/// Motion payload size: three little-endian i16 axes.
pub const MOTION_PAYLOAD_LEN: usize = 6;

/// Index of the beats-per-minute byte in a heart-rate payload.
pub const HEART_RATE_BPM_OFFSET: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("motion payload must be {MOTION_PAYLOAD_LEN} bytes, got {0}")]
    MotionLength(usize),
    #[error("heart-rate payload too short: {0} bytes")]
    HeartRateLength(usize),
}

/// One 3-axis motion sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MotionSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl MotionSample {
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() != MOTION_PAYLOAD_LEN {
            return Err(DecodeError::MotionLength(data.len()));
        }
        Ok(Self {
            x: i16::from_le_bytes([data[0], data[1]]),
            y: i16::from_le_bytes([data[2], data[3]]),
            z: i16::from_le_bytes([data[4], data[5]]),
        })
    }
}

pub fn parse_heart_rate(data: &[u8]) -> Result<u8, DecodeError> {
    data.get(HEART_RATE_BPM_OFFSET)
        .copied()
        .ok_or(DecodeError::HeartRateLength(data.len()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Reading {
    Motion {
        endpoint: ObjectId,
        sample: MotionSample,
    },
    HeartRate {
        value: ObjectId,
        control: ObjectId,
        bpm: u8,
    },
}

/// A decoded reading stamped with the time it was taken.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub timestamp: Timestamp,
    pub reading: Reading,
}

impl TelemetryRecord {
    pub fn motion(endpoint: ObjectId, sample: MotionSample) -> Self {
        Self {
            timestamp: Timestamp::now(),
            reading: Reading::Motion { endpoint, sample },
        }
    }

    pub fn heart_rate(pair: &HeartRatePair, bpm: u8) -> Self {
        Self {
            timestamp: Timestamp::now(),
            reading: Reading::HeartRate {
                value: pair.value.clone(),
                control: pair.control.clone(),
                bpm,
            },
        }
    }
}

/// The structured part of a log line, without the timestamp.
impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Motion { endpoint, sample } => {
                write!(f, "! motion {} {} {} {}", endpoint, sample.x, sample.y, sample.z)
            }
            Self::HeartRate {
                value,
                control,
                bpm,
            } => write!(f, "! hr {} {} {}", value, control, bpm),
        }
    }
}
