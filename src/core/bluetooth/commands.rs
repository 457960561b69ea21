//! Heart-rate sensor control commands
//! Written to the control characteristic paired with a heart-rate value characteristic.

/// Heart-rate control commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartRateCommand {
    /// Start acquiring a measurement (0x01)
    Enable,
    /// Stop acquiring (0x00)
    Disable,
}

impl HeartRateCommand {
    /// Convert the command to its byte representation
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Enable => vec![0x01],
            Self::Disable => vec![0x00],
        }
    }
}
