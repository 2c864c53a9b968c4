use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest payload a CAN FD frame can carry
pub const MAX_FD_PAYLOAD: usize = 64;

/// Largest payload a classic CAN frame can carry
pub const MAX_CLASSIC_PAYLOAD: usize = 8;

/// Highest 11-bit (standard) arbitration id
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Arbitration id as it appeared in the recorded trace
///
/// Text ids are always read as hexadecimal, with or without a `0x` prefix.
/// Numeric ids are taken as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Numeric(u32),
    Text(String),
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawId::Numeric(id) => write!(f, "{}", id),
            RawId::Text(text) => write!(f, "{:?}", text),
        }
    }
}

impl From<u32> for RawId {
    fn from(id: u32) -> Self {
        RawId::Numeric(id)
    }
}

impl From<&str> for RawId {
    fn from(id: &str) -> Self {
        RawId::Text(id.to_string())
    }
}

/// One row of a recorded trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Capture time in seconds
    pub timestamp: f64,

    /// Arbitration id, parsed later by the frame builder
    pub arbitration_id: RawId,

    /// Whitespace separated hex bytes, e.g. `"AA BB CC"`
    pub payload_hex: String,
}

impl TraceRecord {
    pub fn new(timestamp: f64, arbitration_id: impl Into<RawId>, payload_hex: &str) -> Self {
        Self {
            timestamp,
            arbitration_id: arbitration_id.into(),
            payload_hex: payload_hex.to_string(),
        }
    }
}

/// A CAN or CAN FD frame ready for transmission
///
/// Ids are always standard (11-bit); extended addressing is never produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub arbitration_id: u32,

    /// Raw data bytes (0-64 bytes)
    pub payload: Vec<u8>,

    pub is_fd: bool,

    /// CAN FD data phase runs at the higher bitrate
    pub bitrate_switch: bool,
}

impl Frame {
    /// Create a classic CAN frame
    pub fn classic(arbitration_id: u32, payload: Vec<u8>) -> Self {
        Self {
            arbitration_id,
            payload,
            is_fd: false,
            bitrate_switch: false,
        }
    }

    /// Number of payload bytes
    pub fn dlc(&self) -> usize {
        self.payload.len()
    }

    /// Get data as hex string
    pub fn hex_data(&self) -> String {
        self.payload
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:03X} [{}]{} {}",
            self.arbitration_id,
            self.dlc(),
            if self.is_fd { " FD" } else { "" },
            self.hex_data()
        )
    }
}
