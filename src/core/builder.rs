//! Turns loosely formatted trace rows into well-formed frames.
//!
//! Payload parsing is tolerant: tokens that are not exactly two hex digits
//! are dropped instead of failing the whole record, the way recorded logs
//! are usually cleaned up before replay.

use crate::core::message::{Frame, RawId, TraceRecord, MAX_CLASSIC_PAYLOAD, MAX_FD_PAYLOAD, MAX_STANDARD_ID};
use thiserror::Error;

/// Errors produced while building a frame from a trace record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("invalid arbitration id {0}")]
    InvalidArbitrationId(String),

    #[error("unparsable payload {0:?}")]
    InvalidPayload(String),

    #[error("arbitration id 0x{0:X} does not fit in 11 bits")]
    IdOutOfRange(u32),

    #[error("payload of {0} bytes exceeds the CAN FD maximum of 64")]
    PayloadTooLong(usize),

    #[error("payload is empty")]
    EmptyPayload,
}

/// Caller policy applied on top of the record contents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramePolicy {
    /// Send every frame as CAN FD, even when the payload fits classic CAN
    pub force_fd: bool,
    /// Reject records whose payload has no valid byte tokens
    pub require_payload: bool,
}

impl FramePolicy {
    pub fn forced_fd() -> Self {
        Self {
            force_fd: true,
            ..Self::default()
        }
    }
}

/// Build a frame from a trace record
pub fn build(record: &TraceRecord, policy: FramePolicy) -> Result<Frame, FrameError> {
    let arbitration_id = parse_arbitration_id(&record.arbitration_id)?;

    let mut tokens: Vec<&str> = record
        .payload_hex
        .split_whitespace()
        .filter(|token| is_byte_token(token))
        .collect();
    let dlc = tokens.len();
    // Pad to the declared length; a no-op while every counted token is kept
    tokens.truncate(dlc);
    tokens.resize(dlc, "00");

    let payload = tokens
        .iter()
        .map(|token| u8::from_str_radix(token, 16))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| FrameError::InvalidPayload(record.payload_hex.clone()))?;

    if payload.len() > MAX_FD_PAYLOAD {
        return Err(FrameError::PayloadTooLong(payload.len()));
    }
    if payload.is_empty() && policy.require_payload {
        return Err(FrameError::EmptyPayload);
    }

    let is_fd = policy.force_fd || dlc > MAX_CLASSIC_PAYLOAD;

    Ok(Frame {
        arbitration_id,
        payload,
        is_fd,
        bitrate_switch: is_fd,
    })
}

/// Parse an arbitration id, reading text as hexadecimal
pub fn parse_arbitration_id(raw: &RawId) -> Result<u32, FrameError> {
    let id = match raw {
        RawId::Numeric(id) => *id,
        RawId::Text(text) => {
            let text = text.trim();
            let digits = text
                .strip_prefix("0x")
                .or_else(|| text.strip_prefix("0X"))
                .unwrap_or(text);
            u32::from_str_radix(digits, 16)
                .map_err(|_| FrameError::InvalidArbitrationId(raw.to_string()))?
        }
    };

    if id > MAX_STANDARD_ID {
        return Err(FrameError::IdOutOfRange(id));
    }
    Ok(id)
}

/// A valid byte token is exactly two hex digits
fn is_byte_token(token: &str) -> bool {
    token.len() == 2 && token.chars().all(|c| c.is_ascii_hexdigit())
}
