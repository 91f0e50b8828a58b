//! Error types shared by every component of the gateway.

use log::error;
use snafu::Snafu;

pub use crate::errors::Error::*;
use crate::errors::ProtocolError::IoException;
use crate::pin::PinModeId;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Link error: {source}.
    LinkError { source: LinkError },
    /// Protocol error: {source}.
    ProtocolError { source: ProtocolError },
    /// Session error: {source}.
    SessionError { source: SessionError },
    /// Action error: {source}.
    ActionError { source: ActionError },
    /// Configuration error: {info}.
    ConfigError { info: String },
    /// Unknown error: {info}.
    Unknown { info: String },
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        if matches!(error.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock) {
            return Self::LinkError { source: LinkError::Timeout };
        }
        error!("std::io error {:?}", error);
        let info = match error.kind() {
            std::io::ErrorKind::NotFound => String::from("device not found or already in use"),
            std::io::ErrorKind::PermissionDenied => String::from("connection lost"),
            _ => error.to_string(),
        };
        Self::LinkError {
            source: LinkError::IoException { info },
        }
    }
}

impl Error {
    /// True if this is a [`LinkError::Timeout`] — a link read that returned no data within its
    /// configured timeout, as opposed to one that found the link actually closed. Callers
    /// driving a blocking read loop use this to keep polling rather than tear the link down.
    pub fn is_link_timeout(&self) -> bool {
        matches!(self, Error::LinkError { source: LinkError::Timeout })
    }
}

impl From<LinkError> for Error {
    fn from(value: LinkError) -> Self {
        Self::LinkError { source: value }
    }
}

impl From<ProtocolError> for Error {
    fn from(value: ProtocolError) -> Self {
        Self::ProtocolError { source: value }
    }
}

impl From<SessionError> for Error {
    fn from(value: SessionError) -> Self {
        Self::SessionError { source: value }
    }
}

impl From<ActionError> for Error {
    fn from(value: ActionError) -> Self {
        Self::ActionError { source: value }
    }
}

/// Errors raised by a [`crate::link::Link`] implementation (TCP or serial).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LinkError {
    /// {info}
    IoException { info: String },
    /// Link was closed while an operation was in flight
    Closed,
    /// Read timed out with no data available
    Timeout,
    /// Failed to open serial port {port}: {info}
    SerialOpenFailed { port: String, info: String },
}

/// Errors raised decoding/encoding the Firmata wire protocol.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProtocolError {
    /// {info}
    IoException { info: String },
    /// Not enough bytes received - '{operation}' expected {expected} bytes, {received} received
    MessageTooShort {
        operation: &'static str,
        expected: usize,
        received: usize,
    },
    /// Unexpected data received
    UnexpectedData,
    /// Pin ({pin}) not compatible with mode ({mode}) - {context}
    IncompatibleMode {
        pin: u8,
        mode: PinModeId,
        context: &'static str,
    },
    /// Unknown pin {pin}
    UnknownPin { pin: u8 },
}

/// Errors raised by the device session state machine.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SessionError {
    /// Device did not complete identification within {timeout_ms}ms
    ConnectionTimeout { timeout_ms: u64 },
    /// Device missed {missed} consecutive heartbeats
    HeartbeatTimeout { missed: u32 },
    /// Operation attempted on a session in state {state}
    InvalidState { state: &'static str },
}

/// Errors raised by the action dispatch surface.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ActionError {
    /// Action '{action}' is not available for this device
    Unavailable { action: String },
    /// Action '{action}' received malformed arguments: {reason}
    Malformed { action: String, reason: String },
}
