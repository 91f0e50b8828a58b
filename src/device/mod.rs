//! A single connected device: its identity, live session state machine, and the discrete
//! snapshot the [`crate::roster::Roster`] broadcasts to subscribers.

mod session;

pub use session::{DeviceSession, SessionHandle, SessionState};

use std::fmt::{Display, Formatter};

use crate::pin::Pin;
use crate::variant::Variant;

/// Stable identity for a device, derived from its link address. Two connections from the same
/// address are the same device even across reconnects.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Identity(pub String);

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Firmware identity reported by a device's `REPORT_FIRMWARE` response.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, PartialEq, Debug, Default)]
pub struct FirmwareIdentity {
    pub name: String,
    pub version: String,
    pub protocol_version: String,
}

/// A point-in-time, serializable view of a device session, the unit emitted on the
/// `joined`/`updated`/`left` roster events and returned by the external command surface.
///
/// Field names follow the external projection this gateway exposes (`id`, `name`, `type`,
/// `currentProgram`, `online`, `commands`, `pins`) rather than the internal session fields
/// they're derived from.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, PartialEq, Debug)]
pub struct DiscreteSnapshot {
    pub id: String,
    /// Firmware-reported name, once identification has completed.
    pub name: Option<String>,
    /// USB vendor id, when the underlying link is a serial port exposing one.
    pub vendor_id: Option<u16>,
    /// USB product id, when the underlying link is a serial port exposing one.
    pub product_id: Option<u16>,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub device_type: Variant,
    pub current_program: String,
    pub online: bool,
    /// Names of every action `execute_action` currently accepts for this device.
    pub commands: Vec<String>,
    pub pins: Vec<Pin>,
    /// Internal lifecycle state; not part of the wire projection's original fields but useful
    /// to consumers that need finer-grained state than `online`.
    pub state: SessionState,
    pub firmware: Option<FirmwareIdentity>,
}
