//! Pin descriptors and the device-wide pin map reported by a Firmata firmware.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Identifies the mode a pin currently runs, as enumerated by the Firmata
/// `CAPABILITY_RESPONSE`/`CAPABILITY_QUERY` sysex messages.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub enum PinModeId {
    #[default]
    INPUT = 0,
    OUTPUT = 1,
    ANALOG = 2,
    PWM = 3,
    SERVO = 4,
    SHIFT = 5,
    I2C = 6,
    ONEWIRE = 7,
    STEPPER = 8,
    ENCODER = 9,
    SERIAL = 10,
    PULLUP = 11,
    SPI = 12,
    SONAR = 13,
    TONE = 14,
    DHT = 15,
    UNSUPPORTED = 127,
}

impl Display for PinModeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<u8> for PinModeId {
    fn from(value: u8) -> Self {
        match value {
            0 => PinModeId::INPUT,
            1 => PinModeId::OUTPUT,
            2 => PinModeId::ANALOG,
            3 => PinModeId::PWM,
            4 => PinModeId::SERVO,
            5 => PinModeId::SHIFT,
            6 => PinModeId::I2C,
            7 => PinModeId::ONEWIRE,
            8 => PinModeId::STEPPER,
            9 => PinModeId::ENCODER,
            10 => PinModeId::SERIAL,
            11 => PinModeId::PULLUP,
            12 => PinModeId::SPI,
            13 => PinModeId::SONAR,
            14 => PinModeId::TONE,
            15 => PinModeId::DHT,
            _ => PinModeId::UNSUPPORTED,
        }
    }
}

/// A supported mode on a given pin, paired with the resolution (in bits) the firmware reports
/// for it.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct PinMode {
    pub id: PinModeId,
    pub resolution: u8,
}

/// A single pin of a connected device, as tracked by the gateway: its current mode, the value
/// last read or written, and everything the `CAPABILITY_RESPONSE`/`ANALOG_MAPPING_RESPONSE`
/// handshake revealed about it.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, PartialEq, Debug)]
pub struct Pin {
    /// Pin index on the board (0-based).
    pub id: u8,
    /// Display name, e.g. `D2` or `A0`.
    pub name: String,
    /// Mode the pin currently operates in.
    pub mode: PinMode,
    /// All modes the firmware reported as available for this pin.
    pub supported_modes: Vec<PinMode>,
    /// Analog channel number, if this pin is analog-capable.
    pub channel: Option<u8>,
    /// Last known value (digital: 0/1, analog: up to `2^resolution - 1`).
    pub value: u16,
}

impl Pin {
    pub fn supports_mode(&self, mode: PinModeId) -> bool {
        self.supported_modes.iter().any(|m| m.id == mode)
    }
}

/// The full pin map plus identification data a Firmata device reports during the handshake.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Default, Debug)]
pub struct PinMap {
    pub pins: HashMap<u8, Pin>,
    pub protocol_version: String,
    pub firmware_name: String,
    pub firmware_version: String,
    /// Maps an analog channel number to its pin index, from `ANALOG_MAPPING_RESPONSE`.
    pub analog_channels: HashMap<u8, u8>,
}

impl PinMap {
    pub fn get_pin(&self, id: u8) -> Option<&Pin> {
        self.pins.get(&id)
    }

    pub fn get_pin_mut(&mut self, id: u8) -> Option<&mut Pin> {
        self.pins.get_mut(&id)
    }

    pub fn analog_pin(&self, channel: u8) -> Option<&Pin> {
        self.analog_channels.get(&channel).and_then(|id| self.pins.get(id))
    }

    /// Computes the packed 8-pin port byte `DIGITAL_MESSAGE` carries, as if `changed_pin` were
    /// set to `value` and every other pin in the same port kept its last known value.
    pub fn digital_port_byte(&self, changed_pin: u8, value: bool) -> (u8, u8) {
        let port = changed_pin / 8;
        let mut byte = 0u8;
        for offset in 0..8u8 {
            let id = port * 8 + offset;
            let bit = if id == changed_pin {
                value
            } else {
                self.pins.get(&id).map(|p| p.value != 0).unwrap_or(false)
            };
            if bit {
                byte |= 1 << offset;
            }
        }
        (port, byte)
    }

    /// Returns every pin in ascending index order, the shape the discrete snapshot exposes.
    pub fn sorted_pins(&self) -> Vec<Pin> {
        let mut pins: Vec<Pin> = self.pins.values().cloned().collect();
        pins.sort_by_key(|p| p.id);
        pins
    }
}
