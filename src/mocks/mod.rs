#![cfg(any(test, feature = "mocks"))]

//! Test doubles and fixture builders: a mock [`crate::link::Link`] plus ready-made pin maps,
//! enabled by the `mocks` feature (always present in `#[cfg(test)]` builds).

pub mod link;

pub use link::MockLink;

use crate::pin::{Pin, PinMap, PinMode, PinModeId};
use std::collections::HashMap;

pub fn analog_pin(id: u8, channel: u8, value: u16) -> Pin {
    Pin {
        id,
        name: format!("A{channel}"),
        mode: PinMode { id: PinModeId::ANALOG, resolution: 10 },
        supported_modes: vec![
            PinMode { id: PinModeId::INPUT, resolution: 1 },
            PinMode { id: PinModeId::ANALOG, resolution: 10 },
        ],
        channel: Some(channel),
        value,
    }
}

pub fn digital_pin(id: u8, value: u16) -> Pin {
    Pin {
        id,
        name: format!("D{id}"),
        mode: PinMode { id: PinModeId::OUTPUT, resolution: 1 },
        supported_modes: vec![
            PinMode { id: PinModeId::INPUT, resolution: 1 },
            PinMode { id: PinModeId::OUTPUT, resolution: 1 },
            PinMode { id: PinModeId::PULLUP, resolution: 1 },
        ],
        channel: None,
        value,
    }
}

pub fn pwm_pin(id: u8) -> Pin {
    Pin {
        id,
        name: format!("D{id}"),
        mode: PinMode { id: PinModeId::PWM, resolution: 8 },
        supported_modes: vec![
            PinMode { id: PinModeId::INPUT, resolution: 1 },
            PinMode { id: PinModeId::OUTPUT, resolution: 1 },
            PinMode { id: PinModeId::PWM, resolution: 8 },
        ],
        channel: None,
        value: 0,
    }
}

/// A small fixture pin map (pins 2-5 digital, 6 pwm, 14 analog/channel0) used across device
/// session and dispatch tests.
pub fn fixture_pin_map() -> PinMap {
    let mut channels = HashMap::new();
    channels.insert(0, 14);
    PinMap {
        pins: HashMap::from([
            (2, digital_pin(2, 0)),
            (3, digital_pin(3, 0)),
            (4, digital_pin(4, 0)),
            (5, digital_pin(5, 0)),
            (6, pwm_pin(6)),
            (13, digital_pin(13, 0)),
            (14, analog_pin(14, 0, 0)),
        ]),
        protocol_version: "2.5".to_string(),
        firmware_name: "StandardFirmata".to_string(),
        firmware_version: "2.5.1".to_string(),
        analog_channels: channels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_pin_map_has_expected_pins() {
        let map = fixture_pin_map();
        assert_eq!(map.pins.len(), 7);
        assert!(map.get_pin(6).unwrap().supports_mode(PinModeId::PWM));
        assert_eq!(map.analog_pin(0).unwrap().id, 14);
    }
}
