//! `LedController` variant: a software-serial LED strip driver addressed through a Firmata
//! `SERIAL_WRITE` pass-through rather than through regular pin actions.
//!
//! The controller firmware listens on software serial port 0 at 9600 baud for bracket-framed
//! ASCII commands: `[` + command letter + parameters + `]`.

use crate::errors::{ActionError, Error};
use crate::firmata::FirmataCodec;

/// Software serial port the controller firmware listens on.
pub const LED_CONTROLLER_SERIAL_PORT: u8 = 0;
/// Baud rate the controller firmware expects.
pub const LED_CONTROLLER_BAUD_RATE: u32 = 9600;

/// Action names this variant adds on top of the generic built-ins.
pub const ACTIONS: &[&str] = &["RAINBOW", "KITT", "PULSECOLOR", "SETCOLOR"];

/// Returns the bytes to write once, right after connecting to a `LedController` device, to
/// configure its software-serial port.
pub fn encode_connect() -> Vec<u8> {
    FirmataCodec::encode_serial_config(LED_CONTROLLER_SERIAL_PORT, LED_CONTROLLER_BAUD_RATE)
}

fn frame(command: u8, params: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(params.len() + 3);
    payload.push(b'[');
    payload.push(command);
    payload.extend_from_slice(params);
    payload.push(b']');
    FirmataCodec::encode_serial_write(LED_CONTROLLER_SERIAL_PORT, &payload)
}

pub fn encode_rainbow() -> Vec<u8> {
    frame(b'R', &[])
}

pub fn encode_kitt(hue: u8, saturation: u8, value: u8) -> Vec<u8> {
    frame(b'K', &[hue, saturation, value])
}

pub fn encode_pulse_color(hue: u8, saturation: u8) -> Vec<u8> {
    frame(b'P', &[hue, saturation])
}

pub fn encode_set_color(hue: u8, saturation: u8, value: u8) -> Vec<u8> {
    frame(b'C', &[hue, saturation, value])
}

/// Dispatches a named `LedController` action into the bytes to write, validating arity.
pub fn encode_action(action: &str, args: &[u8]) -> Result<Vec<u8>, Error> {
    match action {
        "RAINBOW" => Ok(encode_rainbow()),
        "KITT" => match args {
            [h, s, v] => Ok(encode_kitt(*h, *s, *v)),
            _ => Err(ActionError::Malformed {
                action: action.to_string(),
                reason: "expected 3 arguments (hue, saturation, value)".to_string(),
            }
            .into()),
        },
        "PULSECOLOR" => match args {
            [h, s] => Ok(encode_pulse_color(*h, *s)),
            _ => Err(ActionError::Malformed {
                action: action.to_string(),
                reason: "expected 2 arguments (hue, saturation)".to_string(),
            }
            .into()),
        },
        "SETCOLOR" => match args {
            [h, s, v] => Ok(encode_set_color(*h, *s, *v)),
            _ => Err(ActionError::Malformed {
                action: action.to_string(),
                reason: "expected 3 arguments (hue, saturation, value)".to_string(),
            }
            .into()),
        },
        _ => Err(ActionError::Unavailable { action: action.to_string() }.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmata::constants::{END_SYSEX, SERIAL_DATA, SERIAL_WRITE, START_SYSEX};

    #[test]
    fn test_rainbow_frame_is_bracketed() {
        let bytes = encode_rainbow();
        assert_eq!(bytes[0], START_SYSEX);
        assert_eq!(bytes[1], SERIAL_DATA);
        assert_eq!(bytes[2], SERIAL_WRITE);
        assert_eq!(*bytes.last().unwrap(), END_SYSEX);
    }

    #[test]
    fn test_set_color_dispatch() {
        let direct = encode_set_color(10, 20, 30);
        let via_action = encode_action("SETCOLOR", &[10, 20, 30]).unwrap();
        assert_eq!(direct, via_action);
    }

    #[test]
    fn test_kitt_requires_three_args() {
        assert!(encode_action("KITT", &[1, 2]).is_err());
        assert!(encode_action("KITT", &[1, 2, 3]).is_ok());
    }

    #[test]
    fn test_unknown_action_is_unavailable() {
        let err = encode_action("FROBNICATE", &[]).unwrap_err();
        assert!(matches!(err, Error::ActionError { .. }));
    }
}
