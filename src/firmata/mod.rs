//! Firmata wire protocol: encoding outbound commands and decoding inbound messages.
//!
//! <https://github.com/firmata/protocol/blob/master/protocol.md>

pub mod constants;

use crate::errors::{Error, ProtocolError};
use crate::link::Link;
use crate::pin::{PinMode, PinModeId};
use constants::*;
use std::collections::HashMap;

/// One decoded inbound Firmata message.
#[derive(Clone, Debug, PartialEq)]
pub enum FirmataMessage {
    ProtocolVersion { major: u8, minor: u8 },
    Firmware { major: u8, minor: u8, name: String },
    Capability(HashMap<u8, Vec<PinMode>>),
    AnalogMapping(HashMap<u8, u8>),
    AnalogValue { channel: u8, value: u16 },
    DigitalPort { port: u8, value: u8 },
    SerialReply { port: u8, data: Vec<u8> },
    I2cReply { address: u16, register: u16, data: Vec<u8> },
    /// A sysex message this codec doesn't interpret but still framed correctly.
    Unhandled { command: u8 },
}

/// Splits a 14-bit value into its two constituent 7-bit Firmata bytes, least-significant
/// first.
pub fn split_14bit(value: u16) -> (u8, u8) {
    ((value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8)
}

/// Recombines two 7-bit Firmata bytes (lsb, msb) into a 14-bit value.
pub fn join_14bit(lsb: u8, msb: u8) -> u16 {
    (lsb as u16 & 0x7F) | ((msb as u16 & 0x7F) << 7)
}

/// Stateless Firmata codec: reads/writes framed messages over a [`Link`]. Any state about a
/// particular device (its pin map, firmware identity) is kept by
/// [`crate::device::DeviceSession`], not here.
#[derive(Default, Debug, Clone)]
pub struct FirmataCodec;

impl FirmataCodec {
    // ---- Encoding ----

    pub fn encode_report_firmware_query() -> Vec<u8> {
        vec![START_SYSEX, REPORT_FIRMWARE, END_SYSEX]
    }

    pub fn encode_capability_query() -> Vec<u8> {
        vec![START_SYSEX, CAPABILITY_QUERY, END_SYSEX]
    }

    pub fn encode_analog_mapping_query() -> Vec<u8> {
        vec![START_SYSEX, ANALOG_MAPPING_QUERY, END_SYSEX]
    }

    pub fn encode_sampling_interval(interval_ms: u16) -> Vec<u8> {
        let (lsb, msb) = split_14bit(interval_ms);
        vec![START_SYSEX, SAMPLING_INTERVAL, lsb, msb, END_SYSEX]
    }

    pub fn encode_set_pin_mode(pin: u8, mode: PinModeId) -> Vec<u8> {
        vec![SET_PIN_MODE, pin, mode as u8]
    }

    /// Single-pin shorthand (`SET_DIGITAL_PIN_VALUE`), used where only one pin's state matters
    /// and siblings in its port are irrelevant (e.g. the blink interval).
    pub fn encode_digital_write(pin: u8, value: bool) -> Vec<u8> {
        vec![SET_DIGITAL_PIN_VALUE, pin, value as u8]
    }

    /// Full `DIGITAL_MESSAGE` (`0x90|port`) carrying the packed 8-pin port byte, the form a
    /// faithful digital write uses so it doesn't clobber sibling pins' last known state.
    pub fn encode_digital_port(port: u8, value: u8) -> Vec<u8> {
        let (lsb, msb) = split_14bit(value as u16);
        vec![DIGITAL_MESSAGE | (port & 0x0F), lsb, msb]
    }

    pub fn encode_analog_write(pin: u8, value: u16) -> Vec<u8> {
        let (lsb, msb) = split_14bit(value);
        if pin < 16 {
            vec![ANALOG_MESSAGE | pin, lsb, msb]
        } else {
            vec![START_SYSEX, 0x6F, pin, lsb, msb, END_SYSEX]
        }
    }

    pub fn encode_report_digital(port: u8, state: bool) -> Vec<u8> {
        vec![REPORT_DIGITAL | (port & 0x0F), state as u8]
    }

    pub fn encode_report_analog(channel: u8, state: bool) -> Vec<u8> {
        vec![REPORT_ANALOG | (channel & 0x0F), state as u8]
    }

    pub fn encode_serial_config(port: u8, baud_rate: u32) -> Vec<u8> {
        let (lsb, mid) = split_14bit((baud_rate & 0x3FFF) as u16);
        vec![
            START_SYSEX,
            SERIAL_DATA,
            SERIAL_CONFIG | (port & SERIAL_PORT_ID_MASK),
            lsb,
            mid,
            END_SYSEX,
        ]
    }

    pub fn encode_serial_write(port: u8, data: &[u8]) -> Vec<u8> {
        let mut buf = vec![START_SYSEX, SERIAL_DATA, SERIAL_WRITE | (port & SERIAL_PORT_ID_MASK)];
        for &byte in data {
            let (lsb, msb) = split_14bit(byte as u16);
            buf.push(lsb);
            buf.push(msb);
        }
        buf.push(END_SYSEX);
        buf
    }

    /// Configures the delay (in microseconds) the I2C peripheral waits between a write and a
    /// subsequent read. <https://github.com/firmata/protocol/blob/master/i2c.md>
    pub fn encode_i2c_config(delay: u16) -> Vec<u8> {
        let (lsb, msb) = split_14bit(delay);
        vec![START_SYSEX, I2C_CONFIG, lsb, msb, END_SYSEX]
    }

    /// Requests `size` bytes from `address`, answered by an `I2C_REPLY` sysex.
    pub fn encode_i2c_read(address: u8, size: u16) -> Vec<u8> {
        let (lsb, msb) = split_14bit(size);
        vec![START_SYSEX, I2C_REQUEST, address, I2C_READ << 3, lsb, msb, END_SYSEX]
    }

    /// Writes `data` to `address`.
    pub fn encode_i2c_write(address: u8, data: &[u8]) -> Vec<u8> {
        let mut buf = vec![START_SYSEX, I2C_REQUEST, address, I2C_WRITE << 3];
        for &byte in data {
            let (lsb, msb) = split_14bit(byte as u16);
            buf.push(lsb);
            buf.push(msb);
        }
        buf.push(END_SYSEX);
        buf
    }

    // ---- Decoding ----

    /// Blocks on `link` until one complete message has been read and decoded.
    pub fn decode(link: &mut dyn Link) -> Result<FirmataMessage, Error> {
        let mut command = [0u8; 1];
        link.read_exact(&mut command)?;
        let command = command[0];

        match command {
            START_SYSEX => Self::decode_sysex(link),
            REPORT_VERSION => {
                let mut buf = [0u8; 2];
                link.read_exact(&mut buf)?;
                Ok(FirmataMessage::ProtocolVersion { major: buf[0], minor: buf[1] })
            }
            DIGITAL_MESSAGE..=0x9F => {
                let port = command & 0x0F;
                let mut buf = [0u8; 2];
                link.read_exact(&mut buf)?;
                let value = join_14bit(buf[0], buf[1]);
                Ok(FirmataMessage::DigitalPort { port, value: (value & 0xFF) as u8 })
            }
            ANALOG_MESSAGE..=0xEF => {
                let channel = command & 0x0F;
                let mut buf = [0u8; 2];
                link.read_exact(&mut buf)?;
                let value = join_14bit(buf[0], buf[1]);
                Ok(FirmataMessage::AnalogValue { channel, value })
            }
            _ => Err(Error::from(ProtocolError::UnexpectedData)),
        }
    }

    fn decode_sysex(link: &mut dyn Link) -> Result<FirmataMessage, Error> {
        let mut body = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            link.read_exact(&mut byte)?;
            if byte[0] == END_SYSEX {
                break;
            }
            body.push(byte[0]);
        }
        if body.is_empty() {
            return Err(ProtocolError::MessageTooShort { operation: "sysex", expected: 1, received: 0 }.into());
        }
        let command = body[0];
        let payload = &body[1..];

        match command {
            REPORT_FIRMWARE => {
                if payload.len() < 2 {
                    return Err(ProtocolError::MessageTooShort {
                        operation: "REPORT_FIRMWARE",
                        expected: 2,
                        received: payload.len(),
                    }
                    .into());
                }
                let major = payload[0];
                let minor = payload[1];
                let name = decode_7bit_string(&payload[2..]);
                Ok(FirmataMessage::Firmware { major, minor, name })
            }
            CAPABILITY_RESPONSE => {
                let mut pins = HashMap::new();
                let mut pin_id = 0u8;
                let mut modes = Vec::new();
                let mut i = 0;
                while i < payload.len() {
                    if payload[i] == 0x7F {
                        pins.insert(pin_id, std::mem::take(&mut modes));
                        pin_id += 1;
                        i += 1;
                        continue;
                    }
                    if i + 1 >= payload.len() {
                        return Err(ProtocolError::UnexpectedData.into());
                    }
                    modes.push(PinMode { id: PinModeId::from(payload[i]), resolution: payload[i + 1] });
                    i += 2;
                }
                Ok(FirmataMessage::Capability(pins))
            }
            ANALOG_MAPPING_RESPONSE => {
                let mut channels = HashMap::new();
                for (pin, &entry) in payload.iter().enumerate() {
                    if entry != 0x7F {
                        channels.insert(entry, pin as u8);
                    }
                }
                Ok(FirmataMessage::AnalogMapping(channels))
            }
            SERIAL_DATA => {
                if payload.is_empty() {
                    return Err(ProtocolError::MessageTooShort { operation: "SERIAL_DATA", expected: 1, received: 0 }.into());
                }
                let sub_command = payload[0] & 0xF0;
                let port = payload[0] & SERIAL_PORT_ID_MASK;
                if sub_command == SERIAL_REPLY {
                    let data = decode_7bit_bytes(&payload[1..]);
                    Ok(FirmataMessage::SerialReply { port, data })
                } else {
                    Ok(FirmataMessage::Unhandled { command: SERIAL_DATA })
                }
            }
            I2C_REPLY => {
                if payload.len() < 4 {
                    return Err(ProtocolError::MessageTooShort {
                        operation: "I2C_REPLY",
                        expected: 4,
                        received: payload.len(),
                    }
                    .into());
                }
                let address = join_14bit(payload[0], payload[1]);
                let register = join_14bit(payload[2], payload[3]);
                let data = decode_7bit_bytes(&payload[4..]);
                Ok(FirmataMessage::I2cReply { address, register, data })
            }
            other => Ok(FirmataMessage::Unhandled { command: other }),
        }
    }
}

/// Decodes a run of 7-bit-encoded ASCII pairs (as used by `REPORT_FIRMWARE`'s name field)
/// back into a `String`.
fn decode_7bit_string(bytes: &[u8]) -> String {
    decode_7bit_bytes(bytes).into_iter().map(|b| b as char).collect()
}

/// Decodes a run of (lsb, msb) 7-bit pairs back into the original bytes.
fn decode_7bit_bytes(bytes: &[u8]) -> Vec<u8> {
    bytes
        .chunks_exact(2)
        .map(|pair| join_14bit(pair[0], pair[1]) as u8)
        .collect()
}
