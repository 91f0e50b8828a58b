//! Firmata protocol byte constants.
//!
//! <https://github.com/firmata/protocol/blob/master/protocol.md>

/// For non-compatible changes.
pub const PROTOCOL_MAJOR_VERSION: u8 = 2;
/// For backwards-compatible changes.
pub const PROTOCOL_MINOR_VERSION: u8 = 5;

// ########################################
// Message command bytes (128-255/0x80-0xFF)

/// Send data for a digital port (collection of 8 pins).
pub const DIGITAL_MESSAGE: u8 = 0x90;
/// Send data for an analog pin (or PWM).
pub const ANALOG_MESSAGE: u8 = 0xE0;
/// Enable analog input by pin #.
pub const REPORT_ANALOG: u8 = 0xC0;
/// Enable digital input by port pair.
pub const REPORT_DIGITAL: u8 = 0xD0;
/// Set a pin to INPUT/OUTPUT/PWM/etc.
pub const SET_PIN_MODE: u8 = 0xF4;
/// Set value of an individual digital pin.
pub const SET_DIGITAL_PIN_VALUE: u8 = 0xF5;
/// Report protocol version.
pub const REPORT_VERSION: u8 = 0xF9;
/// Reset from MIDI.
pub const SYSTEM_RESET: u8 = 0xFF;
/// Start a sysex message.
pub const START_SYSEX: u8 = 0xF0;
/// End a sysex message.
pub const END_SYSEX: u8 = 0xF7;

// ########################################
// Extended command set using sysex (0-127/0x00-0x7F)

/// Communicate with serial devices.
pub const SERIAL_DATA: u8 = 0x60;
/// Send an I2C read/write request.
pub const I2C_REQUEST: u8 = 0x76;
/// Reply to an I2C read request.
pub const I2C_REPLY: u8 = 0x77;
/// Config I2C settings such as delay times and power pins.
pub const I2C_CONFIG: u8 = 0x78;
/// Report name and version of the firmware.
pub const REPORT_FIRMWARE: u8 = 0x79;
/// Ask for supported modes and resolution of all pins.
pub const CAPABILITY_QUERY: u8 = 0x6B;
/// Reply with supported modes and resolution.
pub const CAPABILITY_RESPONSE: u8 = 0x6C;
/// Ask for mapping of analog to pin numbers.
pub const ANALOG_MAPPING_QUERY: u8 = 0x69;
/// Reply with mapping info.
pub const ANALOG_MAPPING_RESPONSE: u8 = 0x6A;
/// Set the poll rate of the main loop.
pub const SAMPLING_INTERVAL: u8 = 0x7A;

// SERIAL_DATA sub-commands (occupy the top 3 bits of the byte following SERIAL_DATA).
/// Configures a serial port (baud rate).
pub const SERIAL_CONFIG: u8 = 0x10;
/// Writes bytes to a serial port.
pub const SERIAL_WRITE: u8 = 0x20;
/// Requests continuous or single-shot reads from a serial port.
pub const SERIAL_READ: u8 = 0x30;
/// Reply carrying bytes read from a serial port.
pub const SERIAL_REPLY: u8 = 0x40;
/// Mask isolating the serial port id from the sub-command byte.
pub const SERIAL_PORT_ID_MASK: u8 = 0x07;

// I2C sub-command flags.
pub const I2C_WRITE: u8 = 0x00;
pub const I2C_READ: u8 = 0x01;
pub const I2C_READ_CONTINUOUSLY: u8 = 0x10;
pub const I2C_STOP_READING: u8 = 0x18;
pub const I2C_READ_WRITE_MODE_MASK: u8 = 0x18;
