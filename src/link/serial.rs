//! Serial-port realization of [`super::Link`], built on the `serialport` crate.

use std::fmt::{Display, Formatter};
use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;

use crate::errors::{Error, LinkError};
use crate::link::Link;

const DEFAULT_BAUD_RATE: u32 = 57_600;
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1_000);

/// A serial port connection to a device, opened with 8 data bits, no parity, one stop bit
/// and no flow control — the configuration every Firmata-speaking firmware expects.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug)]
pub struct SerialLink {
    pub port: String,
    pub baud_rate: u32,
    /// USB vendor/product id, when the listener's port scan discovered one for this path.
    pub usb_ids: Option<(u16, u16)>,
    #[cfg_attr(feature = "serde", serde(skip))]
    connection: Option<SharedSerialPort>,
}

/// `Box<dyn SerialPort>` isn't `Clone`; sessions clone their `Link` cheaply (to hand a copy to
/// the blocking read task) so the open connection is shared behind an `Arc<Mutex<_>>` instead.
type SharedSerialPort = std::sync::Arc<parking_lot::Mutex<Box<dyn SerialPort>>>;

impl SerialLink {
    pub fn new<S: Into<String>>(port: S) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            usb_ids: None,
            connection: None,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_usb_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.usb_ids = Some((vendor_id, product_id));
        self
    }

    /// Lists serial ports currently present on the host, for the listener's scan loop.
    pub fn available_ports() -> Result<Vec<String>, Error> {
        Ok(serialport::available_ports()
            .map_err(|e| Error::from(LinkError::SerialOpenFailed {
                port: "*".to_string(),
                info: e.to_string(),
            }))?
            .into_iter()
            .map(|p| p.port_name)
            .collect())
    }

    /// Enumerates serial ports along with their USB vendor/product id, when the host driver
    /// reports one (used by the listener to build [`SerialLink`]s with [`SerialLink::usb_ids`]
    /// already populated).
    pub fn available_ports_with_usb_ids() -> Result<Vec<(String, Option<(u16, u16)>)>, Error> {
        Ok(serialport::available_ports()
            .map_err(|e| Error::from(LinkError::SerialOpenFailed {
                port: "*".to_string(),
                info: e.to_string(),
            }))?
            .into_iter()
            .map(|p| {
                let usb_ids = match p.port_type {
                    serialport::SerialPortType::UsbPort(info) => Some((info.vid, info.pid)),
                    _ => None,
                };
                (p.port_name, usb_ids)
            })
            .collect())
    }
}

impl Display for SerialLink {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Serial({}@{})", self.port, self.baud_rate)
    }
}

impl Link for SerialLink {
    fn open(&mut self) -> Result<(), Error> {
        let port = serialport::new(&self.port, self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(DEFAULT_TIMEOUT)
            .open()
            .map_err(|e| Error::from(LinkError::SerialOpenFailed {
                port: self.port.clone(),
                info: e.to_string(),
            }))?;
        self.connection = Some(std::sync::Arc::new(parking_lot::Mutex::new(port)));
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.connection = None;
        Ok(())
    }

    fn set_timeout(&mut self, duration: Duration) -> Result<(), Error> {
        match &self.connection {
            Some(conn) => conn
                .lock()
                .set_timeout(duration)
                .map_err(|e| Error::from(LinkError::IoException { info: e.to_string() })),
            None => Err(Error::from(LinkError::Closed)),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        match &self.connection {
            Some(conn) => conn.lock().write_all(buf).map_err(Error::from),
            None => Err(Error::from(LinkError::Closed)),
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        match &self.connection {
            Some(conn) => conn.lock().read_exact(buf).map_err(Error::from),
            None => Err(Error::from(LinkError::Closed)),
        }
    }

    fn address(&self) -> String {
        self.port.clone()
    }

    fn usb_ids(&self) -> Option<(u16, u16)> {
        self.usb_ids
    }
}
