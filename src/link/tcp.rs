//! TCP realization of [`super::Link`], used for network-attached or emulated devices.

use std::fmt::{Display, Formatter};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::errors::{Error, LinkError};
use crate::link::Link;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1_000);

/// A TCP connection to a device, either accepted from the gateway's ethernet listener or
/// dialed out explicitly.
#[derive(Clone, Debug)]
pub struct TcpLink {
    addr: String,
    #[allow(clippy::type_complexity)]
    stream: Option<std::sync::Arc<parking_lot::Mutex<TcpStream>>>,
}

impl TcpLink {
    pub fn new<S: Into<String>>(addr: S) -> Self {
        Self { addr: addr.into(), stream: None }
    }

    /// Wraps an already-accepted stream (from the ethernet listener's `accept()` loop), so
    /// sessions never have to dial back out to a peer that connected to us.
    pub fn from_accepted(stream: TcpStream) -> Result<Self, Error> {
        let addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        stream.set_read_timeout(Some(DEFAULT_TIMEOUT)).map_err(Error::from)?;
        Ok(Self {
            addr,
            stream: Some(std::sync::Arc::new(parking_lot::Mutex::new(stream))),
        })
    }
}

impl Display for TcpLink {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tcp({})", self.addr)
    }
}

impl Link for TcpLink {
    fn open(&mut self) -> Result<(), Error> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = TcpStream::connect(&self.addr).map_err(Error::from)?;
        stream.set_read_timeout(Some(DEFAULT_TIMEOUT)).map_err(Error::from)?;
        self.stream = Some(std::sync::Arc::new(parking_lot::Mutex::new(stream)));
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        if let Some(stream) = &self.stream {
            let _ = stream.lock().shutdown(std::net::Shutdown::Both);
        }
        self.stream = None;
        Ok(())
    }

    fn set_timeout(&mut self, duration: Duration) -> Result<(), Error> {
        match &self.stream {
            Some(stream) => stream.lock().set_read_timeout(Some(duration)).map_err(Error::from),
            None => Err(Error::from(LinkError::Closed)),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        match &self.stream {
            Some(stream) => stream.lock().write_all(buf).map_err(Error::from),
            None => Err(Error::from(LinkError::Closed)),
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        match &self.stream {
            Some(stream) => stream.lock().read_exact(buf).map_err(Error::from),
            None => Err(Error::from(LinkError::Closed)),
        }
    }

    fn address(&self) -> String {
        self.addr.clone()
    }
}
