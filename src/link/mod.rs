//! Transport-layer abstraction: a [`Link`] is a byte pipe to a device, opened over either
//! TCP or a serial port.

pub mod serial;
pub mod tcp;

use std::fmt::{Debug, Display};
use std::time::Duration;

use dyn_clone::DynClone;

use crate::errors::Error;

pub use serial::SerialLink;
pub use tcp::TcpLink;

dyn_clone::clone_trait_object!(Link);

/// Blocking byte-stream transport to a single device. Implementations are driven from their
/// own dedicated `spawn_blocking` task by [`crate::device::DeviceSession`]; none of these
/// methods are async.
pub trait Link: Debug + Display + DynClone + Send + Sync {
    /// Opens the underlying connection. May block until established.
    fn open(&mut self) -> Result<(), Error>;

    /// Gracefully shuts down the connection.
    fn close(&mut self) -> Result<(), Error>;

    /// Sets the read timeout used by [`Link::read_exact`].
    fn set_timeout(&mut self, duration: Duration) -> Result<(), Error>;

    /// Writes `buf` in full, blocking until done.
    fn write(&mut self, buf: &[u8]) -> Result<(), Error>;

    /// Fills `buf` completely, blocking until done or the timeout elapses.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error>;

    /// A stable human-readable address for this link (socket addr, serial port path): used
    /// as part of a device's [`crate::device::Identity`].
    fn address(&self) -> String;

    /// USB vendor/product id pair, when the link is backed by a USB serial adapter that
    /// reports one. `None` for TCP links and serial adapters without USB descriptors.
    fn usb_ids(&self) -> Option<(u16, u16)> {
        None
    }
}
