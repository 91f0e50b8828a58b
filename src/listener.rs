//! Accepts new links — TCP connections and serial ports — and hands each to a freshly
//! connected [`DeviceSession`], which the [`Roster`] then picks up once it identifies.

use log::{debug, info, warn};
use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::device::DeviceSession;
use crate::errors::Error;
use crate::link::{Link, SerialLink, TcpLink};
use crate::roster::Roster;

/// Owns the gateway's two sub-listeners: a TCP accept loop for network-attached Firmata
/// devices, and a one-shot serial port scan for locally attached ones.
pub struct Listener {
    config: GatewayConfig,
    roster: Roster,
}

impl Listener {
    pub fn new(config: GatewayConfig, roster: Roster) -> Self {
        Self { config, roster }
    }

    /// Starts every sub-listener enabled by configuration. Returns once they're spawned or
    /// bound; the TCP accept loop runs in the background for the gateway's remaining
    /// lifetime, while the serial scan completes after its single pass.
    pub async fn run(&self) -> Result<(), Error> {
        if self.config.ethernet {
            self.spawn_tcp_listener().await?;
        }
        if self.config.serial {
            self.scan_serial_ports();
        }
        Ok(())
    }

    async fn spawn_tcp_listener(&self) -> Result<(), Error> {
        let addr = format!("0.0.0.0:{}", self.config.eth_port);
        let listener = TcpListener::bind(&addr).await.map_err(Error::from)?;
        info!("listening for Firmata-over-TCP devices on {addr}");

        let roster = self.roster.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!("accepted TCP connection from {peer}");
                        match to_std_stream(stream) {
                            Ok(std_stream) => match TcpLink::from_accepted(std_stream) {
                                Ok(link) => {
                                    let boxed: Box<dyn Link> = Box::new(link);
                                    let handle = DeviceSession::connect(boxed, config.clone());
                                    roster.add(handle);
                                }
                                Err(e) => warn!("failed to wrap accepted connection from {peer}: {e}"),
                            },
                            Err(e) => warn!("failed to hand off accepted connection from {peer}: {e}"),
                        }
                    }
                    Err(e) => warn!("TCP accept failed: {e}"),
                }
            }
        });
        Ok(())
    }

    /// Enumerates serial ports (or, if [`GatewayConfig::serial_port`] names one, just that
    /// single path) and starts a session on each. A port that never completes identification
    /// is released by the session's own 10 s identification deadline, not by this scan.
    fn scan_serial_ports(&self) {
        let ports = match &self.config.serial_port {
            Some(single) => vec![(single.clone(), None)],
            None => match SerialLink::available_ports_with_usb_ids() {
                Ok(ports) => ports,
                Err(e) => {
                    warn!("serial port scan failed: {e}");
                    return;
                }
            },
        };

        for (path, usb_ids) in ports {
            debug!("opening serial port {path}");
            let mut link = SerialLink::new(path);
            if let Some((vendor_id, product_id)) = usb_ids {
                link = link.with_usb_ids(vendor_id, product_id);
            }
            let boxed: Box<dyn Link> = Box::new(link);
            let handle = DeviceSession::connect(boxed, self.config.clone());
            self.roster.add(handle);
        }
    }
}

/// Converts an accepted `tokio` stream back into a blocking `std` one: [`TcpLink`] is driven
/// from a dedicated `spawn_blocking` task by [`DeviceSession`], so it needs a blocking socket.
fn to_std_stream(stream: tokio::net::TcpStream) -> std::io::Result<std::net::TcpStream> {
    let std_stream = stream.into_std()?;
    std_stream.set_nonblocking(false)?;
    Ok(std_stream)
}
