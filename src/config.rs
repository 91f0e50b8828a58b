//! Gateway-wide configuration, owned by whichever binary embeds this crate.

use std::time::Duration;

/// Options controlling which listeners the gateway starts and how device sessions time out.
///
/// Field names mirror the external configuration surface: `serial`/`ethernet` toggle the two
/// listener kinds, `port` is the TCP port the embedding application exposes its own
/// (WebSocket) surface on — this crate never binds it, it only carries the value through —
/// `eth_port` is the TCP port Firmata-over-TCP devices connect to, `serial_port` restricts
/// serial scanning to a single device path, and `debug` raises the gateway's own log
/// verbosity.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub serial: bool,
    pub ethernet: bool,
    pub port: u16,
    pub eth_port: u16,
    /// Restricts the serial scan to this single device path instead of enumerating every
    /// port present on the host.
    pub serial_port: Option<String>,
    pub debug: bool,
    /// Interval between heartbeat pings sent to a `READY` device.
    pub heartbeat_interval_ms: u64,
    /// Time allowed for a freshly opened link to complete identification before it is dropped.
    pub identification_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            serial: true,
            ethernet: true,
            port: 8080,
            eth_port: 3030,
            serial_port: None,
            debug: false,
            heartbeat_interval_ms: 3_000,
            identification_timeout_ms: 10_000,
        }
    }
}

impl GatewayConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn identification_timeout(&self) -> Duration {
        Duration::from_millis(self.identification_timeout_ms)
    }
}
