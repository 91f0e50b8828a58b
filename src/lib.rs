//! <h1 align="center">FIRMATA GATEWAY</h1>
//! <div style="text-align:center;font-style:italic;">A Rust gateway that speaks the Firmata protocol to any number of attached boards over serial or TCP, and exposes them through a single typed action surface.</div>
//!
//! # Overview
//!
//! This crate is not a sketch-programming library: it's the other side of the wire. Point it
//! at a set of serial ports and/or a TCP port, and for every Firmata-speaking board that
//! connects it runs a [`device::DeviceSession`] — a small state machine that identifies the
//! board, watches its heartbeat, and turns named actions (`TOGGLELED`, `SETPINVALUE`, ...)
//! into the right wire bytes for that board's reported [`variant::Variant`].
//!
//! Every currently-online session is tracked by a [`roster::Roster`], which republishes
//! `joined`/`updated`/`left` events and exposes a [`device::DiscreteSnapshot`] per device —
//! the single external projection consumers (a CLI, an HTTP handler, another program) should
//! depend on instead of reaching into session internals.
//!
//! ```no_run
//! use std::sync::Arc;
//! use firmata_gateway::config::GatewayConfig;
//! use firmata_gateway::repository::NullDeviceRepository;
//! use firmata_gateway::listener::Listener;
//! use firmata_gateway::roster::Roster;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), firmata_gateway::errors::Error> {
//!     let roster = Roster::new(Arc::new(NullDeviceRepository));
//!     roster.on_joined(|snapshot| {
//!         log::info!("device joined: {:?}", snapshot.name);
//!         Box::pin(async { Ok(()) })
//!     });
//!
//!     let listener = Listener::new(GatewayConfig::default(), roster);
//!     listener.run().await
//! }
//! ```
//!
//! # Feature flags
//!
//! - **libudev** -- (enabled by default) Activates `serialport`'s `libudev` feature, required
//!   on Linux for port enumeration.
//! - **serde** -- Enables serialize/deserialize on the types exposed across the roster's
//!   external boundary ([`device::DiscreteSnapshot`], [`config::GatewayConfig`], ...).
//! - **mocks** -- Provides [`mocks::MockLink`], a scriptable [`link::Link`] used by this
//!   crate's own tests and available to downstream integration tests.

pub mod config;
pub mod device;
pub mod dispatch;
pub mod errors;
pub mod firmata;
pub mod link;
pub mod listener;
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
pub mod pin;
pub mod repository;
pub mod roster;
pub mod utils;
pub mod variant;

pub use config::GatewayConfig;
pub use device::{DeviceSession, DiscreteSnapshot, Identity, SessionHandle};
pub use dispatch::ActionValue;
pub use errors::Error;
pub use listener::Listener;
pub use repository::{DeviceRepository, NullDeviceRepository};
pub use roster::Roster;
pub use variant::Variant;
