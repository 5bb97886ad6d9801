//! An IPMI v2.0 (RMCP+) session client.
//!
//! This library provides the session-establishment wire codecs (in the
//! [`rmcp`] and [`v2::messages`] modules), the RAKP key exchange and its
//! crypto (in [`v2::crypto`]), and an authenticated/encrypted command
//! engine ([`Session`]) that drives [`commands`] against a BMC over a
//! pluggable datagram [`Transport`].
//!
//! ```no_run
//! use rmcp_plus::{Context, Session, SessionConfig, UdpTransport, Username};
//! use rmcp_plus::commands::GetDeviceId;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error + 'static>> {
//! let transport = UdpTransport::connect(("10.0.0.1", rmcp_plus::IPMI_PORT))?;
//! let config = SessionConfig::new(Username::new("admin").unwrap(), b"password");
//!
//! let ctx = Context::with_timeout(Duration::from_secs(30));
//! let mut session = Session::establish(transport, &ctx, config).unwrap();
//!
//! let device_id = session.send_command(&ctx, &GetDeviceId).unwrap();
//! println!("{device_id:?}");
//!
//! session.close(&ctx).unwrap();
//! # Ok(())
//! # }
//! ```

pub mod commands;

mod context;
pub use context::{CancelHandle, Context, ContextError};

mod metrics;
pub use metrics::{NoOpObserver, SessionObserver};

pub mod rmcp;

mod transport;
pub use transport::{Transport, TransportError, UdpTransport, IPMI_PORT};

pub mod v2;
pub use v2::{
    messages::Username, AlgorithmPreferences, BackoffConfig, EstablishError, PrivilegeLevel,
    Session, SessionConfig, SessionError,
};

#[cfg(test)]
mod tests;
