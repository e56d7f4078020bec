//! Application layer for lpac-ros.
//!
//! Knows *what* the bridge does with lpac's requests and with the router's
//! LTE interfaces, and leaves sockets and processes to the infrastructure
//! layer.
//!
//! - [`bridge_service`] serves lpac's APDU requests over a [`ModemChannel`].
//! - [`discovery`] finds the LTE interfaces that accept AT commands.

pub mod bridge_service;
pub mod discovery;

pub use bridge_service::{ApduBridge, BridgeError, ModemChannel, ModemError, FAILURE_ECODE};
pub use discovery::{discover, interface_listing, DiscoveryError};
