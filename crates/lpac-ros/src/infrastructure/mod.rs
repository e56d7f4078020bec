//! Infrastructure layer for lpac-ros: all I/O.
//!
//! - [`routeros`] speaks the RouterOS API over TCP.
//! - [`modem`] turns AT commands into `at-chat` calls.
//! - [`driver_process`] locates and launches lpac.

pub mod driver_process;
pub mod modem;
pub mod routeros;

pub use driver_process::{resolve_driver_binary, spawn_driver, DriverBinaryError};
pub use modem::{at_chat, RouterOsModem};
pub use routeros::{RouterApi, RouterOsClient, RouterOsError};
