//! Domain layer for lpac-ros.
//!
//! Holds the runtime configuration.  Populating it from CLI arguments or
//! environment variables is done in `main.rs`.

pub mod config;

pub use config::BridgeConfig;
