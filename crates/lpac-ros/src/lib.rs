//! lpac-ros library crate.
//!
//! This crate lets lpac use a SIM that sits in an LTE modem inside a RouterOS
//! router.  lpac runs as a child process in `LPAC_APDU=stdio` mode; every APDU
//! request it prints is turned into AT commands sent through the router's
//! `/interface/lte/at-chat`, and the modem's answer is written back to lpac.
//!
//! # Architecture
//!
//! ```text
//! lpac (JSON lines on stdio)
//!         ↕
//! [lpac-ros]
//!   ├── domain/           BridgeConfig
//!   ├── application/
//!   │     ├── bridge_service/ Bridge loop: classify lines, dispatch APDU functions
//!   │     └── discovery/  LTE interfaces that answer AT
//!   └── infrastructure/
//!         ├── routeros/   RouterOS API client (lpac-ros-core sentence codec)
//!         ├── modem/      AT chat over the API
//!         └── driver_process/ Find and spawn lpac
//!         ↕
//! RouterOS router → LTE modem → SIM / eUICC
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O.
//! - The bridge loop reaches the modem only through the
//!   [`application::ModemChannel`] trait.
//! - Discovery and the modem channel reach the router only through the
//!   [`infrastructure::RouterApi`] trait.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: the APDU bridge state machine and interface discovery.
pub mod application;

/// Infrastructure layer: RouterOS connection, modem channel, lpac process.
pub mod infrastructure;
