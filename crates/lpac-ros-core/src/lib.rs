//! # lpac-ros-core
//!
//! Shared library for lpac-ros containing the driver-host envelope codec, the
//! RouterOS API wire codec, and the AT command grammar used to reach a SIM
//! card through a cellular modem.
//!
//! It has zero dependencies on sockets, processes, or async runtimes.
//!
//! # Architecture overview
//!
//! lpac-ros lets an eUICC provisioning tool (lpac, the "driver host") send
//! APDUs to a SIM that sits in an LTE modem inside a RouterOS router.  The
//! host speaks line-delimited JSON on stdio; the router only offers AT chat
//! through its management API.  This crate defines both languages:
//!
//! - **`protocol`** – How bytes travel.  [`protocol::envelope`] is the JSON
//!   envelope exchanged with the driver host, and [`protocol::sentence`] is
//!   the length-prefixed word framing of the RouterOS API.
//!
//! - **`domain`** – Pure logic with no I/O: the AT commands for logical
//!   channels, the parser for the modem's textual replies, the open-channel
//!   [`Session`], and the description of a modem attachment point.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `lpac_ros_core::Session` instead of `lpac_ros_core::domain::session::Session`.
pub use domain::at::{extract_channel, extract_data, ExtractError};
pub use domain::interface::ModemInterface;
pub use domain::session::{Session, UNSET_CHANNEL};
pub use protocol::envelope::{
    ApduFunc, ApduRequest, DecodeError, DisplayLine, DriverLine, Envelope, RequestPayload,
    ResponsePayload,
};
pub use protocol::sentence::{
    decode_sentence, encode_sentence, ApiCommand, Record, Reply, SentenceError,
};
