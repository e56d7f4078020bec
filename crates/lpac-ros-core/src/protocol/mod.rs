//! Protocol module containing the driver-host envelope and the RouterOS API codec.

pub mod envelope;
pub mod sentence;

pub use envelope::{decode_line, encode_line, DecodeError, DriverLine, Envelope};
pub use sentence::{decode_sentence, encode_sentence, ApiCommand, Record, Reply, SentenceError};
