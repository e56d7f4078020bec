//! AT commands for SIM logical channels and the parser for their replies.
//!
//! Three 3GPP TS 27.007 commands carry the whole APDU conversation:
//!
//! ```text
//! AT+CCHO="<AID>"              → +CCHO: <channel>      open a logical channel
//! AT+CGLA=<ch>,<len>,"<apdu>"  → +CGLA: <len>,<resp>   exchange one APDU
//! AT+CCHC=<channel>            → OK                    close a logical channel
//! ```
//!
//! Reply parsing is positional: the first match wins and surrounding text
//! (echoes, `OK`, blank lines) is ignored.

use std::ops::RangeInclusive;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Logical channels a modem can have open at once, besides the basic channel 0.
pub const HARDWARE_CHANNELS: RangeInclusive<u8> = 1..=4;

/// Errors raised when a modem reply lacks the expected acknowledgement.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("no +CCHO acknowledgement in modem reply {0:?}")]
    MissingChannel(String),

    #[error("channel id {0:?} does not fit in an integer")]
    ChannelOutOfRange(String),

    #[error("no +CGLA acknowledgement in modem reply {0:?}")]
    MissingData(String),
}

fn ccho_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\+CCHO:\s?(\d+)").expect("static regex"))
}

fn cgla_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\+CGLA:\s?(\d+),(\S+)").expect("static regex"))
}

// ── Command builders ──────────────────────────────────────────────────────────

/// `AT+CCHC=<channel>`
pub fn close_channel(channel: impl std::fmt::Display) -> String {
    format!("AT+CCHC={channel}")
}

/// `AT+CCHO="<aid>"`
pub fn open_channel(aid: &str) -> String {
    format!("AT+CCHO=\"{aid}\"")
}

/// `AT+CGLA=<channel>,<len>,"<apdu>"` where `len` counts hex characters.
pub fn logical_access(channel: i32, apdu: &str) -> String {
    format!("AT+CGLA={channel},{},\"{apdu}\"", apdu.len())
}

/// Plain `AT`, answered with `OK` by any responsive modem.
pub const PROBE: &str = "AT";

// ── Reply parsing ─────────────────────────────────────────────────────────────

/// Returns `true` when an open-channel reply reports `ERROR` after its first
/// character.
pub fn is_rejected(reply: &str) -> bool {
    reply.rfind("ERROR").is_some_and(|pos| pos > 0)
}

/// Extracts the channel id from a `+CCHO: <digits>` acknowledgement.
///
/// # Errors
///
/// Returns [`ExtractError::MissingChannel`] when no acknowledgement is present.
///
/// # Examples
///
/// ```rust
/// use lpac_ros_core::extract_channel;
///
/// assert_eq!(extract_channel("+CCHO: 2\r\nOK"), Ok(2));
/// ```
pub fn extract_channel(reply: &str) -> Result<i32, ExtractError> {
    let digits = ccho_pattern()
        .captures(reply)
        .and_then(|c| c.get(1))
        .ok_or_else(|| ExtractError::MissingChannel(reply.to_owned()))?
        .as_str();

    digits
        .parse()
        .map_err(|_| ExtractError::ChannelOutOfRange(digits.to_owned()))
}

/// Extracts the response APDU from a `+CGLA: <len>,<data>` acknowledgement,
/// with the quotes the firmware puts around hex strings removed.
///
/// # Errors
///
/// Returns [`ExtractError::MissingData`] when no acknowledgement is present.
///
/// # Examples
///
/// ```rust
/// use lpac_ros_core::extract_data;
///
/// assert_eq!(extract_data("+CGLA: 4,\"9000\"\r\nOK").as_deref(), Ok("9000"));
/// ```
pub fn extract_data(reply: &str) -> Result<String, ExtractError> {
    let data = cgla_pattern()
        .captures(reply)
        .and_then(|c| c.get(2))
        .ok_or_else(|| ExtractError::MissingData(reply.to_owned()))?;

    Ok(data.as_str().replace('"', ""))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
