//! JSON envelopes exchanged with the driver host over stdio.
//!
//! The driver host (lpac with `LPAC_APDU=stdio`) writes one JSON object per
//! line.  Every object has the same outer shape:
//!
//! ```json
//! {"type":"apdu","payload":{"func":"transmit","param":"80AA000000"}}
//! ```
//!
//! Only `"type":"apdu"` lines are requests for the bridge.  The same stream
//! also carries the host's own progress and result output (`"type":"lpa"`,
//! `"type":"progress"`, plain text, ...), which the bridge must forward to the
//! user untouched.  [`DriverLine::classify`] separates the two once, at the
//! boundary, so nothing downstream ever looks at raw text again.
//!
//! Responses go back as:
//!
//! ```json
//! {"type":"apdu","payload":{"ecode":2,"data":"9000"}}
//! ```
//!
//! terminated with CRLF.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

/// Envelope type consumed by the bridge.
pub const APDU_TYPE: &str = "apdu";

/// Envelope type used by the driver host for its own results.
pub const LPA_TYPE: &str = "lpa";

/// Line terminator expected by the driver host on responses.
pub const RESPONSE_TERMINATOR: &str = "\r\n";

/// Errors produced while decoding a driver-host line.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The line is not a JSON object of the envelope shape.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}

// ── Envelope shapes ───────────────────────────────────────────────────────────

/// Outer shape shared by requests and responses.
///
/// A missing or `null` payload decodes as `P::default()`: an `"apdu"` line
/// always gets an answer, even one without a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "P: Deserialize<'de> + Default"))]
pub struct Envelope<P> {
    /// Channel discriminant: `"apdu"`, `"lpa"`, ...
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub payload: P,
}

fn null_as_default<'de, D, P>(deserializer: D) -> Result<P, D::Error>
where
    D: Deserializer<'de>,
    P: Deserialize<'de> + Default,
{
    Ok(Option::<P>::deserialize(deserializer)?.unwrap_or_default())
}

/// Request payload written by the driver host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    #[serde(default)]
    pub func: String,
    /// AID, channel id, or APDU hex depending on `func`.
    #[serde(default)]
    pub param: Value,
}

/// Response payload written back to the driver host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ecode: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub env: Option<String>,
}

impl ResponsePayload {
    /// A payload carrying only an error code.
    pub fn with_ecode(ecode: i32) -> Self {
        Self {
            ecode: Some(ecode),
            ..Self::default()
        }
    }
}

impl Envelope<ResponsePayload> {
    /// Wraps `payload` in an `"apdu"` envelope.
    pub fn apdu(payload: ResponsePayload) -> Self {
        Self {
            kind: APDU_TYPE.to_owned(),
            payload,
        }
    }
}

// ── APDU requests ─────────────────────────────────────────────────────────────

/// The driver functions the bridge knows how to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApduFunc {
    Connect,
    Disconnect,
    LogicChannelOpen,
    LogicChannelClose,
    Transmit,
    /// Any other `func` value, kept for logging.
    Unknown(String),
}

impl ApduFunc {
    pub fn as_str(&self) -> &str {
        match self {
            ApduFunc::Connect => "connect",
            ApduFunc::Disconnect => "disconnect",
            ApduFunc::LogicChannelOpen => "logic_channel_open",
            ApduFunc::LogicChannelClose => "logic_channel_close",
            ApduFunc::Transmit => "transmit",
            ApduFunc::Unknown(name) => name,
        }
    }
}

impl From<&str> for ApduFunc {
    fn from(name: &str) -> Self {
        match name {
            "connect" => ApduFunc::Connect,
            "disconnect" => ApduFunc::Disconnect,
            "logic_channel_open" => ApduFunc::LogicChannelOpen,
            "logic_channel_close" => ApduFunc::LogicChannelClose,
            "transmit" => ApduFunc::Transmit,
            other => ApduFunc::Unknown(other.to_owned()),
        }
    }
}

/// A decoded `"apdu"` request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApduRequest {
    pub func: ApduFunc,
    pub param: Value,
}

impl ApduRequest {
    /// Returns `param` as text.  Numbers are accepted and rendered in decimal.
    pub fn param_text(&self) -> Option<String> {
        match &self.param {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

// ── Line classification ───────────────────────────────────────────────────────

/// Why a line is forwarded to the user instead of being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayOrigin {
    /// The line did not decode as an envelope.
    NotEnvelope,
    /// The line is an envelope of another type (e.g. `"lpa"`).
    OtherType(String),
}

/// A line destined for the human-facing output, kept byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLine {
    /// The raw line including its terminator, if it had one.
    pub raw: String,
    pub origin: DisplayOrigin,
}

/// One line read from the driver host, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverLine {
    Display(DisplayLine),
    Apdu(ApduRequest),
}

impl DriverLine {
    /// Classifies a raw line.
    ///
    /// Returns `None` for an empty line (nothing but a terminator), which the
    /// bridge discards.
    pub fn classify(raw: &str) -> Option<Self> {
        if raw.trim_end_matches(['\r', '\n']).is_empty() {
            return None;
        }

        let envelope = match decode_line(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                trace!("forwarding non-envelope line: {e}");
                return Some(DriverLine::Display(DisplayLine {
                    raw: raw.to_owned(),
                    origin: DisplayOrigin::NotEnvelope,
                }));
            }
        };

        if envelope.kind != APDU_TYPE {
            trace!("forwarding {:?} envelope", envelope.kind);
            return Some(DriverLine::Display(DisplayLine {
                raw: raw.to_owned(),
                origin: DisplayOrigin::OtherType(envelope.kind),
            }));
        }

        Some(DriverLine::Apdu(ApduRequest {
            func: ApduFunc::from(envelope.payload.func.as_str()),
            param: envelope.payload.param,
        }))
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Decodes one line as a request envelope.
///
/// # Errors
///
/// Returns [`DecodeError::Malformed`] if the line is not JSON or does not
/// have the envelope shape.
pub fn decode_line(line: &str) -> Result<Envelope<RequestPayload>, DecodeError> {
    Ok(serde_json::from_str(line.trim_end_matches(['\r', '\n']))?)
}

/// Encodes a response envelope as one CRLF-terminated line.
///
/// # Errors
///
/// Returns the underlying `serde_json` error if serialization fails.
pub fn encode_line(envelope: &Envelope<ResponsePayload>) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(envelope)?;
    line.push_str(RESPONSE_TERMINATOR);
    Ok(line)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
