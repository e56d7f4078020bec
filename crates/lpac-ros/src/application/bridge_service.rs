//! The APDU bridge state machine.
//!
//! lpac writes one line at a time.  Each line goes through the same cycle:
//!
//! ```text
//! Idle ──read line──▶ Classify ──┬─▶ Forward  (copy line to the user's stdout)
//!   ▲                            └─▶ Dispatch (AT round trips, reply to lpac)
//!   └────────────────────────────────────┘
//! ```
//!
//! Dispatch table:
//!
//! | func                  | AT traffic                        | ecode          |
//! |-----------------------|-----------------------------------|----------------|
//! | `connect`             | `AT+CCHC=1` .. `AT+CCHC=4`        | 0              |
//! | `disconnect`          | none                              | 0              |
//! | `logic_channel_open`  | `AT+CCHO="<aid>"`                 | channel id     |
//! | `logic_channel_close` | `AT+CCHC=<id>`                    | 0              |
//! | `transmit`            | `AT+CGLA=<ch>,<len>,"<apdu>"`     | channel id     |
//!
//! Leaf functions never terminate the process.  They return a
//! [`BridgeError`], and [`ApduBridge::respond`] decides once, through
//! [`BridgeError::is_fatal`], whether lpac gets a failure code or the bridge
//! stops.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, trace, warn};

use lpac_ros_core::domain::at;
use lpac_ros_core::protocol::envelope::encode_line;
use lpac_ros_core::{
    ApduFunc, ApduRequest, DriverLine, Envelope, ExtractError, ResponsePayload, Session,
};

/// `ecode` returned to lpac when a request failed without stopping the bridge.
///
/// Equal to [`lpac_ros_core::UNSET_CHANNEL`], so a `transmit` before any
/// `logic_channel_open` also answers `-1`.  Only that success carries `data`;
/// a failure never does.
pub const FAILURE_ECODE: i32 = -1;

// ── Modem port ────────────────────────────────────────────────────────────────

/// Errors the modem channel reports for replies that violate the protocol.
///
/// A failed remote call is not one of them: it yields an empty reply.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModemError {
    /// The router answered with zero reply records.
    #[error("failed to communicate with modem on {interface}: no reply records")]
    NoReply { interface: String },

    /// The first reply record carried no text.
    #[error("failed to communicate with modem on {interface}: empty reply record")]
    EmptyRecord { interface: String },
}

/// Sends one AT command to the modem and returns its textual reply.
///
/// An empty string means the command could not be delivered; callers treat it
/// like any other reply that lacks the expected acknowledgement.
#[async_trait]
pub trait ModemChannel: Send {
    async fn send(&mut self, command: &str) -> Result<String, ModemError>;
}

// ── Error type ────────────────────────────────────────────────────────────────

/// Errors raised while serving lpac.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Modem(#[from] ModemError),

    /// The modem answered `AT+CCHO` with `ERROR`.
    #[error("failed to open logical channel, resp={reply:?}")]
    OpenRejected { reply: String },

    /// The `AT+CCHO` reply had no channel id.
    #[error("failed to open logical channel: {0}")]
    OpenUnacknowledged(#[source] ExtractError),

    /// The `AT+CGLA` reply had no response data.
    #[error("transmit failed: {0}")]
    TransmitUnacknowledged(#[source] ExtractError),

    /// `param` was missing or not text.
    #[error("`{func}` needs a text param, got {param}")]
    InvalidParam { func: String, param: Value },

    #[error("driver host stream failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl BridgeError {
    /// Whether this error must stop the bridge.
    ///
    /// Only failures that leave lpac able to carry on are recoverable: a
    /// transmit without a response (lpac sees a failed APDU) and a request
    /// with an unusable `param`.  Without an open channel or a working modem
    /// or stdio there is nothing left to serve.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            BridgeError::TransmitUnacknowledged(_) | BridgeError::InvalidParam { .. }
        )
    }
}

// ── Bridge ────────────────────────────────────────────────────────────────────

/// Serves lpac's APDU requests over a [`ModemChannel`].
///
/// Owns the [`Session`], so two bridges in one process never share a channel.
pub struct ApduBridge<M> {
    modem: M,
    session: Session,
}

impl<M: ModemChannel> ApduBridge<M> {
    pub fn new(modem: M) -> Self {
        Self {
            modem,
            session: Session::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn modem(&self) -> &M {
        &self.modem
    }

    /// Runs the bridge until lpac closes its output.
    ///
    /// - `from_host` – lpac's stdout.
    /// - `to_host`   – lpac's stdin; receives CRLF-terminated responses.
    /// - `display`   – the user's output; receives every non-APDU line verbatim.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`BridgeError`].  No response is written for the
    /// request that caused it.
    pub async fn run<R, W, D>(
        &mut self,
        mut from_host: R,
        mut to_host: W,
        mut display: D,
    ) -> Result<(), BridgeError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        D: AsyncWrite + Unpin,
    {
        let mut raw = Vec::new();

        loop {
            raw.clear();
            if from_host.read_until(b'\n', &mut raw).await? == 0 {
                debug!("driver host closed its output");
                return Ok(());
            }

            // Bytes that are not UTF-8 cannot be an envelope; pass them on as-is.
            let Ok(text) = std::str::from_utf8(&raw) else {
                trace!("forwarding {} non-UTF-8 bytes", raw.len());
                display.write_all(&raw).await?;
                display.flush().await?;
                continue;
            };

            match DriverLine::classify(text) {
                None => {}
                Some(DriverLine::Display(line)) => {
                    display.write_all(line.raw.as_bytes()).await?;
                    display.flush().await?;
                }
                Some(DriverLine::Apdu(request)) => {
                    let payload = self.respond(&request).await?;
                    let line = encode_line(&Envelope::apdu(payload))?;
                    to_host.write_all(line.as_bytes()).await?;
                    to_host.flush().await?;
                }
            }
        }
    }

    /// Serves one request and applies the termination policy.
    ///
    /// # Errors
    ///
    /// Returns the error only when [`BridgeError::is_fatal`] holds; otherwise
    /// lpac receives `ecode = -1`.
    pub async fn respond(&mut self, request: &ApduRequest) -> Result<ResponsePayload, BridgeError> {
        match self.handle(request).await {
            Ok(payload) => Ok(payload),
            Err(e) if e.is_fatal() => {
                error!("{}: {e}", request.func.as_str());
                Err(e)
            }
            Err(e) => {
                warn!("{}: {e}", request.func.as_str());
                Ok(ResponsePayload::with_ecode(FAILURE_ECODE))
            }
        }
    }

    /// Dispatches one request on its `func`.
    ///
    /// # Errors
    ///
    /// Returns every failure, fatal or not, without applying any policy.
    pub async fn handle(&mut self, request: &ApduRequest) -> Result<ResponsePayload, BridgeError> {
        debug!("apdu request: {}", request.func.as_str());

        match &request.func {
            ApduFunc::Connect => self.connect().await,
            ApduFunc::Disconnect => Ok(ResponsePayload::with_ecode(0)),
            ApduFunc::LogicChannelOpen => {
                let aid = text_param(request)?;
                self.open_channel(&aid).await
            }
            ApduFunc::LogicChannelClose => {
                let channel = text_param(request)?;
                self.close_channel(&channel).await
            }
            ApduFunc::Transmit => {
                let apdu = text_param(request)?;
                self.transmit(&apdu).await
            }
            ApduFunc::Unknown(name) => {
                warn!("ignoring unknown apdu func {name:?}");
                Ok(ResponsePayload::with_ecode(0))
            }
        }
    }

    /// Closes every hardware logical channel, whatever the session says.
    async fn connect(&mut self) -> Result<ResponsePayload, BridgeError> {
        for channel in at::HARDWARE_CHANNELS {
            self.modem.send(&at::close_channel(channel)).await?;
        }
        Ok(ResponsePayload::with_ecode(0))
    }

    async fn open_channel(&mut self, aid: &str) -> Result<ResponsePayload, BridgeError> {
        let reply = self.modem.send(&at::open_channel(aid)).await?;
        if at::is_rejected(&reply) {
            return Err(BridgeError::OpenRejected { reply });
        }

        let channel = at::extract_channel(&reply).map_err(BridgeError::OpenUnacknowledged)?;
        self.session.set(channel);
        debug!("opened logical channel {channel}");

        Ok(ResponsePayload::with_ecode(channel))
    }

    /// Closes `channel` on the modem.
    ///
    /// The session keeps its channel id: lpac always opens a new channel before
    /// its next transmit, and the modem hands out the same ids again.
    async fn close_channel(&mut self, channel: &str) -> Result<ResponsePayload, BridgeError> {
        self.modem.send(&at::close_channel(channel)).await?;
        Ok(ResponsePayload::with_ecode(0))
    }

    async fn transmit(&mut self, apdu: &str) -> Result<ResponsePayload, BridgeError> {
        let channel = self.session.get();
        let reply = self.modem.send(&at::logical_access(channel, apdu)).await?;
        let data = at::extract_data(&reply).map_err(BridgeError::TransmitUnacknowledged)?;

        Ok(ResponsePayload {
            ecode: Some(channel),
            data: Some(Value::String(data)),
            env: None,
        })
    }
}

fn text_param(request: &ApduRequest) -> Result<String, BridgeError> {
    request
        .param_text()
        .ok_or_else(|| BridgeError::InvalidParam {
            func: request.func.as_str().to_owned(),
            param: request.param.clone(),
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use serde_json::json;
    use tokio::io::BufReader;

    use super::*;

    /// Modem fake that records commands and answers from a script.
    ///
    /// When the script runs out it answers `OK`.
    #[derive(Default)]
    struct ScriptedModem {
        sent: Vec<String>,
        replies: VecDeque<Result<String, ModemError>>,
    }

    impl ScriptedModem {
        fn replying(replies: &[&str]) -> Self {
            Self {
                sent: Vec::new(),
                replies: replies.iter().map(|r| Ok(r.to_string())).collect(),
            }
        }
    }

    #[async_trait]
    impl ModemChannel for ScriptedModem {
        async fn send(&mut self, command: &str) -> Result<String, ModemError> {
            self.sent.push(command.to_owned());
            self.replies
                .pop_front()
                .unwrap_or_else(|| Ok("OK".to_owned()))
        }
    }

    fn request(func: &str, param: Value) -> ApduRequest {
        ApduRequest {
            func: ApduFunc::from(func),
            param,
        }
    }

    const AID: &str = "A0000005591010FFFFFFFF8900000100";

    // ── Dispatch ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_connect_closes_all_four_channels() {
        // Arrange: a session already holding a channel must not change anything
        let mut bridge = ApduBridge::new(ScriptedModem::replying(&["+CCHO: 3\r\nOK"]));
        bridge.handle(&request("logic_channel_open", json!(AID))).await.unwrap();

        // Act
        let payload = bridge.handle(&request("connect", Value::Null)).await.unwrap();

        // Assert
        assert_eq!(payload, ResponsePayload::with_ecode(0));
        assert_eq!(
            bridge.modem().sent[1..],
            ["AT+CCHC=1", "AT+CCHC=2", "AT+CCHC=3", "AT+CCHC=4"]
        );
        assert_eq!(bridge.session().get(), 3);
    }

    #[tokio::test]
    async fn test_connect_ignores_undeliverable_commands() {
        let mut bridge = ApduBridge::new(ScriptedModem::replying(&["", "", "", ""]));
        let payload = bridge.handle(&request("connect", Value::Null)).await.unwrap();
        assert_eq!(payload.ecode, Some(0));
    }

    #[tokio::test]
    async fn test_disconnect_sends_nothing() {
        let mut bridge = ApduBridge::new(ScriptedModem::default());
        let payload = bridge.handle(&request("disconnect", Value::Null)).await.unwrap();
        assert_eq!(payload, ResponsePayload::with_ecode(0));
        assert!(bridge.modem().sent.is_empty());
    }

    #[tokio::test]
    async fn test_open_sets_session_and_returns_channel() {
        // Arrange
        let mut bridge = ApduBridge::new(ScriptedModem::replying(&["+CCHO: 2\r\nOK"]));

        // Act
        let payload = bridge
            .handle(&request("logic_channel_open", json!(AID)))
            .await
            .unwrap();

        // Assert
        assert_eq!(payload.ecode, Some(2));
        assert_eq!(bridge.session().get(), 2);
        assert_eq!(
            bridge.modem().sent,
            ["AT+CCHO=\"A0000005591010FFFFFFFF8900000100\""]
        );
    }

    #[tokio::test]
    async fn test_open_with_error_reply_is_fatal() {
        let mut bridge = ApduBridge::new(ScriptedModem::replying(&["\r\n+CME ERROR: 4"]));

        let err = bridge
            .respond(&request("logic_channel_open", json!(AID)))
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::OpenRejected { .. }));
        assert!(err.is_fatal());
        assert!(!bridge.session().is_open());
    }

    #[tokio::test]
    async fn test_open_without_acknowledgement_is_fatal() {
        // Undeliverable command: empty reply, nothing to extract
        let mut bridge = ApduBridge::new(ScriptedModem::replying(&[""]));

        let err = bridge
            .respond(&request("logic_channel_open", json!(AID)))
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::OpenUnacknowledged(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_transmit_uses_session_channel() {
        // Arrange
        let mut bridge = ApduBridge::new(ScriptedModem::replying(&[
            "+CCHO: 2\r\nOK",
            "+CGLA: 2,\"9000\"\r\nOK",
        ]));
        bridge.handle(&request("logic_channel_open", json!(AID))).await.unwrap();

        // Act
        let payload = bridge
            .handle(&request("transmit", json!("80AA000000")))
            .await
            .unwrap();

        // Assert
        assert_eq!(payload.ecode, Some(2));
        assert_eq!(payload.data, Some(json!("9000")));
        assert_eq!(bridge.modem().sent[1], "AT+CGLA=2,10,\"80AA000000\"");
    }

    #[tokio::test]
    async fn test_transmit_without_acknowledgement_returns_failure_code() {
        let mut bridge = ApduBridge::new(ScriptedModem::replying(&["+CME ERROR: 21"]));

        let payload = bridge
            .respond(&request("transmit", json!("00A4040000")))
            .await
            .unwrap();

        assert_eq!(payload, ResponsePayload::with_ecode(FAILURE_ECODE));
    }

    #[tokio::test]
    async fn test_transmit_before_open_uses_unset_channel() {
        let mut bridge = ApduBridge::new(ScriptedModem::replying(&["+CGLA: 4,\"6A82\""]));
        let payload = bridge.handle(&request("transmit", json!("00"))).await.unwrap();
        assert_eq!(bridge.modem().sent, ["AT+CGLA=-1,2,\"00\""]);
        assert_eq!(payload.ecode, Some(FAILURE_ECODE));
        assert_eq!(payload.data, Some(json!("6A82")));
    }

    #[tokio::test]
    async fn test_close_keeps_session_channel() {
        // Arrange
        let mut bridge = ApduBridge::new(ScriptedModem::replying(&[
            "+CCHO: 1\r\nOK",
            "OK",
            "+CGLA: 4,\"9000\"",
        ]));
        bridge.handle(&request("logic_channel_open", json!(AID))).await.unwrap();

        // Act
        let closed = bridge
            .handle(&request("logic_channel_close", json!("1")))
            .await
            .unwrap();
        bridge.handle(&request("transmit", json!("00"))).await.unwrap();

        // Assert: the closed id is still the session channel
        assert_eq!(closed, ResponsePayload::with_ecode(0));
        assert_eq!(bridge.session().get(), 1);
        assert_eq!(bridge.modem().sent[1], "AT+CCHC=1");
        assert_eq!(bridge.modem().sent[2], "AT+CGLA=1,2,\"00\"");
    }

    #[tokio::test]
    async fn test_close_accepts_numeric_param() {
        let mut bridge = ApduBridge::new(ScriptedModem::default());
        bridge
            .handle(&request("logic_channel_close", json!(3)))
            .await
            .unwrap();
        assert_eq!(bridge.modem().sent, ["AT+CCHC=3"]);
    }

    #[tokio::test]
    async fn test_missing_param_returns_failure_code() {
        let mut bridge = ApduBridge::new(ScriptedModem::default());
        let payload = bridge
            .respond(&request("transmit", Value::Null))
            .await
            .unwrap();
        assert_eq!(payload.ecode, Some(FAILURE_ECODE));
        assert!(bridge.modem().sent.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_func_answers_zero() {
        let mut bridge = ApduBridge::new(ScriptedModem::default());
        let payload = bridge.respond(&request("reset", Value::Null)).await.unwrap();
        assert_eq!(payload, ResponsePayload::with_ecode(0));
    }

    #[tokio::test]
    async fn test_modem_protocol_violation_is_fatal() {
        let mut bridge = ApduBridge::new(ScriptedModem {
            sent: Vec::new(),
            replies: VecDeque::from([Err(ModemError::NoReply {
                interface: "lte1".into(),
            })]),
        });

        let err = bridge
            .respond(&request("connect", Value::Null))
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Modem(ModemError::NoReply { .. })));
        assert!(err.is_fatal());
    }

    // ── Loop ──────────────────────────────────────────────────────────────────

    async fn run_lines(
        bridge: &mut ApduBridge<ScriptedModem>,
        input: &str,
    ) -> (Result<(), BridgeError>, String, String) {
        let mut to_host: Vec<u8> = Vec::new();
        let mut display: Vec<u8> = Vec::new();
        let result = bridge
            .run(BufReader::new(input.as_bytes()), &mut to_host, &mut display)
            .await;
        (
            result,
            String::from_utf8(to_host).unwrap(),
            String::from_utf8(display).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_loop_forwards_display_lines_and_answers_requests() {
        // Arrange
        let mut bridge = ApduBridge::new(ScriptedModem::default());
        let input = concat!(
            "{\"type\":\"apdu\",\"payload\":{\"func\":\"disconnect\"}}\n",
            "not json at all\n",
            "\n",
            "{\"type\":\"lpa\",\"payload\":{\"code\":0,\"message\":\"success\"}}\n",
        );

        // Act
        let (result, to_host, display) = run_lines(&mut bridge, input).await;

        // Assert
        assert!(result.is_ok());
        assert_eq!(to_host, "{\"type\":\"apdu\",\"payload\":{\"ecode\":0}}\r\n");
        assert_eq!(
            display,
            "not json at all\n{\"type\":\"lpa\",\"payload\":{\"code\":0,\"message\":\"success\"}}\n"
        );
    }

    #[tokio::test]
    async fn test_loop_answers_apdu_lines_without_payload() {
        // Arrange
        let mut bridge = ApduBridge::new(ScriptedModem::default());
        let input = "{\"type\":\"apdu\"}\n{\"type\":\"apdu\",\"payload\":null}\n";

        // Act
        let (result, to_host, display) = run_lines(&mut bridge, input).await;

        // Assert
        assert!(result.is_ok());
        assert_eq!(
            to_host,
            "{\"type\":\"apdu\",\"payload\":{\"ecode\":0}}\r\n".repeat(2)
        );
        assert!(display.is_empty());
        assert!(bridge.modem().sent.is_empty());
    }

    #[tokio::test]
    async fn test_loop_stops_on_fatal_error_without_response() {
        let mut bridge = ApduBridge::new(ScriptedModem::replying(&["+CCHO: 1\r\nERROR"]));
        let input = concat!(
            "{\"type\":\"apdu\",\"payload\":{\"func\":\"logic_channel_open\",\"param\":\"A000\"}}\n",
            "{\"type\":\"apdu\",\"payload\":{\"func\":\"disconnect\"}}\n",
        );

        let (result, to_host, _) = run_lines(&mut bridge, input).await;

        assert!(matches!(result, Err(BridgeError::OpenRejected { .. })));
        assert!(to_host.is_empty());
        assert_eq!(bridge.modem().sent.len(), 1);
    }

    #[tokio::test]
    async fn test_loop_forwards_non_utf8_bytes() {
        let mut bridge = ApduBridge::new(ScriptedModem::default());
        let mut display: Vec<u8> = Vec::new();
        let input: &[u8] = b"\xff\xfe raw\n";

        bridge
            .run(BufReader::new(input), Vec::<u8>::new(), &mut display)
            .await
            .unwrap();

        assert_eq!(display, input);
    }
}
