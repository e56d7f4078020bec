//! Async client for the RouterOS API.
//!
//! The API runs over a plain TCP connection (port 8728 by default).  A request
//! is one sentence; the router answers with zero or more `!re` sentences and a
//! closing `!done`:
//!
//! ```text
//! → /interface/lte/print
//! ← !re   =name=lte1 =running=true
//! ← !re   =name=lte2 =running=false
//! ← !done
//! ```
//!
//! TCP delivers bytes, not sentences, so replies are accumulated in a receive
//! buffer and decoded with [`decode_sentence`] until it stops reporting
//! `InsufficientData`.

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use lpac_ros_core::{decode_sentence, encode_sentence, ApiCommand, Record, Reply, SentenceError};

/// Errors raised by the RouterOS API client.
#[derive(Debug, Error)]
pub enum RouterOsError {
    #[error("RouterOS connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("RouterOS framing error: {0}")]
    Framing(#[from] SentenceError),

    #[error("RouterOS closed the connection")]
    ConnectionClosed,

    /// The command was rejected with `!trap`.
    #[error("RouterOS device error: {message}")]
    Device { message: String },

    /// The router sent `!fatal` and is closing the connection.
    #[error("RouterOS fatal error: {0}")]
    Fatal(String),

    #[error("RouterOS login failed: {0}")]
    LoginFailed(String),

    /// The router asked for the pre-6.43 challenge login.
    #[error("RouterOS requested the legacy challenge login, which is not supported")]
    LegacyLogin,
}

/// Runs API commands and returns their result records.
///
/// The seam the modem channel and interface discovery are written against.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RouterApi: Send {
    /// Runs one command and returns its `!re` records in reply order.
    async fn run(&mut self, command: ApiCommand) -> Result<Vec<Record>, RouterOsError>;
}

/// A logged-out or logged-in connection to a RouterOS router.
pub struct RouterOsClient<S = TcpStream> {
    stream: S,
    /// Accumulates bytes across `read()` calls until a sentence decodes.
    recv_buf: Vec<u8>,
}

impl RouterOsClient<TcpStream> {
    /// Opens a TCP connection to `addr` (`host:port`).
    ///
    /// # Errors
    ///
    /// Returns [`RouterOsError::Io`] if the connection cannot be established.
    pub async fn connect(addr: &str) -> Result<Self, RouterOsError> {
        let stream = TcpStream::connect(addr).await?;
        debug!("connected to RouterOS API at {addr}");
        Ok(Self::new(stream))
    }
}

impl<S> RouterOsClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            recv_buf: Vec::with_capacity(4096),
        }
    }

    /// Logs in with the post-6.43 plain-text method.
    ///
    /// # Errors
    ///
    /// - [`RouterOsError::LoginFailed`] when the credentials are rejected.
    /// - [`RouterOsError::LegacyLogin`] when the router answers with a
    ///   challenge (`=ret=`).
    pub async fn login(&mut self, user: &str, password: &str) -> Result<(), RouterOsError> {
        let command = ApiCommand::new("/login")
            .with("name", user)
            .with("password", password);

        let (_, done) = match self.exchange(&command).await {
            Ok(reply) => reply,
            Err(RouterOsError::Device { message }) => {
                return Err(RouterOsError::LoginFailed(message))
            }
            Err(e) => return Err(e),
        };

        if done.get("ret").is_some() {
            return Err(RouterOsError::LegacyLogin);
        }

        debug!("logged in to RouterOS as {user}");
        Ok(())
    }

    /// Sends `command` and collects its reply.
    ///
    /// Returns the `!re` records and the attributes of the closing `!done`.
    async fn exchange(
        &mut self,
        command: &ApiCommand,
    ) -> Result<(Vec<Record>, Record), RouterOsError> {
        let bytes = encode_sentence(&command.to_words())?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;

        let mut records = Vec::new();
        let mut trap: Option<String> = None;

        loop {
            match self.read_reply().await? {
                Reply::Re(record) => records.push(record),
                Reply::Empty => {}
                Reply::Trap(record) => {
                    let message = record.get("message").unwrap_or_default().to_owned();
                    warn!("{} trapped: {message}", command.path);
                    // The first trap wins; the router still ends with `!done`.
                    trap.get_or_insert(message);
                }
                Reply::Fatal(message) => return Err(RouterOsError::Fatal(message)),
                Reply::Done(done) => {
                    return match trap {
                        Some(message) => Err(RouterOsError::Device { message }),
                        None => Ok((records, done)),
                    };
                }
            }
        }
    }

    /// Reads until one complete reply sentence is buffered and decodes it.
    async fn read_reply(&mut self) -> Result<Reply, RouterOsError> {
        let mut read_tmp = [0u8; 4096];

        loop {
            match decode_sentence(&self.recv_buf) {
                Ok((words, consumed)) => {
                    self.recv_buf.drain(..consumed);
                    return Ok(Reply::from_words(&words)?);
                }
                Err(SentenceError::InsufficientData { .. }) => {}
                Err(e) => return Err(e.into()),
            }

            let n = self.stream.read(&mut read_tmp).await?;
            if n == 0 {
                return Err(RouterOsError::ConnectionClosed);
            }
            self.recv_buf.extend_from_slice(&read_tmp[..n]);
        }
    }
}

#[async_trait]
impl<S> RouterApi for RouterOsClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn run(&mut self, command: ApiCommand) -> Result<Vec<Record>, RouterOsError> {
        let (records, _) = self.exchange(&command).await?;
        Ok(records)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use tokio::io::{duplex, DuplexStream};
    use tokio::net::TcpListener;

    use super::*;

    fn sentence(words: &[&str]) -> Vec<u8> {
        encode_sentence(words).unwrap()
    }

    /// Decodes every sentence the client wrote to the router side.
    async fn written_sentences(router: &mut DuplexStream) -> Vec<Vec<String>> {
        let mut buf = vec![0u8; 4096];
        let n = router.read(&mut buf).await.unwrap();
        let mut bytes = &buf[..n];
        let mut sentences = Vec::new();
        while !bytes.is_empty() {
            let (words, consumed) = decode_sentence(bytes).unwrap();
            sentences.push(words);
            bytes = &bytes[consumed..];
        }
        sentences
    }

    #[tokio::test]
    async fn test_run_collects_records_until_done() {
        // Arrange: the router's answer is queued before the command is sent
        let (client_side, mut router) = duplex(4096);
        let mut replies = sentence(&["!re", "=name=lte1", "=running=true"]);
        replies.extend(sentence(&["!re", "=name=lte2", "=running=false"]));
        replies.extend(sentence(&["!done"]));
        router.write_all(&replies).await.unwrap();
        let mut client = RouterOsClient::new(client_side);

        // Act
        let records = client
            .run(ApiCommand::new("/interface/lte/print"))
            .await
            .unwrap();

        // Assert
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("name"), Some("lte1"));
        assert_eq!(records[1].get("running"), Some("false"));
        assert_eq!(
            written_sentences(&mut router).await,
            vec![vec!["/interface/lte/print".to_owned()]]
        );
    }

    #[tokio::test]
    async fn test_run_sends_attribute_words() {
        let (client_side, mut router) = duplex(4096);
        router.write_all(&sentence(&["!done"])).await.unwrap();
        let mut client = RouterOsClient::new(client_side);

        let command = ApiCommand::new("/interface/lte/at-chat")
            .with(".id", "lte1")
            .with("input", "AT+CCHC=1");
        client.run(command).await.unwrap();

        assert_eq!(
            written_sentences(&mut router).await,
            vec![vec![
                "/interface/lte/at-chat".to_owned(),
                "=.id=lte1".to_owned(),
                "=input=AT+CCHC=1".to_owned(),
            ]]
        );
    }

    #[tokio::test]
    async fn test_empty_reply_has_no_records() {
        let (client_side, mut router) = duplex(4096);
        let mut replies = sentence(&["!empty"]);
        replies.extend(sentence(&["!done"]));
        router.write_all(&replies).await.unwrap();
        let mut client = RouterOsClient::new(client_side);

        let records = client.run(ApiCommand::new("/interface/lte/print")).await.unwrap();

        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_trap_is_reported_after_done() {
        // Arrange: a second command follows to prove `!done` was consumed
        let (client_side, mut router) = duplex(4096);
        let mut replies = sentence(&["!trap", "=message=no such item"]);
        replies.extend(sentence(&["!done"]));
        replies.extend(sentence(&["!re", "=name=lte1"]));
        replies.extend(sentence(&["!done"]));
        router.write_all(&replies).await.unwrap();
        let mut client = RouterOsClient::new(client_side);

        // Act
        let first = client.run(ApiCommand::new("/interface/lte/at-chat")).await;
        let second = client.run(ApiCommand::new("/interface/lte/print")).await;

        // Assert
        assert!(matches!(
            first,
            Err(RouterOsError::Device { ref message }) if message == "no such item"
        ));
        assert_eq!(second.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fatal_reply() {
        let (client_side, mut router) = duplex(4096);
        router
            .write_all(&sentence(&["!fatal", "session terminated"]))
            .await
            .unwrap();
        let mut client = RouterOsClient::new(client_side);

        let result = client.run(ApiCommand::new("/interface/lte/print")).await;

        assert!(matches!(result, Err(RouterOsError::Fatal(ref m)) if m == "session terminated"));
    }

    #[tokio::test]
    async fn test_connection_closed_mid_reply() {
        let (client_side, mut router) = duplex(4096);
        let bytes = sentence(&["!re", "=name=lte1"]);
        router.write_all(&bytes[..bytes.len() - 2]).await.unwrap();
        router.shutdown().await.unwrap();
        let mut client = RouterOsClient::new(client_side);

        let result = client.run(ApiCommand::new("/interface/lte/print")).await;

        assert!(matches!(result, Err(RouterOsError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_reply_split_across_reads() {
        // Arrange: the reply arrives one byte at a time
        let mut bytes = sentence(&["!re", "=output=+CCHO: 1"]);
        bytes.extend(sentence(&["!done"]));
        let mut builder = tokio_test::io::Builder::new();
        builder.write(&sentence(&["/interface/lte/at-chat"]));
        for byte in &bytes {
            builder.read(std::slice::from_ref(byte));
        }
        let mut client = RouterOsClient::new(builder.build());

        // Act
        let (records, done) = client
            .exchange(&ApiCommand::new("/interface/lte/at-chat"))
            .await
            .unwrap();

        // Assert
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("output"), Some("+CCHO: 1"));
        assert!(done.is_empty());
    }

    #[tokio::test]
    async fn test_login_sends_credentials() {
        let (client_side, mut router) = duplex(4096);
        router.write_all(&sentence(&["!done"])).await.unwrap();
        let mut client = RouterOsClient::new(client_side);

        client.login("admin", "secret").await.unwrap();

        assert_eq!(
            written_sentences(&mut router).await,
            vec![vec![
                "/login".to_owned(),
                "=name=admin".to_owned(),
                "=password=secret".to_owned(),
            ]]
        );
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let (client_side, mut router) = duplex(4096);
        let mut replies = sentence(&["!trap", "=message=invalid user name or password (6)"]);
        replies.extend(sentence(&["!done"]));
        router.write_all(&replies).await.unwrap();
        let mut client = RouterOsClient::new(client_side);

        let result = client.login("admin", "wrong").await;

        assert!(matches!(result, Err(RouterOsError::LoginFailed(_))));
    }

    #[tokio::test]
    async fn test_legacy_challenge_login_is_rejected() {
        let (client_side, mut router) = duplex(4096);
        router
            .write_all(&sentence(&["!done", "=ret=ebddd18303a54111e2dea05a92ab46b4"]))
            .await
            .unwrap();
        let mut client = RouterOsClient::new(client_side);

        let result = client.login("admin", "").await;

        assert!(matches!(result, Err(RouterOsError::LegacyLogin)));
    }

    #[tokio::test]
    async fn test_connect_and_login_over_tcp() {
        // Arrange: a one-shot router on an ephemeral port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut received = Vec::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                received.extend_from_slice(&buf[..n]);
                if let Ok((words, _)) = decode_sentence(&received) {
                    socket.write_all(&sentence(&["!done"])).await.unwrap();
                    return words;
                }
            }
        });

        // Act
        let mut client = RouterOsClient::connect(&addr.to_string()).await.unwrap();
        client.login("admin", "").await.unwrap();

        // Assert
        let words = router.await.unwrap();
        assert_eq!(words, vec!["/login", "=name=admin", "=password="]);
    }
}
