//! Binary codec for the RouterOS API.
//!
//! Wire format:
//! ```text
//! sentence := word* empty-word
//! word     := length-prefix utf8-bytes
//! ```
//!
//! The length prefix grows with the word length:
//!
//! | Length range              | Prefix bytes | Marker bits         |
//! |---------------------------|--------------|---------------------|
//! | `0x00 ..= 0x7F`           | 1            | `0xxxxxxx`          |
//! | `0x80 ..= 0x3FFF`         | 2            | `10xxxxxx`          |
//! | `0x4000 ..= 0x1FFFFF`     | 3            | `110xxxxx`          |
//! | `0x200000 ..= 0xFFFFFFF`  | 4            | `1110xxxx`          |
//! | `0x10000000 ..`           | 5            | `0xF0` + u32 BE     |
//!
//! First bytes `0xF1..=0xFF` are reserved control bytes and are rejected.

use thiserror::Error;

/// Errors that can occur while encoding or decoding API sentences.
#[derive(Debug, Error, PartialEq)]
pub enum SentenceError {
    /// The byte slice ends before the sentence is complete.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The first byte of a length prefix is a reserved control byte.
    #[error("reserved length prefix byte: 0x{0:02X}")]
    ReservedPrefix(u8),

    /// A word is longer than the protocol can describe.
    #[error("word of {0} bytes exceeds the maximum encodable length")]
    WordTooLong(usize),

    /// A word is not valid UTF-8.
    #[error("word is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    /// A sentence did not start with a known reply word.
    #[error("unknown reply word: {0:?}")]
    UnknownReply(String),

    /// A reply sentence contained no words at all.
    #[error("empty reply sentence")]
    EmptySentence,
}

// ── Word length prefix ────────────────────────────────────────────────────────

/// Appends the length prefix for a word of `len` bytes to `buf`.
///
/// # Errors
///
/// Returns [`SentenceError::WordTooLong`] if `len` does not fit in 32 bits.
pub fn encode_length(buf: &mut Vec<u8>, len: usize) -> Result<(), SentenceError> {
    let value = u32::try_from(len).map_err(|_| SentenceError::WordTooLong(len))?;
    let bytes = value.to_be_bytes();

    if value < 0x80 {
        buf.push(bytes[3]);
    } else if value < 0x4000 {
        buf.extend_from_slice(&(value | 0x8000).to_be_bytes()[2..]);
    } else if value < 0x20_0000 {
        buf.extend_from_slice(&(value | 0xC0_0000).to_be_bytes()[1..]);
    } else if value < 0x1000_0000 {
        buf.extend_from_slice(&(value | 0xE000_0000).to_be_bytes());
    } else {
        buf.push(0xF0);
        buf.extend_from_slice(&bytes);
    }
    Ok(())
}

/// Decodes a length prefix from the start of `bytes`.
///
/// Returns `(word_length, prefix_size)`.
///
/// # Errors
///
/// Returns [`SentenceError::InsufficientData`] if the prefix is cut short and
/// [`SentenceError::ReservedPrefix`] for control bytes.
pub fn decode_length(bytes: &[u8]) -> Result<(usize, usize), SentenceError> {
    let first = *bytes.first().ok_or(SentenceError::InsufficientData {
        needed: 1,
        available: 0,
    })?;

    let (prefix_size, initial) = match first {
        b if b & 0x80 == 0x00 => (1, u32::from(b)),
        b if b & 0xC0 == 0x80 => (2, u32::from(b & 0x3F)),
        b if b & 0xE0 == 0xC0 => (3, u32::from(b & 0x1F)),
        b if b & 0xF0 == 0xE0 => (4, u32::from(b & 0x0F)),
        0xF0 => (5, 0),
        b => return Err(SentenceError::ReservedPrefix(b)),
    };

    if bytes.len() < prefix_size {
        return Err(SentenceError::InsufficientData {
            needed: prefix_size,
            available: bytes.len(),
        });
    }

    let value = bytes[1..prefix_size]
        .iter()
        .fold(initial, |acc, b| (acc << 8) | u32::from(*b));

    Ok((value as usize, prefix_size))
}

// ── Sentences ─────────────────────────────────────────────────────────────────

/// Encodes `words` as one sentence, including the terminating empty word.
///
/// # Errors
///
/// Returns [`SentenceError::WordTooLong`] if any word exceeds the 32-bit limit.
///
/// # Examples
///
/// ```rust
/// use lpac_ros_core::protocol::sentence::{decode_sentence, encode_sentence};
///
/// let bytes = encode_sentence(&["/login", "=name=admin"]).unwrap();
/// let (words, consumed) = decode_sentence(&bytes).unwrap();
/// assert_eq!(words, vec!["/login", "=name=admin"]);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_sentence<S: AsRef<str>>(words: &[S]) -> Result<Vec<u8>, SentenceError> {
    let mut buf = Vec::new();
    for word in words {
        let word = word.as_ref().as_bytes();
        encode_length(&mut buf, word.len())?;
        buf.extend_from_slice(word);
    }
    buf.push(0x00);
    Ok(buf)
}

/// Decodes one sentence from the beginning of `bytes`.
///
/// Returns the words and the number of bytes consumed, terminator included,
/// so a streaming reader can drain exactly one sentence from its buffer.
///
/// # Errors
///
/// Returns [`SentenceError::InsufficientData`] when more bytes are needed.
pub fn decode_sentence(bytes: &[u8]) -> Result<(Vec<String>, usize), SentenceError> {
    let mut words = Vec::new();
    let mut cursor = 0;

    loop {
        let (len, prefix) = decode_length(&bytes[cursor..]).map_err(|e| match e {
            SentenceError::InsufficientData { needed, .. } => SentenceError::InsufficientData {
                needed: cursor + needed,
                available: bytes.len(),
            },
            other => other,
        })?;
        cursor += prefix;

        if len == 0 {
            return Ok((words, cursor));
        }

        let end = cursor + len;
        if bytes.len() < end {
            return Err(SentenceError::InsufficientData {
                needed: end,
                available: bytes.len(),
            });
        }

        let word = std::str::from_utf8(&bytes[cursor..end])
            .map_err(|e| SentenceError::InvalidUtf8(e.to_string()))?;
        words.push(word.to_owned());
        cursor = end;
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// A command sentence: a path such as `/interface/lte/print` followed by
/// `=key=value` attribute words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCommand {
    pub path: String,
    pub args: Vec<(String, String)>,
}

impl ApiCommand {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }

    /// Appends a `=key=value` attribute.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push((key.into(), value.into()));
        self
    }

    /// Returns the value of the first attribute named `key`.
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The words of this command, ready for [`encode_sentence`].
    pub fn to_words(&self) -> Vec<String> {
        std::iter::once(self.path.clone())
            .chain(self.args.iter().map(|(k, v)| format!("={k}={v}")))
            .collect()
    }
}

// ── Replies ───────────────────────────────────────────────────────────────────

/// One result record: the ordered `=key=value` attributes of a reply sentence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    /// Builds a record from `(key, value)` pairs.
    pub fn new<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns the value of the first field named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the value of the first field in wire order.
    pub fn first_value(&self) -> Option<&str> {
        self.fields.first().map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    fn from_words(words: &[String]) -> Self {
        // `=key=value`; the value may itself contain '='.
        let fields = words
            .iter()
            .filter_map(|w| w.strip_prefix('='))
            .filter_map(|w| w.split_once('='))
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Self { fields }
    }
}

/// A typed reply sentence sent by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `!re` – one result record.
    Re(Record),
    /// `!done` – end of the reply; may carry attributes (e.g. `=ret=`).
    Done(Record),
    /// `!trap` – the command failed; `=message=` explains why.
    Trap(Record),
    /// `!fatal` – the router is closing the connection.
    Fatal(String),
    /// `!empty` – the command produced no records (RouterOS 7.18+).
    Empty,
}

impl Reply {
    /// Interprets the words of a decoded sentence.
    ///
    /// # Errors
    ///
    /// Returns [`SentenceError::EmptySentence`] for a sentence with no words
    /// and [`SentenceError::UnknownReply`] for an unrecognised reply word.
    pub fn from_words(words: &[String]) -> Result<Self, SentenceError> {
        let (head, rest) = words.split_first().ok_or(SentenceError::EmptySentence)?;
        match head.as_str() {
            "!re" => Ok(Reply::Re(Record::from_words(rest))),
            "!done" => Ok(Reply::Done(Record::from_words(rest))),
            "!trap" => Ok(Reply::Trap(Record::from_words(rest))),
            "!fatal" => Ok(Reply::Fatal(rest.join(" "))),
            "!empty" => Ok(Reply::Empty),
            other => Err(SentenceError::UnknownReply(other.to_owned())),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
