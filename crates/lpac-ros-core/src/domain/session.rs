//! The logical channel currently open on the SIM.
//!
//! One bridge owns one [`Session`].  It is set by a successful
//! `logic_channel_open` and read by every `transmit`; nothing else touches it.

/// Channel value before any channel has been opened.
pub const UNSET_CHANNEL: i32 = -1;

/// Holder for the open logical channel id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    channel: i32,
}

impl Session {
    /// Creates a session with no channel open.
    pub fn new() -> Self {
        Self {
            channel: UNSET_CHANNEL,
        }
    }

    /// Returns the current channel id, or [`UNSET_CHANNEL`].
    pub fn get(&self) -> i32 {
        self.channel
    }

    pub fn set(&mut self, channel: i32) {
        self.channel = channel;
    }

    /// Returns `true` once a channel has been opened.
    pub fn is_open(&self) -> bool {
        self.channel != UNSET_CHANNEL
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
