//! Per-channel connection state and reconnect policy.
//!
//! The session keeps a configurable list of websocket channels (by default a
//! control/status channel and an audio channel).  Each channel index owns at
//! most one live socket at a time.  [`ChannelSlot`] is the bookkeeping that
//! enforces this: every connection attempt gets a new *generation* number, and
//! events from an older generation are ignored, so a replaced socket can never
//! write into its successor's state.
//!
//! ```text
//!            begin_connect()          opened(gen)
//!   Closed ─────────────────> Connecting ─────────> Open
//!     ^                           │                  │
//!     └──────── closed(gen) ──────┴──────────────────┘
//! ```
//!
//! [`ReconnectPolicy`] decides what happens after a close: a fixed-delay
//! reconnect, or nothing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Close code sent when the peer closes without a status (the device does
/// this when the client asked it to kill the socket).
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Close code reported when the connection drops or never came up.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    Closed,
    Connecting,
    Open,
}

/// Static description of one websocket channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// Name used in logs and on the command line.
    pub name: String,
    /// Whether mic frames are sent and speaker frames expected on this
    /// channel.
    #[serde(default)]
    pub audio: bool,
}

impl ChannelSpec {
    pub fn new(name: impl Into<String>, audio: bool) -> Self {
        Self {
            name: name.into(),
            audio,
        }
    }
}

/// Connection bookkeeping for one channel index.
#[derive(Debug, Clone)]
pub struct ChannelSlot {
    state: ChannelState,
    generation: u64,
    deliberate_close: bool,
}

impl Default for ChannelSlot {
    fn default() -> Self {
        Self {
            state: ChannelState::Closed,
            generation: 0,
            deliberate_close: false,
        }
    }
}

impl ChannelSlot {
    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_deliberate_close(&self) -> bool {
        self.deliberate_close
    }

    /// Starts a connection attempt.
    ///
    /// Returns the generation of the new attempt, or `None` when a socket is
    /// already connecting or open for this index.
    pub fn begin_connect(&mut self) -> Option<u64> {
        if self.state != ChannelState::Closed {
            return None;
        }
        self.generation += 1;
        self.state = ChannelState::Connecting;
        self.deliberate_close = false;
        Some(self.generation)
    }

    /// Records a completed handshake.  Returns `false` for a stale generation.
    pub fn opened(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.state != ChannelState::Connecting {
            return false;
        }
        self.state = ChannelState::Open;
        true
    }

    /// Records the end of a socket.  Returns `false` for a stale generation
    /// or a slot that is already closed.
    pub fn closed(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.state == ChannelState::Closed {
            return false;
        }
        self.state = ChannelState::Closed;
        true
    }

    /// Flags the current socket as closed on purpose by the client.
    pub fn mark_deliberate(&mut self) {
        self.deliberate_close = true;
    }
}

/// What to do once a channel has closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterClose {
    Reconnect(Duration),
    StayClosed,
}

/// Fixed-interval reconnect policy.  No backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Decides the follow-up to a close.
    ///
    /// - closed by the client, or hidden session: stay closed
    /// - no-status closure from the device: stay closed
    /// - anything else (including a normal closure sent by the device and a
    ///   failed connect, reported as 1006): reconnect once after the fixed
    ///   delay
    pub fn after_close(&self, deliberate: bool, code: Option<u16>, visible: bool) -> AfterClose {
        if deliberate || !visible {
            return AfterClose::StayClosed;
        }
        match code.unwrap_or(CLOSE_NO_STATUS) {
            CLOSE_NO_STATUS => AfterClose::StayClosed,
            _ => AfterClose::Reconnect(self.delay),
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_starts_closed() {
        let slot = ChannelSlot::default();
        assert_eq!(slot.state(), ChannelState::Closed);
        assert_eq!(slot.generation(), 0);
    }

    #[test]
    fn test_full_lifecycle() {
        // Arrange
        let mut slot = ChannelSlot::default();

        // Act / Assert
        let gen = slot.begin_connect().expect("closed slot must connect");
        assert_eq!(slot.state(), ChannelState::Connecting);
        assert!(slot.opened(gen));
        assert_eq!(slot.state(), ChannelState::Open);
        assert!(slot.closed(gen));
        assert_eq!(slot.state(), ChannelState::Closed);
    }

    #[test]
    fn test_second_connect_while_live_is_refused() {
        let mut slot = ChannelSlot::default();
        let gen = slot.begin_connect().unwrap();
        assert!(slot.begin_connect().is_none(), "connecting slot");
        slot.opened(gen);
        assert!(slot.begin_connect().is_none(), "open slot");
    }

    #[test]
    fn test_stale_generation_events_are_ignored() {
        // Arrange: first socket closes, a replacement starts connecting.
        let mut slot = ChannelSlot::default();
        let old = slot.begin_connect().unwrap();
        slot.closed(old);
        let new = slot.begin_connect().unwrap();

        // Act / Assert: late events from the old socket change nothing.
        assert!(!slot.opened(old));
        assert!(!slot.closed(old));
        assert_eq!(slot.state(), ChannelState::Connecting);
        assert!(slot.opened(new));
    }

    #[test]
    fn test_new_attempt_clears_deliberate_flag() {
        let mut slot = ChannelSlot::default();
        let gen = slot.begin_connect().unwrap();
        slot.mark_deliberate();
        assert!(slot.is_deliberate_close());
        slot.closed(gen);
        slot.begin_connect();
        assert!(!slot.is_deliberate_close());
    }

    #[test]
    fn test_abnormal_close_while_visible_reconnects() {
        let policy = ReconnectPolicy::new(Duration::from_millis(250));
        assert_eq!(
            policy.after_close(false, Some(CLOSE_ABNORMAL), true),
            AfterClose::Reconnect(Duration::from_millis(250))
        );
        assert_eq!(
            policy.after_close(false, Some(1011), true),
            AfterClose::Reconnect(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_deliberate_close_never_reconnects() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            policy.after_close(true, Some(CLOSE_ABNORMAL), true),
            AfterClose::StayClosed
        );
    }

    #[test]
    fn test_hidden_session_never_reconnects() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            policy.after_close(false, Some(CLOSE_ABNORMAL), false),
            AfterClose::StayClosed
        );
    }

    #[test]
    fn test_no_status_close_stays_closed() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.after_close(false, None, true), AfterClose::StayClosed);
        assert_eq!(
            policy.after_close(false, Some(CLOSE_NO_STATUS), true),
            AfterClose::StayClosed
        );
    }

    #[test]
    fn test_normal_close_from_device_reconnects() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            policy.after_close(false, Some(CLOSE_NORMAL), true),
            AfterClose::Reconnect(Duration::from_secs(1))
        );
    }
}
