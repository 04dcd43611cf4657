//! WebSocket channels to the device.
//!
//! The manager owns a fixed list of channels (by default `control` and
//! `audio`).  Each channel index has at most one live socket.  The socket is
//! owned by a single pump task; everything else talks to it through an
//! unbounded sender, and everything it receives is forwarded, in order, onto
//! one [`SessionEvent`] stream.
//!
//! ```text
//!  send()/close() ──► outbound tx ──► pump task ──► device
//!                                        │
//!  session ◄── SessionEvent stream ◄─────┘
//! ```
//!
//! After a close that the client did not ask for, and only while the session
//! is visible, the pump schedules one reconnect after a fixed delay.  A failed
//! connection attempt is treated as an abnormal close.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use panel_core::protocol::channel::CLOSE_ABNORMAL;
use panel_core::{
    AfterClose, ChannelSlot, ChannelSpec, ChannelState, OutboundCommand, ReconnectPolicy,
    WireFrame,
};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::application::dispatch::CommandSink;
use crate::infrastructure::storage::config::ConnectionConfig;

/// Capacity of the session event queue.
const EVENT_QUEUE: usize = 256;

#[derive(Debug, Error, PartialEq)]
pub enum ConnectionError {
    #[error("no channel with index {0}")]
    UnknownChannel(usize),

    #[error("channel {index} not open after {attempts} attempt(s)")]
    NotOpen { index: usize, attempts: u32 },
}

/// Socket activity delivered to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Opened { index: usize },
    Text { index: usize, text: String },
    Binary { index: usize, data: Vec<u8> },
    Closed {
        index: usize,
        /// Close code from the device, [`CLOSE_ABNORMAL`] for a dropped or
        /// failed connection, `None` for a close frame without a code.
        code: Option<u16>,
        deliberate: bool,
    },
}

/// Timing knobs, usually taken from [`ConnectionConfig`].
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub reconnect: ReconnectPolicy,
    pub send_attempts: u32,
    pub send_interval: Duration,
    pub close_grace: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self::from(&ConnectionConfig::default())
    }
}

impl From<&ConnectionConfig> for ChannelOptions {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            reconnect: ReconnectPolicy::new(config.reconnect_delay()),
            send_attempts: config.send_retry_attempts,
            send_interval: config.send_retry_interval(),
            close_grace: config.close_grace(),
        }
    }
}

#[derive(Debug, Default)]
struct ChannelEntry {
    slot: ChannelSlot,
    outbound: Option<mpsc::UnboundedSender<Message>>,
}

struct Inner {
    url: String,
    specs: Vec<ChannelSpec>,
    entries: Mutex<Vec<ChannelEntry>>,
    visible: AtomicBool,
    options: ChannelOptions,
    events: mpsc::Sender<SessionEvent>,
}

/// Cloneable handle; clones drive the same channels.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Creates a manager for `specs`, all connecting to `url`, and returns
    /// the receiving end of its event stream.
    pub fn new(
        url: impl Into<String>,
        specs: Vec<ChannelSpec>,
        options: ChannelOptions,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (events, rx) = mpsc::channel(EVENT_QUEUE);
        let entries = specs.iter().map(|_| ChannelEntry::default()).collect();
        let manager = Self {
            inner: Arc::new(Inner {
                url: url.into(),
                specs,
                entries: Mutex::new(entries),
                visible: AtomicBool::new(true),
                options,
                events,
            }),
        };
        (manager, rx)
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn specs(&self) -> &[ChannelSpec] {
        &self.inner.specs
    }

    pub fn channel_count(&self) -> usize {
        self.inner.specs.len()
    }

    /// Index of the channel called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.inner.specs.iter().position(|s| s.name == name)
    }

    /// Index of the first channel that carries audio.
    pub fn audio_index(&self) -> Option<usize> {
        self.inner.specs.iter().position(|s| s.audio)
    }

    pub fn channel_name(&self, index: usize) -> &str {
        self.inner
            .specs
            .get(index)
            .map(|s| s.name.as_str())
            .unwrap_or("?")
    }

    pub fn is_visible(&self) -> bool {
        self.inner.visible.load(Ordering::Relaxed)
    }

    /// Records session visibility.  While hidden no reconnect is scheduled.
    pub fn set_visible(&self, visible: bool) {
        self.inner.visible.store(visible, Ordering::Relaxed);
    }

    /// # Errors
    ///
    /// [`ConnectionError::UnknownChannel`].
    pub async fn state(&self, index: usize) -> Result<ChannelState, ConnectionError> {
        let entries = self.inner.entries.lock().await;
        entries
            .get(index)
            .map(|e| e.slot.state())
            .ok_or(ConnectionError::UnknownChannel(index))
    }

    /// Opens the socket for `index` unless one is already connecting or
    /// open.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::UnknownChannel`].
    pub async fn connect(&self, index: usize) -> Result<(), ConnectionError> {
        let Some(generation) = self.begin(index).await? else {
            debug!("{}: socket already active", self.channel_name(index));
            return Ok(());
        };
        let manager = self.clone();
        tokio::spawn(async move { manager.run_channel(index, generation).await });
        Ok(())
    }

    /// Connects every channel.
    pub async fn connect_all(&self) {
        for index in 0..self.channel_count() {
            // Indices come from the channel list, so this cannot fail.
            let _ = self.connect(index).await;
        }
    }

    /// Sends `command` on `index`, polling for the channel to open when it
    /// is not open yet.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::NotOpen`] once the polls are exhausted.
    pub async fn send(&self, index: usize, command: OutboundCommand) -> Result<(), ConnectionError> {
        let description = command.describe();
        let mut message = to_message(command.into_wire());
        let attempts = self.inner.options.send_attempts;
        for attempt in 0..=attempts {
            if let Some(outbound) = self.outbound(index).await? {
                match outbound.send(message) {
                    Ok(()) => {
                        debug!("{} <- {description}", self.channel_name(index));
                        return Ok(());
                    }
                    Err(mpsc::error::SendError(returned)) => message = returned,
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.inner.options.send_interval).await;
            }
        }
        warn!("{}: dropping {description}, channel not open", self.channel_name(index));
        Err(ConnectionError::NotOpen { index, attempts })
    }

    /// Sends without waiting.  Returns `false` (and drops the command) when
    /// the channel is not open.
    pub async fn try_send(&self, index: usize, command: OutboundCommand) -> bool {
        match self.outbound(index).await {
            Ok(Some(outbound)) => outbound.send(to_message(command.into_wire())).is_ok(),
            _ => false,
        }
    }

    /// Closes `index` on purpose: marks the close deliberate, sends `K`,
    /// waits the grace period, then sends the close frame.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::UnknownChannel`].
    pub async fn close(&self, index: usize) -> Result<(), ConnectionError> {
        let outbound = {
            let mut entries = self.inner.entries.lock().await;
            let entry = entries
                .get_mut(index)
                .ok_or(ConnectionError::UnknownChannel(index))?;
            match entry.slot.state() {
                ChannelState::Closed => return Ok(()),
                ChannelState::Connecting => {
                    // The pump sees a closed slot when the handshake
                    // completes and drops the socket.
                    entry.slot.mark_deliberate();
                    let generation = entry.slot.generation();
                    entry.slot.closed(generation);
                    None
                }
                ChannelState::Open => {
                    entry.slot.mark_deliberate();
                    entry.outbound.clone()
                }
            }
        };

        let Some(outbound) = outbound else {
            self.emit(SessionEvent::Closed {
                index,
                code: None,
                deliberate: true,
            })
            .await;
            return Ok(());
        };

        info!("{}: closing", self.channel_name(index));
        let _ = outbound.send(to_message(OutboundCommand::Kill.into_wire()));
        tokio::time::sleep(self.inner.options.close_grace).await;
        let _ = outbound.send(Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        })));
        Ok(())
    }

    /// Closes every channel deliberately.
    pub async fn close_all(&self) {
        for index in 0..self.channel_count() {
            let _ = self.close(index).await;
        }
    }

    /// Sends `H` on every open channel at `interval` until the returned task
    /// is aborted.
    pub fn spawn_heartbeat(&self, interval: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                for index in 0..manager.channel_count() {
                    if manager.try_send(index, OutboundCommand::Heartbeat).await {
                        debug!("{} <- H", manager.channel_name(index));
                    }
                }
            }
        })
    }

    // ── Pump ─────────────────────────────────────────────────────────────────

    async fn outbound(
        &self,
        index: usize,
    ) -> Result<Option<mpsc::UnboundedSender<Message>>, ConnectionError> {
        let entries = self.inner.entries.lock().await;
        entries
            .get(index)
            .map(|e| e.outbound.clone())
            .ok_or(ConnectionError::UnknownChannel(index))
    }

    async fn emit(&self, event: SessionEvent) {
        if self.inner.events.send(event).await.is_err() {
            debug!("session event stream closed");
        }
    }

    async fn begin(&self, index: usize) -> Result<Option<u64>, ConnectionError> {
        let mut entries = self.inner.entries.lock().await;
        let entry = entries
            .get_mut(index)
            .ok_or(ConnectionError::UnknownChannel(index))?;
        Ok(entry.slot.begin_connect())
    }

    /// Owns channel `index` from its first connection attempt until it stays
    /// closed.  Each reconnect replaces the socket under a new generation.
    async fn run_channel(self, index: usize, mut generation: u64) {
        loop {
            let Some(code) = self.run_socket(index, generation).await else {
                return;
            };
            let Some(delay) = self.finish(index, generation, code).await else {
                return;
            };
            tokio::time::sleep(delay).await;
            if !self.is_visible() {
                return;
            }
            match self.begin(index).await {
                Ok(Some(next)) => generation = next,
                // Someone else reconnected in the meantime.
                _ => return,
            }
        }
    }

    /// Runs one socket to its end and returns its close code, or `None` when
    /// the slot was closed while the handshake was in flight.
    async fn run_socket(&self, index: usize, generation: u64) -> Option<Option<u16>> {
        let name = self.channel_name(index).to_string();
        info!("{name}: connecting to {}", self.inner.url);
        let stream = match tokio_tungstenite::connect_async(self.inner.url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                warn!("{name}: connect failed: {e}");
                return Some(Some(CLOSE_ABNORMAL));
            }
        };
        let (mut sink, mut source) = stream.split();
        let (outbound, mut queue) = mpsc::unbounded_channel::<Message>();

        let accepted = {
            let mut entries = self.inner.entries.lock().await;
            match entries.get_mut(index) {
                Some(entry) => {
                    if entry.slot.opened(generation) {
                        entry.outbound = Some(outbound);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };
        if !accepted {
            debug!("{name}: handshake finished after close; dropping socket");
            let _ = sink.close().await;
            return None;
        }
        info!("{name}: connected");
        self.emit(SessionEvent::Opened { index }).await;

        let code = loop {
            tokio::select! {
                queued = queue.recv() => {
                    let Some(message) = queued else { break Some(CLOSE_ABNORMAL) };
                    if let Err(e) = sink.send(message).await {
                        warn!("{name}: send failed: {e}");
                        break Some(CLOSE_ABNORMAL);
                    }
                }
                incoming = source.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        self.emit(SessionEvent::Text { index, text }).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        self.emit(SessionEvent::Binary { index, data }).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map(|f| u16::from(f.code));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("{name}: read error: {e}");
                        break Some(CLOSE_ABNORMAL);
                    }
                    None => break Some(CLOSE_ABNORMAL),
                },
            }
        };
        Some(code)
    }

    /// Marks the slot closed, reports the close and returns the reconnect
    /// delay if one is due.
    async fn finish(&self, index: usize, generation: u64, code: Option<u16>) -> Option<Duration> {
        let deliberate = {
            let mut entries = self.inner.entries.lock().await;
            let entry = entries.get_mut(index)?;
            if !entry.slot.closed(generation) {
                return None;
            }
            entry.outbound = None;
            entry.slot.is_deliberate_close()
        };

        let name = self.channel_name(index);
        info!("{name}: disconnected (code {code:?}, deliberate {deliberate})");
        self.emit(SessionEvent::Closed {
            index,
            code,
            deliberate,
        })
        .await;

        match self
            .inner
            .options
            .reconnect
            .after_close(deliberate, code, self.is_visible())
        {
            AfterClose::Reconnect(delay) => {
                debug!("{name}: reconnecting in {delay:?}");
                Some(delay)
            }
            AfterClose::StayClosed => {
                debug!("{name}: staying closed");
                None
            }
        }
    }
}

#[async_trait]
impl CommandSink for ConnectionManager {
    async fn send(&self, index: usize, command: OutboundCommand) -> Result<(), ConnectionError> {
        ConnectionManager::send(self, index, command).await
    }
}

fn to_message(frame: WireFrame) -> Message {
    match frame {
        WireFrame::Text(text) => Message::Text(text),
        WireFrame::Binary(bytes) => Message::Binary(bytes),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_options() -> ChannelOptions {
        ChannelOptions {
            reconnect: ReconnectPolicy::new(Duration::from_millis(10)),
            send_attempts: 2,
            send_interval: Duration::from_millis(5),
            close_grace: Duration::from_millis(5),
        }
    }

    fn default_specs() -> Vec<ChannelSpec> {
        vec![ChannelSpec::new("control", false), ChannelSpec::new("audio", true)]
    }

    #[test]
    fn test_channel_lookup() {
        let (manager, _rx) =
            ConnectionManager::new("ws://127.0.0.1:9/ws", default_specs(), quick_options());
        assert_eq!(manager.index_of("audio"), Some(1));
        assert_eq!(manager.index_of("video"), None);
        assert_eq!(manager.audio_index(), Some(1));
        assert_eq!(manager.channel_name(0), "control");
    }

    #[test]
    fn test_options_follow_config() {
        let options = ChannelOptions::default();
        assert_eq!(options.send_attempts, 10);
        assert_eq!(options.send_interval, Duration::from_millis(100));
        assert_eq!(options.close_grace, Duration::from_millis(500));
        assert_eq!(options.reconnect.delay, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_send_on_closed_channel_fails_after_polling() {
        // Arrange
        let (manager, _rx) =
            ConnectionManager::new("ws://127.0.0.1:9/ws", default_specs(), quick_options());

        // Act
        let result = manager.send(0, OutboundCommand::Heartbeat).await;

        // Assert
        assert_eq!(result, Err(ConnectionError::NotOpen { index: 0, attempts: 2 }));
    }

    #[tokio::test]
    async fn test_unknown_channel_is_rejected() {
        let (manager, _rx) =
            ConnectionManager::new("ws://127.0.0.1:9/ws", default_specs(), quick_options());
        assert_eq!(
            manager.connect(5).await,
            Err(ConnectionError::UnknownChannel(5))
        );
        assert!(!manager.try_send(5, OutboundCommand::Heartbeat).await);
    }

    #[tokio::test]
    async fn test_try_send_drops_when_not_open() {
        let (manager, _rx) =
            ConnectionManager::new("ws://127.0.0.1:9/ws", default_specs(), quick_options());
        assert!(!manager.try_send(1, OutboundCommand::StopAudio).await);
    }

    #[tokio::test]
    async fn test_close_on_closed_channel_is_noop() {
        let (manager, mut rx) =
            ConnectionManager::new("ws://127.0.0.1:9/ws", default_specs(), quick_options());
        manager.close(0).await.expect("known channel");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_connect_reports_abnormal_close() {
        // Arrange: hidden, so the failure does not schedule a reconnect.
        let (manager, mut rx) =
            ConnectionManager::new("ws://127.0.0.1:1/ws", default_specs(), quick_options());
        manager.set_visible(false);

        // Act
        manager.connect(0).await.expect("known channel");
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event in time");

        // Assert
        assert_eq!(
            event,
            Some(SessionEvent::Closed {
                index: 0,
                code: Some(CLOSE_ABNORMAL),
                deliberate: false
            })
        );
        assert_eq!(manager.state(0).await, Ok(ChannelState::Closed));
    }
}
