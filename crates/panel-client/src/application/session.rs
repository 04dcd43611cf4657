//! Session: one live view of the device panel.
//!
//! A [`Session`] owns all mutable panel state (bound elements, status
//! cache, displayed config group) and processes socket events one at a time
//! from the [`ConnectionManager`] event stream:
//!
//! ```text
//! SessionEvent::Text   → classify_text
//!     Status  → Panel::update_status (+ clock check)
//!     Config  → TableBuilder::build → Panel::bind_table
//!     Custom  → logged
//!     Log     → re-emitted at the line's severity
//! SessionEvent::Binary → classify_binary → speaker queue
//! ```
//!
//! UI events go through the [`CommandTable`] and the [`Dispatcher`].

use std::sync::Arc;
use std::time::Duration;

use panel_core::{
    classify_binary, classify_text, Action, AudioError, BuildOutcome, CommandTable, InboundError,
    InboundMessage, MicPipeline, OutboundCommand, Panel, StatusMap, TableBuilder, UiEvent,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::dispatch::{
    emit_device_line, DeviceControl, DispatchError, Dispatched, Dispatcher, DEFAULT_SAVE_DELAY,
};
use crate::infrastructure::audio::{MicBlock, SpeakerFeed};
use crate::infrastructure::http::StatusQuery;
use crate::infrastructure::storage::PanelConfig;
use crate::infrastructure::ws::{ConnectionManager, SessionEvent};

/// Status key carrying the device clock in epoch seconds.
pub const CLOCK_KEY: &str = "clockUTC";

/// Timing and audio settings for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub heartbeat: Duration,
    pub save_delay: Duration,
    pub target_rate: u32,
    pub frame_samples: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&PanelConfig::default())
    }
}

impl From<&PanelConfig> for SessionOptions {
    fn from(config: &PanelConfig) -> Self {
        Self {
            heartbeat: config.connection.heartbeat_interval(),
            save_delay: DEFAULT_SAVE_DELAY,
            target_rate: config.audio.target_rate,
            frame_samples: config.audio.frame_samples,
        }
    }
}

pub struct Session {
    panel: Panel,
    tables: TableBuilder,
    commands: CommandTable,
    dispatcher: Dispatcher,
    manager: ConnectionManager,
    audio_index: Option<usize>,
    options: SessionOptions,
    heartbeat: Option<JoinHandle<()>>,
    speaker: Option<SpeakerFeed>,
    mic: Option<MicPipeline>,
    mic_rate: u32,
}

impl Session {
    /// Text commands go to the first channel that does not carry audio.
    pub fn new(
        manager: ConnectionManager,
        device: Arc<dyn DeviceControl>,
        options: SessionOptions,
    ) -> Self {
        let control_index = manager
            .specs()
            .iter()
            .position(|spec| !spec.audio)
            .unwrap_or(0);
        let dispatcher = Dispatcher::new(device, Arc::new(manager.clone()), control_index)
            .with_save_delay(options.save_delay);
        Self {
            panel: Panel::new(),
            tables: TableBuilder::new(),
            commands: CommandTable::default(),
            dispatcher,
            audio_index: manager.audio_index(),
            manager,
            options,
            heartbeat: None,
            speaker: None,
            mic: None,
            mic_rate: 0,
        }
    }

    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut Panel {
        &mut self.panel
    }

    pub fn tables_mut(&mut self) -> &mut TableBuilder {
        &mut self.tables
    }

    pub fn commands_mut(&mut self) -> &mut CommandTable {
        &mut self.commands
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Connects every channel and starts the heartbeat.
    pub async fn start(&mut self) {
        self.manager.set_visible(true);
        self.manager.connect_all().await;
        self.start_heartbeat();
    }

    /// Shows or hides the session.  Hiding closes every channel
    /// deliberately and tears down the audio paths; showing reconnects.
    pub async fn set_visible(&mut self, visible: bool) {
        if visible {
            info!("session visible; reconnecting");
            self.start().await;
        } else {
            info!("session hidden; closing channels");
            self.manager.set_visible(false);
            self.stop_heartbeat();
            self.speaker = None;
            self.mic = None;
            self.manager.close_all().await;
        }
    }

    /// Clears the status cache and the displayed config group, as on
    /// navigating away from the page.
    pub fn reset(&mut self) {
        self.panel.clear_status();
        self.tables.clear();
    }

    /// Stops the heartbeat and closes every channel.
    pub async fn shutdown(&mut self) {
        self.manager.set_visible(false);
        self.stop_heartbeat();
        self.manager.close_all().await;
    }

    fn start_heartbeat(&mut self) {
        if self.heartbeat.is_none() {
            self.heartbeat = Some(self.manager.spawn_heartbeat(self.options.heartbeat));
        }
    }

    fn stop_heartbeat(&mut self) {
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
    }

    // ── Socket events ─────────────────────────────────────────────────────────

    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Opened { index } => {
                info!("{} channel open", self.manager.channel_name(index));
            }
            SessionEvent::Text { index, text } => {
                self.handle_inbound(index, classify_text(&text)).await;
            }
            SessionEvent::Binary { index, data } => {
                self.handle_inbound(index, Ok(classify_binary(&data))).await;
            }
            SessionEvent::Closed {
                index,
                code,
                deliberate,
            } => {
                let name = self.manager.channel_name(index);
                if deliberate {
                    debug!("{name} channel closed");
                } else {
                    warn!("{name} channel closed with code {code:?}");
                }
            }
        }
    }

    async fn handle_inbound(
        &mut self,
        index: usize,
        message: Result<InboundMessage, InboundError>,
    ) {
        match message {
            Ok(InboundMessage::Status(status)) => {
                self.apply_status(&status).await;
            }
            Ok(InboundMessage::Config { group, data }) => {
                self.build_table(&data, &group);
            }
            Ok(InboundMessage::Custom(message)) => {
                info!(target: "device", "{message}");
            }
            Ok(InboundMessage::Log(line)) => emit_device_line(&line),
            Ok(InboundMessage::Audio(samples)) => self.play(samples),
            Err(e) => warn!("{}: {e}", self.manager.channel_name(index)),
        }
    }

    /// Writes a status push into the panel and corrects the device clock
    /// when the push carries one.  Returns the number of bound keys.
    pub async fn apply_status(&mut self, status: &StatusMap) -> usize {
        let matched = self.panel.update_status(status);
        trace!("status push: {} keys, {matched} bound", status.len());
        if let Some(device_secs) = status
            .get_text(CLOCK_KEY)
            .and_then(|text| text.trim().parse::<u64>().ok())
        {
            if let Err(e) = self.dispatcher.device().sync_clock(device_secs).await {
                warn!("clock sync failed: {e}");
            }
        }
        matched
    }

    /// Builds the config table for `group` and binds its controls.
    pub fn build_table(&mut self, data: &StatusMap, group: &str) -> BuildOutcome {
        let outcome = self.tables.build(data, group);
        if let BuildOutcome::Built { table, errors } = &outcome {
            self.panel.bind_table(table);
            info!(
                "config group {group}: {} row(s), {} skipped",
                table.rows.len(),
                errors.len()
            );
        }
        outcome
    }

    // ── HTTP ──────────────────────────────────────────────────────────────────

    /// Polls `/status` and applies the result.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Device`] if the request fails.
    pub async fn refresh(&mut self, query: &StatusQuery) -> Result<usize, DispatchError> {
        let status = self.dispatcher.device().load_status(query).await?;
        Ok(self.apply_status(&status).await)
    }

    /// Fetches the config payload for `group` and builds its table.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Device`] if the request fails.
    pub async fn load_config_group(&mut self, group: &str) -> Result<BuildOutcome, DispatchError> {
        let mut data = self
            .dispatcher
            .device()
            .load_status(&StatusQuery::Group(group.to_string()))
            .await?;
        data.take_group();
        Ok(self.build_table(&data, group))
    }

    /// Routes a UI event and carries out the resulting action.
    /// `Ok(None)` means the event had no effect.
    ///
    /// # Errors
    ///
    /// Whatever the dispatched action returns.
    pub async fn route(&mut self, event: UiEvent) -> Result<Option<Dispatched>, DispatchError> {
        let Some(action) = self.commands.route(&mut self.panel, event) else {
            return Ok(None);
        };
        self.dispatcher
            .execute(&mut self.panel, action)
            .await
            .map(Some)
    }

    /// Carries out `action` directly, bypassing the command table.
    ///
    /// # Errors
    ///
    /// Whatever the dispatched action returns.
    pub async fn execute(&mut self, action: Action) -> Result<Dispatched, DispatchError> {
        self.dispatcher.execute(&mut self.panel, action).await
    }

    // ── Audio ─────────────────────────────────────────────────────────────────

    /// Routes received audio to `feed`.
    pub fn attach_speaker(&mut self, feed: SpeakerFeed) {
        self.speaker = Some(feed);
    }

    pub fn detach_speaker(&mut self) {
        self.speaker = None;
    }

    fn play(&mut self, samples: Vec<f32>) {
        let Some(feed) = &self.speaker else {
            trace!("no speaker; dropping {} audio samples", samples.len());
            return;
        };
        if feed.try_send(samples).is_err() {
            trace!("speaker queue full; block dropped");
        }
    }

    /// Prepares the mic path for capture at `input_rate`.
    ///
    /// # Errors
    ///
    /// [`AudioError::InvalidRate`] for a zero rate.
    pub fn start_mic(&mut self, input_rate: u32) -> Result<(), AudioError> {
        self.mic = Some(MicPipeline::new(
            input_rate,
            self.options.target_rate,
            self.options.frame_samples,
        )?);
        self.mic_rate = input_rate;
        Ok(())
    }

    /// Feeds one captured block through the mic path and sends each
    /// completed frame on the audio channel.  Frames are dropped while the
    /// channel is not open.  Returns the number of frames sent.
    pub async fn push_mic(&mut self, block: &MicBlock) -> usize {
        if self.mic.is_none() || block.sample_rate != self.mic_rate {
            if let Err(e) = self.start_mic(block.sample_rate) {
                warn!("mic: {e}");
                return 0;
            }
        }
        let (Some(mic), Some(audio)) = (self.mic.as_mut(), self.audio_index) else {
            return 0;
        };
        let mut sent = 0;
        for frame in mic.process(&block.samples) {
            if self.manager.try_send(audio, OutboundCommand::Audio(frame)).await {
                sent += 1;
            }
        }
        sent
    }

    /// Stops the mic path and tells the device to stop streaming.
    pub async fn stop_mic(&mut self) {
        if let Some(mut mic) = self.mic.take() {
            mic.reset();
        }
        if let Err(e) = self.execute(Action::StopAudio).await {
            warn!("stop audio: {e}");
        }
    }

    pub fn mic_active(&self) -> bool {
        self.mic.is_some()
    }

    pub fn speaker_attached(&self) -> bool {
        self.speaker.is_some()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;
    use panel_core::{ChannelSpec, Element, InputKind};

    use super::*;
    use crate::application::dispatch::MockDeviceControl;
    use crate::infrastructure::audio::speaker_channel;
    use crate::infrastructure::ws::ChannelOptions;

    fn session(device: MockDeviceControl) -> Session {
        let (manager, _events) = ConnectionManager::new(
            "ws://127.0.0.1:1/ws",
            vec![ChannelSpec::new("control", false), ChannelSpec::new("audio", true)],
            ChannelOptions {
                send_attempts: 0,
                ..ChannelOptions::default()
            },
        );
        let options = SessionOptions {
            save_delay: Duration::ZERO,
            ..SessionOptions::default()
        };
        Session::new(manager, Arc::new(device), options)
    }

    fn text(text: &str) -> SessionEvent {
        SessionEvent::Text {
            index: 0,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_status_push_updates_bound_elements() {
        // Arrange
        let mut session = session(MockDeviceControl::new());
        session
            .panel_mut()
            .register("fps", Element::input(InputKind::Number));

        // Act
        session
            .handle_event(text(r#"{"cfgGroup":"-1","fps":"20","unbound":"x"}"#))
            .await;

        // Assert
        assert_eq!(session.panel().read("fps").as_deref(), Some("20"));
        assert_eq!(
            session.panel().status().get_text("unbound").as_deref(),
            Some("x")
        );
    }

    #[tokio::test]
    async fn test_status_push_with_clock_checks_device_time() {
        let mut device = MockDeviceControl::new();
        device
            .expect_sync_clock()
            .with(eq(1_700_000_000_u64))
            .times(1)
            .returning(|_| Ok(true));
        let mut session = session(device);

        session
            .handle_event(text(r#"{"clockUTC":1700000000}"#))
            .await;
    }

    #[tokio::test]
    async fn test_config_push_builds_once_per_group() {
        // Arrange
        let mut session = session(MockDeviceControl::new());
        let push = r#"{"cfgGroup":"3","fps":"20","fps_l":"Frame rate","fps_t":"R:1:30:1"}"#;

        // Act
        session.handle_event(text(push)).await;
        let second = session.build_table(
            &StatusMap::from_json_str(r#"{"fps":"20","fps_l":"Frame rate","fps_t":"R:1:30:1"}"#)
                .unwrap(),
            "3",
        );

        // Assert
        assert_eq!(session.panel().read("fps").as_deref(), Some("20"));
        assert_eq!(second, BuildOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_malformed_push_is_ignored() {
        let mut session = session(MockDeviceControl::new());
        session.handle_event(text("{not json")).await;
        assert!(session.panel().status().is_empty());
    }

    #[tokio::test]
    async fn test_binary_frame_reaches_speaker() {
        // Arrange
        let mut session = session(MockDeviceControl::new());
        let (feed, mut rx) = speaker_channel();
        session.attach_speaker(feed);

        // Act: two i16 LE samples, 16384 and -32768.
        session
            .handle_event(SessionEvent::Binary {
                index: 1,
                data: vec![0x00, 0x40, 0x00, 0x80],
            })
            .await;

        // Assert
        assert_eq!(rx.try_recv().unwrap(), vec![0.5, -1.0]);
    }

    #[tokio::test]
    async fn test_mic_frames_dropped_while_audio_closed() {
        let mut session = session(MockDeviceControl::new());
        let block = MicBlock {
            sample_rate: 48_000,
            samples: vec![0.1; 960],
        };

        let sent = session.push_mic(&block).await;

        assert_eq!(sent, 0);
        assert!(session.mic_active());
    }

    #[tokio::test]
    async fn test_refresh_applies_polled_status() {
        let mut device = MockDeviceControl::new();
        device
            .expect_load_status()
            .with(eq(StatusQuery::Quick))
            .times(1)
            .returning(|_| Ok(StatusMap::from_json_str(r#"{"temp":"41"}"#).unwrap()));
        let mut session = session(device);
        session
            .panel_mut()
            .register("temp", Element::Label { text: String::new() });

        let matched = session.refresh(&StatusQuery::Quick).await.unwrap();

        assert_eq!(matched, 1);
        assert_eq!(session.panel().read("temp").as_deref(), Some("41"));
    }

    #[tokio::test]
    async fn test_route_change_sends_control() {
        let mut device = MockDeviceControl::new();
        device
            .expect_send_control_resp()
            .withf(|key, value| key == "enableMic" && value == "0")
            .times(1)
            .returning(|_, _| Ok(None));
        let mut session = session(device);
        session
            .panel_mut()
            .register("enableMic", Element::input(InputKind::Checkbox));

        let outcome = session
            .route(UiEvent::Change {
                id: "enableMic".into(),
                value: "false".into(),
            })
            .await
            .unwrap();

        assert_eq!(outcome, Some(Dispatched::Sent));
    }

    #[tokio::test]
    async fn test_reset_clears_status_and_group() {
        let mut session = session(MockDeviceControl::new());
        session.handle_event(text(r#"{"fps":"20"}"#)).await;
        let data = StatusMap::from_json_str(r#"{"a":"1","a_l":"A","a_t":"T"}"#).unwrap();
        session.build_table(&data, "2");

        session.reset();

        assert!(session.panel().status().is_empty());
        assert!(matches!(
            session.build_table(&data, "2"),
            BuildOutcome::Built { .. }
        ));
    }

    #[tokio::test]
    async fn test_hiding_tears_down_audio() {
        // Arrange
        let mut session = session(MockDeviceControl::new());
        let (feed, _rx) = speaker_channel();
        session.attach_speaker(feed);
        session.start_mic(48_000).unwrap();

        // Act
        session.set_visible(false).await;

        // Assert
        assert!(!session.manager().is_visible());
        assert!(!session.speaker_attached());
        assert!(!session.mic_active());
    }
}
