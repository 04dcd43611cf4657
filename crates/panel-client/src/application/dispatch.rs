//! Dispatcher: carries out the [`Action`]s produced by the event router.
//!
//! The dispatcher talks to the device through two seams so it can be tested
//! without a network:
//!
//! - [`DeviceControl`] for the HTTP endpoints (implemented by `DeviceApi`),
//! - [`CommandSink`] for websocket channels (implemented by
//!   `ConnectionManager`).
//!
//! Failures are returned to the caller as [`DispatchError`]; the session logs
//! them and carries on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use panel_core::domain::log::{complete_lines, LineSeverity};
use panel_core::{Action, OutboundCommand, Panel, StatusMap};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::infrastructure::http::{DeviceApiError, LogSource, StatusQuery};
use crate::infrastructure::ws::ConnectionError;

/// Pause between `save=1` and `reset=1`.
pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_secs(1);

// ── Seams ─────────────────────────────────────────────────────────────────────

/// HTTP side of the device.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceControl: Send + Sync {
    /// `GET /control?<key>=<value>`, response ignored.
    async fn send_control(&self, key: &str, value: &str) -> Result<(), DeviceApiError>;

    /// `GET /control?<key>=<value>`; a JSON response is returned as status.
    async fn send_control_resp(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Option<StatusMap>, DeviceApiError>;

    /// `POST /update` with `status` plus `action`.
    async fn send_updates(&self, status: &StatusMap, action: &str) -> Result<(), DeviceApiError>;

    async fn load_status(&self, query: &StatusQuery) -> Result<StatusMap, DeviceApiError>;

    async fn get_log(&self, source: LogSource) -> Result<String, DeviceApiError>;

    /// Resets the device clock when it is more than a few seconds out.
    /// Returns whether a reset was sent.
    async fn sync_clock(&self, device_epoch_secs: u64) -> Result<bool, DeviceApiError>;
}

/// Websocket side of the device.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&self, index: usize, command: OutboundCommand) -> Result<(), ConnectionError>;
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Device(#[from] DeviceApiError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// What an action did, for callers that display results.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// The request went out; nothing came back to apply.
    Sent,
    /// The device answered with status, already written to the panel.
    StatusApplied { matched: usize },
    /// The fetched log text.
    Log(String),
    /// The action only affects local presentation.
    Local,
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

pub struct Dispatcher {
    device: Arc<dyn DeviceControl>,
    sink: Arc<dyn CommandSink>,
    control_channel: usize,
    save_delay: Duration,
    log_source: LogSource,
}

impl Dispatcher {
    /// `control_channel` is the channel that carries text commands.
    pub fn new(
        device: Arc<dyn DeviceControl>,
        sink: Arc<dyn CommandSink>,
        control_channel: usize,
    ) -> Self {
        Self {
            device,
            sink,
            control_channel,
            save_delay: DEFAULT_SAVE_DELAY,
            log_source: LogSource::default(),
        }
    }

    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = delay;
        self
    }

    pub fn with_log_source(mut self, source: LogSource) -> Self {
        self.log_source = source;
        self
    }

    pub fn device(&self) -> &Arc<dyn DeviceControl> {
        &self.device
    }

    pub fn control_channel(&self) -> usize {
        self.control_channel
    }

    /// Executes one action against the device.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Device`] for HTTP failures and
    /// [`DispatchError::Connection`] when the control channel is not open.
    pub async fn execute(
        &self,
        panel: &mut Panel,
        action: Action,
    ) -> Result<Dispatched, DispatchError> {
        debug!("dispatching {action:?}");
        match action {
            Action::Control { key, value } => {
                match self.device.send_control_resp(&key, &value).await? {
                    Some(status) => Ok(Dispatched::StatusApplied {
                        matched: panel.update_status(&status),
                    }),
                    None => Ok(Dispatched::Sent),
                }
            }
            Action::SaveAndReboot => {
                self.device.send_control("save", "1").await?;
                info!("settings saved; rebooting device");
                tokio::time::sleep(self.save_delay).await;
                self.device.send_control("reset", "1").await?;
                Ok(Dispatched::Sent)
            }
            Action::ClearLog => {
                self.device.send_control("resetLog", "1").await?;
                Ok(Dispatched::Sent)
            }
            Action::ShowLog => {
                let text = self.device.get_log(self.log_source).await?;
                for line in complete_lines(&text) {
                    emit_device_line(line);
                }
                Ok(Dispatched::Log(text))
            }
            Action::SendWsUpdates { action } => {
                let body = panel.update_action_values(&action);
                self.send(OutboundCommand::Update(body)).await
            }
            Action::WsCommand(text) => self.send(OutboundCommand::Text(text)).await,
            Action::StopAudio => self.send(OutboundCommand::StopAudio).await,
            Action::OpenTab(name) => {
                debug!("tab {name} opened");
                Ok(Dispatched::Local)
            }
            Action::ClassAction { class, id } => {
                debug!("{class} action on {id} handled locally");
                Ok(Dispatched::Local)
            }
        }
    }

    /// Posts the cached status to `/update` with `action`.
    ///
    /// # Errors
    ///
    /// Propagates [`DeviceApiError`].
    pub async fn post_updates(&self, panel: &Panel, action: &str) -> Result<(), DispatchError> {
        self.device.send_updates(panel.status(), action).await?;
        Ok(())
    }

    async fn send(&self, command: OutboundCommand) -> Result<Dispatched, DispatchError> {
        self.sink.send(self.control_channel, command).await?;
        Ok(Dispatched::Sent)
    }
}

/// Re-emits a device log line at the level its text names.
pub fn emit_device_line(line: &str) {
    match LineSeverity::classify(line) {
        LineSeverity::Error => error!(target: "device", "{line}"),
        LineSeverity::Warn => warn!(target: "device", "{line}"),
        LineSeverity::Debug | LineSeverity::Check => debug!(target: "device", "{line}"),
        LineSeverity::Plain => info!(target: "device", "{line}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use mockall::predicate::eq;
    use mockall::Sequence;
    use panel_core::{Element, InputKind};

    use super::*;

    /// Records every command instead of sending it.
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(usize, OutboundCommand)>>,
        fail: bool,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<(usize, OutboundCommand)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandSink for RecordingSink {
        async fn send(
            &self,
            index: usize,
            command: OutboundCommand,
        ) -> Result<(), ConnectionError> {
            if self.fail {
                return Err(ConnectionError::NotOpen { index, attempts: 1 });
            }
            self.sent.lock().unwrap().push((index, command));
            Ok(())
        }
    }

    fn dispatcher(device: MockDeviceControl, sink: Arc<RecordingSink>) -> Dispatcher {
        Dispatcher::new(Arc::new(device), sink, 0).with_save_delay(Duration::ZERO)
    }

    fn control(key: &str, value: &str) -> Action {
        Action::Control {
            key: key.into(),
            value: value.into(),
        }
    }

    #[tokio::test]
    async fn test_control_applies_returned_status() {
        // Arrange
        let mut device = MockDeviceControl::new();
        device
            .expect_send_control_resp()
            .withf(|key, value| key == "fps" && value == "12")
            .times(1)
            .returning(|_, _| {
                let mut status = StatusMap::new();
                status.insert("fps", "12");
                status.insert("other", "x");
                Ok(Some(status))
            });
        let mut panel = Panel::new();
        panel.register("fps", Element::input(InputKind::Number));

        // Act
        let outcome = dispatcher(device, Arc::default())
            .execute(&mut panel, control("fps", "12"))
            .await
            .unwrap();

        // Assert
        assert_eq!(outcome, Dispatched::StatusApplied { matched: 1 });
        assert_eq!(panel.read("fps").as_deref(), Some("12"));
        assert_eq!(panel.status().get_text("other").as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_control_with_empty_response_is_sent() {
        let mut device = MockDeviceControl::new();
        device
            .expect_send_control_resp()
            .times(1)
            .returning(|_, _| Ok(None));

        let outcome = dispatcher(device, Arc::default())
            .execute(&mut Panel::new(), control("lamp", "1"))
            .await
            .unwrap();

        assert_eq!(outcome, Dispatched::Sent);
    }

    #[tokio::test]
    async fn test_save_and_reboot_sends_save_then_reset() {
        // Arrange
        let mut device = MockDeviceControl::new();
        let mut seq = Sequence::new();
        device
            .expect_send_control()
            .with(eq("save"), eq("1"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        device
            .expect_send_control()
            .with(eq("reset"), eq("1"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        // Act
        let outcome = dispatcher(device, Arc::default())
            .execute(&mut Panel::new(), Action::SaveAndReboot)
            .await
            .unwrap();

        // Assert
        assert_eq!(outcome, Dispatched::Sent);
    }

    #[tokio::test]
    async fn test_failed_save_does_not_reboot() {
        let mut device = MockDeviceControl::new();
        device
            .expect_send_control()
            .with(eq("save"), eq("1"))
            .times(1)
            .returning(|_, _| {
                Err(DeviceApiError::RetriesExhausted {
                    url: "/control?save=1".into(),
                    attempts: 1,
                })
            });

        let result = dispatcher(device, Arc::default())
            .execute(&mut Panel::new(), Action::SaveAndReboot)
            .await;

        assert!(matches!(result, Err(DispatchError::Device(_))));
    }

    #[tokio::test]
    async fn test_clear_log_sends_reset_log() {
        let mut device = MockDeviceControl::new();
        device
            .expect_send_control()
            .with(eq("resetLog"), eq("1"))
            .times(1)
            .returning(|_, _| Ok(()));

        dispatcher(device, Arc::default())
            .execute(&mut Panel::new(), Action::ClearLog)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_show_log_fetches_stored_log() {
        let mut device = MockDeviceControl::new();
        device
            .expect_get_log()
            .with(eq(LogSource::Stored))
            .times(1)
            .returning(|_| Ok("boot\nWARN low heap\n".to_string()));

        let outcome = dispatcher(device, Arc::default())
            .execute(&mut Panel::new(), Action::ShowLog)
            .await
            .unwrap();

        assert_eq!(outcome, Dispatched::Log("boot\nWARN low heap\n".into()));
    }

    #[tokio::test]
    async fn test_ws_updates_go_to_control_channel() {
        // Arrange
        let sink = Arc::new(RecordingSink::default());
        let mut panel = Panel::new();
        panel.register("vol", Element::input(InputKind::Text));
        panel.mark_update_action("vol");
        panel.set_user_value("vol", " 7 ");

        // Act
        dispatcher(MockDeviceControl::new(), sink.clone())
            .execute(
                &mut panel,
                Action::SendWsUpdates {
                    action: "send".into(),
                },
            )
            .await
            .unwrap();

        // Assert
        let sent = sent_text(&sink);
        assert_eq!(sent, vec![r#"U{"action":"send","vol":"7"}"#.to_string()]);
    }

    #[tokio::test]
    async fn test_ws_command_and_stop_audio() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = dispatcher(MockDeviceControl::new(), sink.clone());
        let mut panel = Panel::new();

        dispatcher
            .execute(&mut panel, Action::WsCommand("dbgVerbose".into()))
            .await
            .unwrap();
        dispatcher.execute(&mut panel, Action::StopAudio).await.unwrap();

        assert_eq!(sent_text(&sink), vec!["dbgVerbose".to_string(), "X".to_string()]);
        assert!(sink.sent().iter().all(|(index, _)| *index == 0));
    }

    #[tokio::test]
    async fn test_closed_channel_is_reported() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });

        let result = dispatcher(MockDeviceControl::new(), sink)
            .execute(&mut Panel::new(), Action::StopAudio)
            .await;

        assert!(matches!(
            result,
            Err(DispatchError::Connection(ConnectionError::NotOpen { index: 0, .. }))
        ));
    }

    #[tokio::test]
    async fn test_local_actions_touch_nothing() {
        // A mock with no expectations panics on any call.
        let dispatcher = dispatcher(MockDeviceControl::new(), Arc::default());
        let mut panel = Panel::new();

        let tab = dispatcher
            .execute(&mut panel, Action::OpenTab("mainPage".into()))
            .await
            .unwrap();
        let nav = dispatcher
            .execute(
                &mut panel,
                Action::ClassAction {
                    class: "nav-icon".into(),
                    id: "fullscreen".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(tab, Dispatched::Local);
        assert_eq!(nav, Dispatched::Local);
    }

    #[tokio::test]
    async fn test_post_updates_sends_cached_status() {
        let mut device = MockDeviceControl::new();
        device
            .expect_send_updates()
            .withf(|status, action| {
                action == "save"
                    && status.to_update_body(action).to_string()
                        == r#"{"a":1,"b":"x","action":"save"}"#
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let mut panel = Panel::new();
        let mut status = StatusMap::new();
        status.insert("a", 1);
        status.insert("b", "x");
        panel.update_status(&status);

        dispatcher(device, Arc::default())
            .post_updates(&panel, "save")
            .await
            .unwrap();
    }

    fn sent_text(sink: &RecordingSink) -> Vec<String> {
        sink.sent()
            .into_iter()
            .map(|(_, command)| match command.into_wire() {
                panel_core::WireFrame::Text(text) => text,
                panel_core::WireFrame::Binary(bytes) => format!("<{} bytes>", bytes.len()),
            })
            .collect()
    }
}
