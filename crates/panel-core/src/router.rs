//! UI event router.
//!
//! Translates UI events into typed [`Action`]s through an explicit
//! [`CommandTable`].  The default rule for each element role covers the
//! common case (send `<id>=<value>` to `/control`); ids with special
//! behaviour are listed in the table's override map.
//!
//! | Event                         | Default action                     |
//! |-------------------------------|------------------------------------|
//! | click on a button             | `Control { id, value or "1" }`     |
//! | click on an svg rect          | `Control { label id, "1" }`        |
//! | click on a tab link           | `OpenTab(name)`                    |
//! | click on a nav/icon element   | `ClassAction { class, id }`        |
//! | change of a bound control     | `Control { key, change value }`    |
//! | Enter in the command box      | `WsCommand(text)`                  |

use std::collections::HashMap;

use crate::domain::panel::Panel;

/// Id of the free-text command box.
pub const COMMAND_BOX_ID: &str = "txtCmd";

/// What was clicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickRole {
    /// Plain button; `value` is its value attribute.
    Button { value: Option<String> },
    /// Svg button background; the label node carries the device key.
    SvgRect { label_id: String },
    /// Tab selector; the id names the tab.
    TabLink,
    /// Navigation or presentation icon identified by class.
    Nav { class: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Click { id: String, role: ClickRole },
    /// The user set a new value on the bound control `id`.
    Change { id: String, value: String },
    /// Enter pressed in a text box.
    Enter { id: String, text: String },
}

/// Typed outcome of a UI event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// `GET /control?<key>=<value>`.
    Control { key: String, value: String },
    OpenTab(String),
    /// App-specific handling keyed by element class.
    ClassAction { class: String, id: String },
    /// Save settings, wait, then reboot the device.
    SaveAndReboot,
    /// Erase the device's stored log.
    ClearLog,
    /// Fetch and show the stored log.
    ShowLog,
    /// Websocket bulk update of the update-action inputs.
    SendWsUpdates { action: String },
    /// Free-text websocket command.
    WsCommand(String),
    /// Stop the remote mic stream.
    StopAudio,
}

/// Maps element ids to actions that replace the role's default rule.
#[derive(Debug, Clone)]
pub struct CommandTable {
    overrides: HashMap<String, Action>,
}

impl Default for CommandTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.register("save", Action::SaveAndReboot);
        table.register("clearLog", Action::ClearLog);
        table.register("getLog", Action::ShowLog);
        table.register(
            "wsUpdate",
            Action::SendWsUpdates {
                action: "send".to_string(),
            },
        );
        table.register("stopAudio", Action::StopAudio);
        table
    }
}

impl CommandTable {
    /// A table with no overrides: every event follows its role's rule.
    pub fn empty() -> Self {
        Self {
            overrides: HashMap::new(),
        }
    }

    /// Routes clicks on (and changes of) `id` to `action`.
    pub fn register(&mut self, id: impl Into<String>, action: Action) {
        self.overrides.insert(id.into(), action);
    }

    /// Routes an event.  Change events are applied to the panel first so the
    /// control's change handler produces the value sent.
    ///
    /// Returns `None` when the event has no device-facing effect (an empty
    /// command line, a change to a read-only control, an unknown element).
    pub fn route(&self, panel: &mut Panel, event: UiEvent) -> Option<Action> {
        match event {
            UiEvent::Click { id, role } => {
                if let Some(action) = self.overrides.get(&id) {
                    return Some(action.clone());
                }
                Some(match role {
                    ClickRole::Button { value } => Action::Control {
                        key: id,
                        value: value.unwrap_or_else(|| "1".to_string()),
                    },
                    ClickRole::SvgRect { label_id } => Action::Control {
                        key: label_id,
                        value: "1".to_string(),
                    },
                    ClickRole::TabLink => {
                        panel.open_tab(id.clone());
                        Action::OpenTab(id)
                    }
                    ClickRole::Nav { class } => Action::ClassAction { class, id },
                })
            }
            UiEvent::Change { id, value } => {
                if let Some(action) = self.overrides.get(&id) {
                    return Some(action.clone());
                }
                let sent = panel.set_user_value(&id, &value)?;
                Some(Action::Control { key: id, value: sent })
            }
            UiEvent::Enter { id, text } => {
                if id != COMMAND_BOX_ID {
                    return None;
                }
                if text.is_empty() {
                    None
                } else {
                    Some(Action::WsCommand(text))
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
