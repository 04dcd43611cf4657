//! Integration tests for panel-core.
//!
//! These drive the public API the way a session does: inbound frames are
//! classified, status pushes land in the panel, config payloads become bound
//! controls, and user edits route back out as actions.

use panel_core::{
    classify_text, Action, BuildOutcome, CommandTable, Container, Element, InboundMessage,
    InputKind, OutboundCommand, Panel, TableBuilder, UiEvent, WireFrame,
};

const CONFIG_PUSH: &str = r#"{"cfgGroup":"2",
    "hostName":"cam1","h_l":"Host name","h_t":"T",
    "fps":"20","f_l":"Frame rate","f_t":"R:1:30:1",
    "enableMic":"0","e_l":"Microphone","e_t":"C"}"#;

fn decode_config(text: &str) -> (String, panel_core::StatusMap) {
    match classify_text(text).expect("valid push") {
        InboundMessage::Config { group, data } => (group, data),
        other => panic!("expected config push, got {other:?}"),
    }
}

#[test]
fn test_config_push_becomes_editable_controls() {
    // Arrange
    let (group, data) = decode_config(CONFIG_PUSH);
    let mut builder = TableBuilder::new();
    let mut panel = Panel::new();

    // Act
    let BuildOutcome::Built { table, errors } = builder.build(&data, &group) else {
        panic!("first build must render");
    };
    panel.bind_table(&table);

    // Assert
    assert!(errors.is_empty());
    assert_eq!(table.container, Container::Shared);
    assert_eq!(table.rows.len(), 3);
    assert_eq!(panel.read("hostName").as_deref(), Some("cam1"));
    assert_eq!(panel.read("fps").as_deref(), Some("20"));
    assert_eq!(panel.read("enableMic").as_deref(), Some("0"));
}

#[test]
fn test_repeated_config_push_is_not_rebuilt_until_cleared() {
    let (group, data) = decode_config(CONFIG_PUSH);
    let mut builder = TableBuilder::new();

    assert!(matches!(builder.build(&data, &group), BuildOutcome::Built { .. }));
    assert_eq!(builder.build(&data, &group), BuildOutcome::Skipped);

    builder.clear();
    assert!(matches!(builder.build(&data, &group), BuildOutcome::Built { .. }));
}

#[test]
fn test_status_push_then_user_edit_routes_control() {
    // Arrange
    let (group, data) = decode_config(CONFIG_PUSH);
    let mut builder = TableBuilder::new();
    let mut panel = Panel::new();
    if let BuildOutcome::Built { table, .. } = builder.build(&data, &group) {
        panel.bind_table(&table);
    }
    let InboundMessage::Status(status) =
        classify_text(r#"{"cfgGroup":"-1","fps":"25","enableMic":1}"#).expect("valid push")
    else {
        panic!("expected status push");
    };

    // Act
    panel.update_status(&status);
    let action = CommandTable::default().route(
        &mut panel,
        UiEvent::Change {
            id: "fps".into(),
            value: "40".into(),
        },
    );

    // Assert
    assert_eq!(panel.read("enableMic").as_deref(), Some("1"));
    assert_eq!(
        action,
        Some(Action::Control {
            key: "fps".into(),
            value: "30".into()
        })
    );
}

#[test]
fn test_ws_update_collects_marked_inputs_into_wire_frame() {
    // Arrange
    let mut panel = Panel::new();
    panel.register("sfx", Element::input(InputKind::Text));
    panel.register("vol", Element::input(InputKind::Number));
    panel.mark_update_action("sfx");
    panel.mark_update_action("vol");
    panel.set_user_value("sfx", "beep");
    panel.set_user_value("vol", "7");
    let Some(Action::SendWsUpdates { action }) = CommandTable::default().route(
        &mut panel,
        UiEvent::Change {
            id: "wsUpdate".into(),
            value: String::new(),
        },
    ) else {
        panic!("wsUpdate must route to a bulk update");
    };

    // Act
    let frame = OutboundCommand::Update(panel.update_action_values(&action)).into_wire();

    // Assert
    assert_eq!(
        frame,
        WireFrame::Text(r#"U{"action":"send","sfx":"beep","vol":"7"}"#.to_string())
    );
}
