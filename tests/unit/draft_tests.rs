use super::*;
use crate::channel::{AgentCommand, AgentEvent, StateChannel};
use serde_json::json;

fn channel_with(state: serde_json::Value) -> (StateChannel, crate::channel::RemoteEnd) {
    let (mut channel, remote) = StateChannel::in_memory(None);
    remote.emit(AgentEvent::StateSnapshot {
        snapshot: AgentState::from_value(state).expect("state should parse"),
        running: Some(true),
    });
    channel.drain_events_limited(16);
    (channel, remote)
}

fn editor_for(channel: &mut StateChannel) -> DraftEditor {
    let publisher = channel.take_publisher().expect("publisher available once");
    DraftEditor::new(publisher, channel.state())
}

fn replace_text(editor: &mut DraftEditor, text: &str) {
    while !editor.text().is_empty() {
        editor.move_cursor_right();
        let before = editor.text().len();
        editor.backspace();
        if editor.text().len() == before {
            break;
        }
    }
    for c in text.chars() {
        if c == '\n' {
            editor.input_newline();
        } else {
            editor.input_char(c);
        }
    }
}

#[test]
fn draft_hides_reserved_fields() {
    let (mut channel, _remote) = channel_with(json!({
        "messages": [{ "role": "user", "content": "plan rust" }],
        "learning_plan": { "topic": "Rust", "duration_weeks": 2, "weekly_plans": [] }
    }));
    let editor = editor_for(&mut channel);
    assert!(editor.text().contains("\"topic\": \"Rust\""));
    assert!(!editor.text().contains("messages"));
    assert!(!editor.text().contains("running"));
}

#[test]
fn keystrokes_before_begin_edit_are_ignored() {
    let (mut channel, _remote) = channel_with(json!({}));
    let mut editor = editor_for(&mut channel);
    editor.input_char('x');
    assert!(!editor.is_dirty());
    assert_eq!(editor.text(), "{}");
}

#[test]
fn commit_publishes_parsed_draft_with_reserved_fields() {
    let (mut channel, remote) = channel_with(json!({
        "messages": ["m1"],
        "running": true,
        "custom": 1
    }));
    let mut editor = editor_for(&mut channel);
    editor.begin_edit();
    replace_text(
        &mut editor,
        r#"{"custom": 2, "messages": ["forged"], "learning_plan": {"topic": "Go", "duration_weeks": 1, "weekly_plans": []}}"#,
    );
    assert!(editor.is_dirty());

    editor.commit(&mut channel).expect("valid draft should commit");

    let expected = parse_draft(
        r#"{"custom": 2, "learning_plan": {"topic": "Go", "duration_weeks": 1, "weekly_plans": []}}"#,
    )
    .expect("expected document parses");
    let stored = channel.state();
    assert_eq!(stored.messages, Some(json!(["m1"])));
    assert_eq!(stored.running, Some(true));
    assert_eq!(stored.editable(), expected);
    assert!(!editor.is_editing());
    assert!(!editor.is_dirty());

    let sent = remote.sent_commands();
    assert_eq!(sent.len(), 1);
    let AgentCommand::StateOverwrite { state } = &sent[0] else {
        panic!("expected a state overwrite, got {sent:?}");
    };
    assert_eq!(state, stored);
}

#[test]
fn malformed_draft_keeps_session_open_and_sends_nothing() {
    let (mut channel, remote) = channel_with(json!({ "custom": 1 }));
    let before = channel.state().clone();
    let mut editor = editor_for(&mut channel);
    editor.begin_edit();
    replace_text(&mut editor, "{\"custom\": ");

    let err = editor.commit(&mut channel).expect_err("truncated JSON must fail");
    assert!(matches!(err, DraftError::MalformedDraftFormat(_)));
    assert!(err.to_string().starts_with("Invalid JSON format"));
    assert!(editor.is_editing());
    assert!(editor.is_dirty());
    assert_eq!(editor.text(), "{\"custom\": ");
    assert_eq!(editor.last_error(), Some(&err));
    assert_eq!(channel.state(), &before);
    assert!(remote.sent_commands().is_empty());
}

#[test]
fn non_object_draft_is_malformed() {
    assert!(matches!(
        parse_draft("[1, 2]"),
        Err(DraftError::MalformedDraftFormat(_))
    ));
    assert!(matches!(
        parse_draft(r#"{"learning_plan": "not a plan"}"#),
        Err(DraftError::MalformedDraftFormat(_))
    ));
}

#[test]
fn commit_without_session_is_rejected() {
    let (mut channel, remote) = channel_with(json!({}));
    let mut editor = editor_for(&mut channel);
    assert_eq!(editor.commit(&mut channel), Err(DraftError::NotEditing));
    assert!(remote.sent_commands().is_empty());
}

#[test]
fn discard_restores_last_good_text_and_leaves_document_alone() {
    let (mut channel, remote) = channel_with(json!({ "custom": 1 }));
    let before = channel.state().clone();
    let mut editor = editor_for(&mut channel);
    let original_text = editor.text().to_string();

    editor.begin_edit();
    replace_text(&mut editor, "{\"custom\": 99}");
    editor.discard();

    assert_eq!(editor.text(), original_text);
    assert!(!editor.is_editing());
    assert!(!editor.is_dirty());
    assert_eq!(channel.state(), &before);
    assert!(remote.sent_commands().is_empty());
}

#[test]
fn snapshot_while_dirty_is_held_until_session_is_clean() {
    let (mut channel, remote) = channel_with(json!({ "custom": 1 }));
    let mut editor = editor_for(&mut channel);
    editor.begin_edit();
    editor.input_char(' ');
    let draft_text = editor.text().to_string();

    remote.emit(AgentEvent::StateSnapshot {
        snapshot: AgentState::from_value(json!({ "custom": 2 })).expect("parse"),
        running: None,
    });
    channel.drain_events_limited(16);
    editor.on_snapshot(channel.state());

    assert_eq!(editor.text(), draft_text);
    assert!(editor.has_pending_snapshot());

    editor.discard();
    assert!(!editor.has_pending_snapshot());
    assert!(editor.text().contains("\"custom\": 2"));

    remote.emit(AgentEvent::StateSnapshot {
        snapshot: AgentState::from_value(json!({ "custom": 3 })).expect("parse"),
        running: None,
    });
    channel.drain_events_limited(16);
    editor.on_snapshot(channel.state());
    assert!(editor.text().contains("\"custom\": 3"));
}

#[test]
fn clean_open_session_follows_snapshots() {
    let (mut channel, _remote) = channel_with(json!({ "custom": 1 }));
    let mut editor = editor_for(&mut channel);
    editor.begin_edit();
    editor.on_snapshot(&AgentState::from_value(json!({ "custom": 5 })).expect("parse"));
    assert!(editor.is_editing());
    assert!(editor.text().contains("\"custom\": 5"));
}

#[test]
fn begin_edit_twice_keeps_the_same_session() {
    let (mut channel, _remote) = channel_with(json!({}));
    let mut editor = editor_for(&mut channel);
    editor.begin_edit();
    editor.input_char(' ');
    editor.begin_edit();
    assert!(editor.is_dirty());
    assert!(editor.is_editing());
}

#[test]
fn commit_supersedes_snapshot_held_back_during_edit() {
    let (mut channel, remote) = channel_with(json!({ "custom": 1 }));
    let mut editor = editor_for(&mut channel);
    editor.begin_edit();
    replace_text(&mut editor, r#"{"mine": true}"#);

    remote.emit(AgentEvent::StateSnapshot {
        snapshot: AgentState::from_value(json!({ "custom": 2 })).expect("parse"),
        running: None,
    });
    channel.drain_events_limited(16);
    editor.on_snapshot(channel.state());
    assert!(editor.has_pending_snapshot());

    editor.commit(&mut channel).expect("draft commits");
    assert!(!editor.has_pending_snapshot());
    assert!(editor.text().contains("\"mine\": true"));
    assert!(!editor.text().contains("custom"));
    assert_eq!(channel.state().extra.get("mine"), Some(&json!(true)));
}
