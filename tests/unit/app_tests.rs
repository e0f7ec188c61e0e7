use super::*;
use crate::channel::{AgentCommand, RemoteEnd};
use crate::interrupt::InterruptOutcome;
use crate::state::AgentState;
use serde_json::json;

fn test_app() -> (App, RemoteEnd) {
    test_app_with_timeout(None)
}

fn test_app_with_timeout(interrupt_timeout: Option<Duration>) -> (App, RemoteEnd) {
    let (channel, remote) = StateChannel::in_memory(None);
    let app = App::new(
        channel,
        AppOptions {
            interrupt_timeout,
            export_dir: std::env::temp_dir().join("coagent-canvas-app-tests"),
        },
    )
    .expect("fresh channel hands out its publisher");
    (app, remote)
}

fn snapshot(value: serde_json::Value) -> AgentEvent {
    AgentEvent::StateSnapshot {
        snapshot: AgentState::from_value(value).expect("snapshot parses"),
        running: None,
    }
}

fn tool_update(id: &str, name: &str, status: &str) -> AgentEvent {
    AgentEvent::ToolCallUpdate {
        tool_call_id: id.to_string(),
        tool_call_name: name.to_string(),
        args: json!({ "query": "rust" }),
        status: status.to_string(),
        result: None,
    }
}

fn type_text(app: &mut App, text: &str) {
    for c in text.chars() {
        if c == '\n' {
            app.submit();
        } else {
            app.input_char(c);
        }
    }
}

fn replace_draft(app: &mut App, text: &str) {
    let len = app.draft.text().chars().count();
    for _ in 0..len {
        app.move_cursor_right();
    }
    for _ in 0..len {
        app.backspace();
    }
    type_text(app, text);
}

fn two_week_plan() -> serde_json::Value {
    json!({
        "running": true,
        "learning_plan": {
            "topic": "Rust",
            "duration_weeks": 2,
            "weekly_plans": [
                { "week_number": 1, "focus": "Ownership" },
                { "week_number": 2, "focus": "Traits" }
            ]
        }
    })
}

#[test]
fn new_app_greets_and_shows_chat_only_while_idle() {
    let (app, _remote) = test_app();
    assert_eq!(app.chat_messages(), vec![format!("Agent: {GREETING}")]);
    assert!(!app.show_state_pane());
    assert_eq!(app.active_pane, Pane::Chat);
}

#[test]
fn app_cannot_be_built_twice_on_one_channel() {
    let (mut channel, _remote) = StateChannel::in_memory(None);
    let _publisher = channel.take_publisher();
    let result = App::new(
        channel,
        AppOptions {
            interrupt_timeout: None,
            export_dir: std::env::temp_dir(),
        },
    );
    assert!(matches!(result, Err(ChannelError::PublisherTaken)));
}

#[test]
fn running_agent_opens_state_pane_and_focus_cycles() {
    let (mut app, remote) = test_app();
    app.next_pane();
    assert_eq!(app.active_pane, Pane::Chat);

    remote.emit(AgentEvent::RunStarted {
        thread_id: None,
        run_id: None,
    });
    app.pump_channel(Instant::now());
    assert!(app.show_state_pane());
    app.next_pane();
    assert_eq!(app.active_pane, Pane::State);

    remote.emit(AgentEvent::RunFinished { run_id: None });
    app.pump_channel(Instant::now());
    assert!(!app.show_state_pane());
    assert_eq!(app.active_pane, Pane::Chat);
}

#[test]
fn streamed_text_accumulates_in_one_agent_line() {
    let (mut app, remote) = test_app();
    for delta in ["Let's ", "learn ", "Rust."] {
        remote.emit(AgentEvent::TextMessageContent {
            message_id: Some("m1".to_string()),
            delta: delta.to_string(),
        });
    }
    remote.emit(AgentEvent::TextMessageContent {
        message_id: Some("m2".to_string()),
        delta: "Next".to_string(),
    });
    app.pump_channel(Instant::now());
    let messages = app.chat_messages();
    assert_eq!(messages[1], "Agent: Let's learn Rust.");
    assert_eq!(messages[2], "Agent: Next");
}

#[test]
fn tool_updates_render_one_chip_that_never_regresses() {
    let (mut app, remote) = test_app();
    remote.emit(tool_update("c1", "search_web", "inProgress"));
    remote.emit(tool_update("c1", "search_web", "complete"));
    remote.emit(tool_update("c1", "search_web", "inProgress"));
    app.pump_channel(Instant::now());

    let chips: Vec<String> = app
        .chat_messages()
        .into_iter()
        .filter(|line| line.starts_with("Tool:"))
        .collect();
    assert_eq!(chips.len(), 1);
    assert!(chips[0].contains("Search Complete"), "{}", chips[0]);
    assert!(chips[0].ends_with('✓'), "{}", chips[0]);
}

#[test]
fn selected_tool_chip_shows_details() {
    let (mut app, remote) = test_app();
    remote.emit(tool_update("c1", "update_learning_plan_canvas", "complete"));
    app.pump_channel(Instant::now());

    app.cycle_tool_detail();
    let chip = app.chat_messages().pop().expect("chip present");
    assert!(chip.contains("Canvas Updated"));
    assert!(chip.contains("\nArguments:"));
    assert!(chip.contains("\"query\": \"rust\""));

    app.cancel();
    let chip = app.chat_messages().pop().expect("chip present");
    assert!(!chip.contains("Arguments:"));
}

#[test]
fn submit_sends_chat_message_upstream() {
    let (mut app, remote) = test_app();
    type_text(&mut app, "  teach me chess  ");
    app.submit();
    assert_eq!(app.chat_input(), "");
    assert_eq!(
        app.chat_messages().last().map(String::as_str),
        Some("You: teach me chess")
    );
    assert_eq!(
        remote.sent_commands(),
        vec![AgentCommand::UserMessage {
            content: "teach me chess".to_string()
        }]
    );
}

#[test]
fn blank_submit_is_ignored() {
    let (mut app, remote) = test_app();
    type_text(&mut app, "   ");
    app.submit();
    assert!(remote.sent_commands().is_empty());
    assert_eq!(app.chat_messages().len(), 1);
}

#[test]
fn submit_answers_outstanding_interrupt_once() {
    let (mut app, remote) = test_app();
    remote.emit(AgentEvent::Interrupt {
        id: "i1".to_string(),
        value: json!({ "question": "How many hours per week?" }),
    });
    app.pump_channel(Instant::now());
    assert_eq!(
        app.interrupt_prompt().as_deref(),
        Some("How many hours per week?")
    );

    type_text(&mut app, "five");
    app.submit();
    assert_eq!(app.interrupt_prompt(), None);

    type_text(&mut app, "thanks");
    app.submit();
    assert_eq!(
        remote.sent_commands(),
        vec![
            AgentCommand::InterruptResolution {
                id: "i1".to_string(),
                outcome: InterruptOutcome::Resolved(json!("five")),
            },
            AgentCommand::UserMessage {
                content: "thanks".to_string()
            },
        ]
    );
}

#[test]
fn second_interrupt_is_reported_and_first_kept() {
    let (mut app, remote) = test_app();
    for id in ["i1", "i2"] {
        remote.emit(AgentEvent::Interrupt {
            id: id.to_string(),
            value: json!("Pick a topic"),
        });
    }
    app.pump_channel(Instant::now());
    let last = app.chat_messages().pop().expect("notice present");
    assert!(last.starts_with("System:") && last.contains("i2"), "{last}");
    assert_eq!(app.gate.pending().map(|pending| pending.id.as_str()), Some("i1"));
}

#[test]
fn escape_declines_interrupt() {
    let (mut app, remote) = test_app();
    remote.emit(AgentEvent::Interrupt {
        id: "i1".to_string(),
        value: serde_json::Value::Null,
    });
    app.pump_channel(Instant::now());
    app.cancel();
    assert_eq!(
        remote.sent_commands(),
        vec![AgentCommand::InterruptResolution {
            id: "i1".to_string(),
            outcome: InterruptOutcome::Cancelled,
        }]
    );
}

#[test]
fn unanswered_interrupt_times_out() {
    let (mut app, remote) = test_app_with_timeout(Some(Duration::from_secs(30)));
    let start = Instant::now();
    remote.emit(AgentEvent::Interrupt {
        id: "i1".to_string(),
        value: json!("still there?"),
    });
    app.pump_channel(start);
    app.pump_channel(start + Duration::from_secs(31));
    assert_eq!(
        remote.sent_commands(),
        vec![AgentCommand::InterruptResolution {
            id: "i1".to_string(),
            outcome: InterruptOutcome::TimedOut,
        }]
    );
    assert!(app.interrupt_prompt().is_none());
}

#[test]
fn edit_session_commits_valid_json() {
    let (mut app, remote) = test_app();
    app.toggle_edit();
    assert!(app.is_editing());
    assert_eq!(app.active_pane, Pane::State);
    assert_eq!(app.state_tab(), StateTab::Json);

    replace_draft(&mut app, r#"{"notes": "draft"}"#);
    assert!(app.is_draft_dirty());
    app.save_draft();

    assert!(!app.is_editing());
    assert_eq!(
        app.notice().map(|notice| notice.text.as_str()),
        Some("State saved.")
    );
    let sent = remote.sent_commands();
    assert!(matches!(
        sent.as_slice(),
        [AgentCommand::StateOverwrite { state }] if state.extra.get("notes") == Some(&json!("draft"))
    ));
}

#[test]
fn malformed_draft_keeps_session_open_with_error() {
    let (mut app, remote) = test_app();
    app.toggle_edit();
    replace_draft(&mut app, "{ not json");
    app.save_draft();

    assert!(app.is_editing());
    assert!(matches!(
        app.draft_error(),
        Some(DraftError::MalformedDraftFormat(_))
    ));
    assert!(app.notice().is_some_and(|notice| notice.is_error
        && notice.text.starts_with("Invalid JSON format. Please check your input.")));
    assert!(remote.sent_commands().is_empty());
}

#[test]
fn escape_discards_edits() {
    let (mut app, remote) = test_app();
    app.toggle_edit();
    replace_draft(&mut app, "garbage");
    app.cancel();
    assert!(!app.is_editing());
    assert_eq!(app.draft.text(), "{}");
    assert!(remote.sent_commands().is_empty());
}

#[test]
fn save_without_edit_session_hints_at_shortcut() {
    let (mut app, _remote) = test_app();
    app.save_draft();
    assert!(app.notice().is_some_and(|notice| notice.is_error));
}

#[test]
fn snapshot_while_dirty_does_not_touch_draft() {
    let (mut app, remote) = test_app();
    app.toggle_edit();
    replace_draft(&mut app, r#"{"mine": 1}"#);
    remote.emit(snapshot(json!({ "theirs": 2 })));
    app.pump_channel(Instant::now());
    assert_eq!(app.draft.text(), r#"{"mine": 1}"#);
    assert!(app.has_pending_agent_update());

    app.cancel();
    assert!(app.draft.text().contains("theirs"));
    assert!(!app.has_pending_agent_update());
}

#[test]
fn brackets_switch_weeks_in_state_pane() {
    let (mut app, remote) = test_app();
    remote.emit(snapshot(two_week_plan()));
    app.pump_channel(Instant::now());
    assert_eq!(app.weeks.active(), Some(1));

    app.next_pane();
    assert_eq!(app.active_pane, Pane::State);
    app.input_char(']');
    assert_eq!(app.weeks.active(), Some(2));
    app.input_char(']');
    assert_eq!(app.weeks.active(), Some(2));
    app.input_char('[');
    assert_eq!(app.weeks.active(), Some(1));
    assert_eq!(app.chat_input(), "");
}

#[test]
fn week_selection_survives_snapshots_and_resets_when_plan_goes() {
    let (mut app, remote) = test_app();
    remote.emit(snapshot(two_week_plan()));
    app.pump_channel(Instant::now());
    app.select_week(2);

    remote.emit(snapshot(two_week_plan()));
    app.pump_channel(Instant::now());
    assert_eq!(app.weeks.active(), Some(2));

    remote.emit(snapshot(json!({ "running": true })));
    app.pump_channel(Instant::now());
    assert_eq!(app.weeks.active(), None);
}

#[test]
fn expanded_groups_are_pruned_when_results_disappear() {
    let (mut app, remote) = test_app();
    remote.emit(snapshot(json!({
        "running": true,
        "search_results": [{ "query": "q", "results": [{ "title": "t" }] }]
    })));
    app.pump_channel(Instant::now());
    app.toggle_expanded("search:0");
    assert!(app.expanded.contains("search:0"));

    remote.emit(snapshot(json!({ "running": true })));
    app.pump_channel(Instant::now());
    assert!(app.expanded.is_empty());
}

#[test]
fn export_without_plan_reports_error() {
    let (mut app, _remote) = test_app();
    app.export(ExportKind::Plan);
    assert!(app.notice().is_some_and(|notice| notice.is_error
        && notice.text.contains("Export failed")));
}

#[test]
fn tab_toggle_is_locked_while_editing() {
    let (mut app, _remote) = test_app();
    app.toggle_tab();
    assert_eq!(app.state_tab(), StateTab::Json);
    app.toggle_tab();
    assert_eq!(app.state_tab(), StateTab::Visual);

    app.toggle_edit();
    app.toggle_tab();
    assert_eq!(app.state_tab(), StateTab::Json);
}

#[test]
fn disconnect_and_run_error_become_system_lines() {
    let (mut app, remote) = test_app();
    remote.emit(AgentEvent::RunError {
        message: "quota".to_string(),
    });
    remote.emit_raw(ChannelEvent::Disconnected { code: Some(3) });
    app.pump_channel(Instant::now());
    let messages = app.chat_messages();
    assert!(messages.contains(&"System: Agent run failed: quota".to_string()));
    assert!(messages.contains(&"System: Agent bridge disconnected (exit code 3).".to_string()));
}

#[test]
fn chat_scroll_follows_until_user_scrolls_up() {
    let (mut app, _remote) = test_app();
    assert_eq!(app.chat_scroll_offset(10), 10);
    app.scroll_chat_up(10);
    assert_eq!(app.chat_scroll_offset(20), 9);
    app.scroll_chat_down(10);
    assert_eq!(app.chat_scroll_offset(12), 12);
}

#[test]
fn stalled_flag_tracks_channel() {
    let (channel, remote) = StateChannel::in_memory(Some(Duration::from_secs(5)));
    let mut app = App::new(
        channel,
        AppOptions {
            interrupt_timeout: None,
            export_dir: std::env::temp_dir(),
        },
    )
    .expect("app");
    remote.emit(AgentEvent::RunStarted {
        thread_id: None,
        run_id: None,
    });
    app.pump_channel(Instant::now());
    assert!(!app.is_stalled());
    app.pump_channel(Instant::now() + Duration::from_secs(60));
    assert!(app.is_stalled());
}

#[test]
fn committing_a_plan_selects_its_first_week() {
    let (mut app, _remote) = test_app();
    app.toggle_edit();
    replace_draft(
        &mut app,
        r#"{"learning_plan": {"topic": "Rust", "duration_weeks": 2, "weekly_plans": [{"week_number": 1, "focus": "Basics"}, {"week_number": 2, "focus": "Traits"}]}}"#,
    );
    app.save_draft();
    assert!(!app.is_editing());
    assert_eq!(app.weeks.active(), Some(1));
    let view = app.state_view(80);
    assert!(view.lines.iter().any(|line| line.contains("[Week 1]")), "{:?}", view.lines);
    assert!(view.lines.iter().any(|line| line.contains("Week 1: Basics")));
}

#[test]
fn committing_the_plan_away_clears_week_and_expansion_state() {
    let (mut app, remote) = test_app();
    remote.emit(snapshot(json!({
        "learning_plan": two_week_plan()["learning_plan"].clone(),
        "search_results": [{ "query": "rust", "results": [] }]
    })));
    app.pump_channel(Instant::now());
    app.toggle_expanded("search:0");
    assert_eq!(app.weeks.active(), Some(1));

    app.toggle_edit();
    replace_draft(&mut app, "{}");
    app.save_draft();
    assert_eq!(app.weeks.active(), None);
    assert!(app.expanded.is_empty());
}

#[test]
fn closing_an_edit_restores_the_previous_tab() {
    let (mut app, _remote) = test_app();
    assert_eq!(app.state_tab(), StateTab::Visual);

    app.toggle_edit();
    assert_eq!(app.state_tab(), StateTab::Json);
    app.cancel();
    assert_eq!(app.state_tab(), StateTab::Visual);

    app.toggle_edit();
    app.toggle_edit();
    assert_eq!(app.state_tab(), StateTab::Visual);

    app.toggle_edit();
    replace_draft(&mut app, r#"{"notes": 1}"#);
    app.save_draft();
    assert_eq!(app.state_tab(), StateTab::Visual);

    app.toggle_tab();
    app.toggle_edit();
    app.cancel();
    assert_eq!(app.state_tab(), StateTab::Json);
}

#[test]
fn failed_save_keeps_the_json_tab() {
    let (mut app, _remote) = test_app();
    app.toggle_edit();
    replace_draft(&mut app, "not json");
    app.save_draft();
    assert!(app.is_editing());
    assert_eq!(app.state_tab(), StateTab::Json);
}

#[cfg(unix)]
#[test]
fn dropping_the_app_cancels_an_open_interrupt_on_the_bridge() {
    let out = std::env::temp_dir().join(format!(
        "coagent-canvas-teardown-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    ));
    let config = crate::config::AgentConfig {
        program: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            r#"echo '{"type":"INTERRUPT","id":"i1","value":"q"}'; exec cat > "$0""#.to_string(),
            out.display().to_string(),
        ],
        ..crate::config::AgentConfig::default()
    };
    let channel = StateChannel::connect(&config).expect("sh should start");
    let mut app = App::new(
        channel,
        AppOptions {
            interrupt_timeout: None,
            export_dir: std::env::temp_dir(),
        },
    )
    .expect("app should build");

    let deadline = Instant::now() + Duration::from_secs(5);
    while app.interrupt_prompt().is_none() && Instant::now() < deadline {
        app.pump_channel(Instant::now());
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(app.interrupt_prompt().is_some(), "bridge never raised the interrupt");

    drop(app);
    let received = std::fs::read_to_string(&out).unwrap_or_default();
    let _ = std::fs::remove_file(&out);
    let lines: Vec<serde_json::Value> = received
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();
    assert_eq!(
        lines,
        vec![json!({ "type": "INTERRUPT_RESOLUTION", "id": "i1", "outcome": { "kind": "cancelled" } })],
        "bridge received: {received:?}"
    );
}
