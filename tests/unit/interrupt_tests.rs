use super::*;
use crate::channel::{AgentCommand, StateChannel};
use serde_json::json;

fn resolutions(commands: Vec<AgentCommand>) -> Vec<(String, InterruptOutcome)> {
    commands
        .into_iter()
        .filter_map(|command| match command {
            AgentCommand::InterruptResolution { id, outcome } => Some((id, outcome)),
            _ => None,
        })
        .collect()
}

#[test]
fn resolve_sends_exactly_once() {
    let (channel, remote) = StateChannel::in_memory(None);
    let mut gate = InterruptGate::new(channel.interrupt_resolver(), None);
    let now = Instant::now();
    gate.open("int-1".to_string(), json!({ "question": "Proceed?" }), now)
        .expect("first interrupt opens");
    assert!(gate.is_awaiting());

    assert!(gate.resolve(json!("yes")));
    assert!(!gate.resolve(json!("again")));
    assert_eq!(gate.state(), GateState::Resolved);

    assert_eq!(
        resolutions(remote.sent_commands()),
        vec![(
            "int-1".to_string(),
            InterruptOutcome::Resolved(json!("yes"))
        )]
    );
}

#[test]
fn second_interrupt_is_rejected_while_one_is_outstanding() {
    let (channel, _remote) = StateChannel::in_memory(None);
    let mut gate = InterruptGate::new(channel.interrupt_resolver(), None);
    let now = Instant::now();
    gate.open("a".to_string(), json!(null), now).expect("opens");

    let err = gate
        .open("b".to_string(), json!(null), now)
        .expect_err("second interrupt rejected");
    assert_eq!(
        err,
        InterruptError::AlreadyOutstanding {
            outstanding: "a".to_string(),
            incoming: "b".to_string(),
        }
    );
    assert_eq!(gate.pending().map(|p| p.id.as_str()), Some("a"));
}

#[test]
fn gate_accepts_next_interrupt_after_resolution() {
    let (channel, _remote) = StateChannel::in_memory(None);
    let mut gate = InterruptGate::new(channel.interrupt_resolver(), None);
    let now = Instant::now();
    gate.open("a".to_string(), json!(null), now).expect("opens");
    gate.resolve(json!(true));
    gate.open("b".to_string(), json!(null), now)
        .expect("gate reopens after resolution");
    assert!(gate.is_awaiting());
}

#[test]
fn poll_timeout_times_out_after_configured_wait() {
    let (channel, remote) = StateChannel::in_memory(None);
    let mut gate = InterruptGate::new(channel.interrupt_resolver(), Some(Duration::from_secs(5)));
    let opened = Instant::now();
    gate.open("slow".to_string(), json!({}), opened).expect("opens");

    assert!(!gate.poll_timeout(opened + Duration::from_secs(4)));
    assert!(gate.poll_timeout(opened + Duration::from_secs(5)));
    assert!(!gate.poll_timeout(opened + Duration::from_secs(9)));

    assert_eq!(
        resolutions(remote.sent_commands()),
        vec![("slow".to_string(), InterruptOutcome::TimedOut)]
    );
}

#[test]
fn no_timeout_configured_never_expires() {
    let (channel, _remote) = StateChannel::in_memory(None);
    let mut gate = InterruptGate::new(channel.interrupt_resolver(), None);
    let opened = Instant::now();
    gate.open("q".to_string(), json!({}), opened).expect("opens");
    assert!(!gate.poll_timeout(opened + Duration::from_secs(3600)));
    assert!(gate.is_awaiting());
}

#[test]
fn dropping_an_awaiting_gate_cancels_upstream() {
    let (channel, remote) = StateChannel::in_memory(None);
    {
        let mut gate = InterruptGate::new(channel.interrupt_resolver(), None);
        gate.open("left".to_string(), json!({}), Instant::now())
            .expect("opens");
    }
    assert_eq!(
        resolutions(remote.sent_commands()),
        vec![("left".to_string(), InterruptOutcome::Cancelled)]
    );
}

#[test]
fn dropping_an_idle_gate_sends_nothing() {
    let (channel, remote) = StateChannel::in_memory(None);
    drop(InterruptGate::new(channel.interrupt_resolver(), None));
    assert!(remote.sent_commands().is_empty());
}

#[test]
fn resolution_on_closed_channel_still_closes_the_gate() {
    let channel = StateChannel::detached();
    let mut gate = InterruptGate::new(channel.interrupt_resolver(), None);
    gate.open("x".to_string(), json!({}), Instant::now())
        .expect("opens");
    assert!(gate.resolve(json!("ok")));
    assert!(!gate.is_awaiting());
}

#[test]
fn prompt_prefers_question_text() {
    let pending = PendingInterrupt {
        id: "p".to_string(),
        payload: json!({ "question": "Approve plan?", "options": ["yes", "no"] }),
        opened_at: Instant::now(),
    };
    assert_eq!(pending.prompt(), "Approve plan?");

    let raw = PendingInterrupt {
        payload: json!({ "options": ["yes"] }),
        ..pending
    };
    assert!(raw.prompt().contains("\"options\""));
}

#[test]
fn outcome_wire_format_is_tagged() {
    let encoded = serde_json::to_value(InterruptOutcome::Resolved(json!("go"))).expect("encode");
    assert_eq!(encoded, json!({ "kind": "resolved", "value": "go" }));
    let cancelled = serde_json::to_value(InterruptOutcome::Cancelled).expect("encode");
    assert_eq!(cancelled, json!({ "kind": "cancelled" }));
}
