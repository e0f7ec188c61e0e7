use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::channel::InterruptResolver;

/// How an interrupt ended, as reported upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum InterruptOutcome {
    Resolved(Value),
    Cancelled,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterruptError {
    #[error("interrupt `{incoming}` ignored: `{outstanding}` is still waiting for an answer")]
    AlreadyOutstanding {
        outstanding: String,
        incoming: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    AwaitingResolution,
    Resolved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingInterrupt {
    pub id: String,
    pub payload: Value,
    pub opened_at: Instant,
}

impl PendingInterrupt {
    /// Text shown to the user. Questions posed as `{"question": ...}` or `{"message": ...}` show
    /// just the prompt; anything else shows as JSON.
    pub fn prompt(&self) -> String {
        match &self.payload {
            Value::String(text) => text.clone(),
            Value::Object(map) => ["question", "message", "prompt"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(ToString::to_string)
                .unwrap_or_else(|| pretty(&self.payload)),
            Value::Null => "The agent is waiting for your input.".to_string(),
            other => pretty(other),
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Holds at most one outstanding interrupt and answers it exactly once.
pub struct InterruptGate {
    resolver: InterruptResolver,
    timeout: Option<Duration>,
    state: GateState,
    pending: Option<PendingInterrupt>,
}

impl InterruptGate {
    pub fn new(resolver: InterruptResolver, timeout: Option<Duration>) -> Self {
        Self {
            resolver,
            timeout,
            state: GateState::Idle,
            pending: None,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_awaiting(&self) -> bool {
        self.state == GateState::AwaitingResolution
    }

    pub fn pending(&self) -> Option<&PendingInterrupt> {
        self.pending.as_ref()
    }

    pub fn open(&mut self, id: String, payload: Value, now: Instant) -> Result<(), InterruptError> {
        if let Some(outstanding) = self.pending.as_ref() {
            warn!(outstanding = %outstanding.id, incoming = %id, "interrupt rejected");
            return Err(InterruptError::AlreadyOutstanding {
                outstanding: outstanding.id.clone(),
                incoming: id,
            });
        }
        info!(%id, "interrupt awaiting resolution");
        self.pending = Some(PendingInterrupt {
            id,
            payload,
            opened_at: now,
        });
        self.state = GateState::AwaitingResolution;
        Ok(())
    }

    /// Answer the outstanding interrupt. `false` when there is nothing left to answer.
    pub fn resolve(&mut self, payload: Value) -> bool {
        self.finish(InterruptOutcome::Resolved(payload))
    }

    pub fn cancel(&mut self) -> bool {
        self.finish(InterruptOutcome::Cancelled)
    }

    /// Time out the outstanding interrupt once the configured wait has passed.
    pub fn poll_timeout(&mut self, now: Instant) -> bool {
        let Some(timeout) = self.timeout else {
            return false;
        };
        let expired = self
            .pending
            .as_ref()
            .is_some_and(|pending| now.saturating_duration_since(pending.opened_at) >= timeout);
        expired && self.finish(InterruptOutcome::TimedOut)
    }

    fn finish(&mut self, outcome: InterruptOutcome) -> bool {
        let Some(pending) = self.pending.take() else {
            debug!(?outcome, "no outstanding interrupt to finish");
            return false;
        };
        self.state = GateState::Resolved;
        info!(id = %pending.id, ?outcome, "interrupt finished");
        if let Err(err) = self.resolver.send_resolution(&pending.id, outcome) {
            warn!(id = %pending.id, %err, "interrupt resolution not delivered");
        }
        true
    }
}

impl Drop for InterruptGate {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
#[path = "../tests/unit/interrupt_tests.rs"]
mod tests;
