use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

const SPINNER_FRAMES: [&str; 4] = ["◐", "◓", "◑", "◒"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolKind {
    WebResearch,
    SearchWeb,
    UpdateCanvas,
    Generic(String),
}

impl ToolKind {
    pub fn classify(name: &str) -> Self {
        match name {
            "web_research" => Self::WebResearch,
            "search_web" => Self::SearchWeb,
            "update_learning_plan_canvas" => Self::UpdateCanvas,
            other => Self::Generic(other.to_string()),
        }
    }

    /// Friendly label for the chip, in the tense that matches `status`.
    pub fn label(&self, status: &ToolStatus) -> String {
        let (done, active, idle) = match self {
            Self::WebResearch => ("Web Search Complete", "Searching Web", "Web Search"),
            Self::SearchWeb => ("Search Complete", "Searching Web", "Web Search"),
            Self::UpdateCanvas => ("Canvas Updated", "Updating Canvas", "Update Canvas"),
            Self::Generic(name) => return name.clone(),
        };
        match status.stage() {
            2 => done,
            1 => active,
            _ => idle,
        }
        .to_string()
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            Self::WebResearch => "◍",
            Self::SearchWeb => "⌕",
            Self::UpdateCanvas => "↝",
            Self::Generic(name) if name.contains("database") => "⛁",
            Self::Generic(name) if name.contains("code") => "</>",
            Self::Generic(name) if name.contains("ai") => "✦",
            Self::Generic(_) => "⚒",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    Pending,
    InProgress,
    Executing,
    Complete,
    Unknown(String),
}

impl ToolStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pending" => Self::Pending,
            "inProgress" => Self::InProgress,
            "executing" => Self::Executing,
            "complete" => Self::Complete,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "inProgress",
            Self::Executing => "executing",
            Self::Complete => "complete",
            Self::Unknown(raw) => raw,
        }
    }

    /// Position in the lifecycle. `inProgress` and `executing` share a stage.
    pub fn stage(&self) -> u8 {
        match self {
            Self::Pending | Self::Unknown(_) => 0,
            Self::InProgress | Self::Executing => 1,
            Self::Complete => 2,
        }
    }

    pub fn glyph(&self, tick: usize) -> &'static str {
        match self {
            Self::InProgress => SPINNER_FRAMES[tick % SPINNER_FRAMES.len()],
            Self::Executing | Self::Complete => "✓",
            Self::Pending | Self::Unknown(_) => "?",
        }
    }
}

/// One update as it arrives from the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUpdate {
    pub id: String,
    pub name: String,
    pub args: Value,
    pub status: String,
    pub result: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub status: ToolStatus,
    /// `false` for updates older than the displayed stage.
    pub applied: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub kind: ToolKind,
    pub args: Value,
    pub status: ToolStatus,
    pub result: Option<Value>,
    pub history: Vec<StatusChange>,
}

impl ToolInvocation {
    pub fn label(&self) -> String {
        self.kind.label(&self.status)
    }

    pub fn detail_lines(&self) -> Vec<String> {
        let mut lines = vec!["Tool:".to_string(), format!("  {}", self.name)];
        lines.push("Arguments:".to_string());
        lines.extend(pretty_lines(&self.args));
        lines.push("Status:".to_string());
        lines.push(format!("  {}", self.status.as_str()));
        if let Some(result) = self.result.as_ref().filter(|result| !result.is_null()) {
            lines.push("Result:".to_string());
            lines.extend(pretty_lines(result));
        }
        lines
    }
}

fn pretty_lines(value: &Value) -> Vec<String> {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|_| value.to_string())
        .lines()
        .map(|line| format!("  {line}"))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Created,
    Updated,
    OutOfOrder,
}

/// Invocations in first-seen order, keyed by id.
#[derive(Debug, Default)]
pub struct ToolInvocationTracker {
    invocations: Vec<ToolInvocation>,
    index: HashMap<String, usize>,
    selected: Option<usize>,
}

impl ToolInvocationTracker {
    pub fn ingest(&mut self, update: ToolUpdate) -> IngestOutcome {
        let status = ToolStatus::parse(&update.status);
        let Some(&idx) = self.index.get(&update.id) else {
            self.index.insert(update.id.clone(), self.invocations.len());
            self.invocations.push(ToolInvocation {
                kind: ToolKind::classify(&update.name),
                id: update.id,
                name: update.name,
                args: update.args,
                history: vec![StatusChange {
                    status: status.clone(),
                    applied: true,
                }],
                status,
                result: update.result,
            });
            return IngestOutcome::Created;
        };

        let invocation = &mut self.invocations[idx];
        if status.stage() < invocation.status.stage() {
            debug!(
                id = %invocation.id,
                displayed = invocation.status.as_str(),
                incoming = status.as_str(),
                "out-of-order tool status update"
            );
            invocation.history.push(StatusChange {
                status,
                applied: false,
            });
            return IngestOutcome::OutOfOrder;
        }

        invocation.history.push(StatusChange {
            status: status.clone(),
            applied: true,
        });
        invocation.status = status;
        if !update.args.is_null() {
            invocation.args = update.args;
        }
        if update.result.is_some() {
            invocation.result = update.result;
        }
        IngestOutcome::Updated
    }

    pub fn get(&self, id: &str) -> Option<&ToolInvocation> {
        self.index.get(id).map(|&idx| &self.invocations[idx])
    }

    pub fn selected(&self) -> Option<&ToolInvocation> {
        self.selected.and_then(|idx| self.invocations.get(idx))
    }

    /// Step the detail view through the invocations, then back to none.
    pub fn cycle_selection(&mut self) {
        self.selected = match self.selected {
            None if !self.invocations.is_empty() => Some(0),
            Some(idx) if idx + 1 < self.invocations.len() => Some(idx + 1),
            _ => None,
        };
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }
}

#[cfg(test)]
#[path = "../tests/unit/tool_calls_tests.rs"]
mod tests;
