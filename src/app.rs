use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{info, warn};

use crate::channel::{AgentEvent, ChannelError, ChannelEvent, StateChannel};
use crate::draft::{DraftEditor, DraftError};
use crate::export::{self, ExportKind};
use crate::interrupt::InterruptGate;
use crate::state::AgentState;
use crate::text_layout::EditBuffer;
use crate::tool_calls::{IngestOutcome, ToolInvocationTracker, ToolUpdate};
use crate::view::{json_view, toggle_keys, visual_view, PaneBlockView, StateTab, WeekSelection};

pub const GREETING: &str = "Hi! what would you like to learn today?";
pub const MAX_CHANNEL_EVENTS_PER_LOOP: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Chat,
    State,
}

#[derive(Debug, Clone)]
pub struct AppOptions {
    pub interrupt_timeout: Option<Duration>,
    pub export_dir: PathBuf,
}

/// One-line feedback for the status bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChatEntry {
    Message(String),
    Tool(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StreamingMessage {
    message_id: Option<String>,
    entry: usize,
}

pub struct App {
    pub running: bool,
    pub ticks: u64,
    pub active_pane: Pane,
    channel: StateChannel,
    draft: DraftEditor,
    tools: ToolInvocationTracker,
    gate: InterruptGate,
    chat_entries: Vec<ChatEntry>,
    streaming: Option<StreamingMessage>,
    chat_input: EditBuffer,
    chat_scroll: u16,
    chat_follow: bool,
    state_scroll: u16,
    tab: StateTab,
    tab_before_edit: Option<StateTab>,
    weeks: WeekSelection,
    expanded: HashSet<String>,
    stalled: bool,
    notice: Option<Notice>,
    export_dir: PathBuf,
}

impl App {
    pub fn new(mut channel: StateChannel, options: AppOptions) -> Result<Self, ChannelError> {
        let publisher = channel.take_publisher().ok_or(ChannelError::PublisherTaken)?;
        let subscription = channel.subscribe();
        let draft = DraftEditor::new(publisher, &subscription.state);
        let gate = InterruptGate::new(channel.interrupt_resolver(), options.interrupt_timeout);
        let mut weeks = WeekSelection::default();
        weeks.reconcile(subscription.state.learning_plan());
        Ok(Self {
            running: true,
            ticks: 0,
            active_pane: Pane::Chat,
            channel,
            draft,
            tools: ToolInvocationTracker::default(),
            gate,
            chat_entries: vec![ChatEntry::Message(format!("Agent: {GREETING}"))],
            streaming: None,
            chat_input: EditBuffer::default(),
            chat_scroll: 0,
            chat_follow: true,
            state_scroll: 0,
            tab: StateTab::default(),
            tab_before_edit: None,
            weeks,
            expanded: HashSet::new(),
            stalled: false,
            notice: None,
            export_dir: options.export_dir,
        })
    }

    pub fn on_tick(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }

    pub fn quit(&mut self) {
        self.running = false;
    }

    /// Drain pending channel events, then check the interrupt timeout and the stall clock.
    pub fn pump_channel(&mut self, now: Instant) -> usize {
        let events = self.channel.drain_events_limited(MAX_CHANNEL_EVENTS_PER_LOOP);
        let count = events.len();
        for event in events {
            self.on_channel_event(event, now);
        }
        if self.gate.poll_timeout(now) {
            self.push_message("System: No answer was given in time; the agent was told to continue without one.");
        }
        self.stalled = self.channel.is_stalled(now);
        if !self.show_state_pane() {
            self.active_pane = Pane::Chat;
        }
        count
    }

    fn on_channel_event(&mut self, event: ChannelEvent, now: Instant) {
        match event {
            ChannelEvent::Agent(AgentEvent::StateSnapshot { snapshot, .. }) => {
                self.draft.on_snapshot(&snapshot);
                reconcile_view_state(&mut self.weeks, &mut self.expanded, &snapshot);
            }
            ChannelEvent::Agent(AgentEvent::RunStarted { .. })
            | ChannelEvent::Agent(AgentEvent::RunFinished { .. }) => {
                self.streaming = None;
            }
            ChannelEvent::Agent(AgentEvent::RunError { message }) => {
                self.streaming = None;
                self.push_message(format!("System: Agent run failed: {message}"));
            }
            ChannelEvent::Agent(AgentEvent::TextMessageContent { message_id, delta }) => {
                self.append_agent_text(message_id, &delta);
            }
            ChannelEvent::Agent(AgentEvent::ToolCallUpdate {
                tool_call_id,
                tool_call_name,
                args,
                status,
                result,
            }) => {
                let id = tool_call_id.clone();
                let outcome = self.tools.ingest(ToolUpdate {
                    id: tool_call_id,
                    name: tool_call_name,
                    args,
                    status,
                    result,
                });
                if outcome == IngestOutcome::Created {
                    self.chat_entries.push(ChatEntry::Tool(id));
                    self.streaming = None;
                }
            }
            ChannelEvent::Agent(AgentEvent::Interrupt { id, value }) => {
                match self.gate.open(id, value, now) {
                    Ok(()) => self.push_message(
                        "System: The agent is waiting for your answer. Type it below and press Enter (Esc to decline).",
                    ),
                    Err(err) => {
                        warn!(%err, "second interrupt rejected");
                        self.push_message(format!("System: {err}"));
                    }
                }
            }
            ChannelEvent::System(message) => self.push_message(format!("System: {message}")),
            ChannelEvent::Disconnected { code } => {
                self.streaming = None;
                let suffix = code.map(|code| format!(" (exit code {code})")).unwrap_or_default();
                self.push_message(format!("System: Agent bridge disconnected{suffix}."));
            }
        }
    }

    fn append_agent_text(&mut self, message_id: Option<String>, delta: &str) {
        if let Some(streaming) = self.streaming.as_ref()
            && streaming.message_id == message_id
            && let Some(ChatEntry::Message(text)) = self.chat_entries.get_mut(streaming.entry)
        {
            text.push_str(delta);
            return;
        }
        self.chat_entries
            .push(ChatEntry::Message(format!("Agent: {delta}")));
        self.streaming = Some(StreamingMessage {
            message_id,
            entry: self.chat_entries.len() - 1,
        });
    }

    pub fn push_message(&mut self, message: impl Into<String>) {
        self.chat_entries.push(ChatEntry::Message(message.into()));
    }

    /// Chat history as display strings. Tool invocations render as status chips.
    pub fn chat_messages(&self) -> Vec<String> {
        let selected = self.tools.selected().map(|invocation| invocation.id.as_str());
        self.chat_entries
            .iter()
            .map(|entry| match entry {
                ChatEntry::Message(text) => text.clone(),
                ChatEntry::Tool(id) => {
                    let Some(invocation) = self.tools.get(id) else {
                        return format!("Tool: {id}");
                    };
                    let mut chip = format!(
                        "Tool: {} {} {}",
                        invocation.kind.glyph(),
                        invocation.label(),
                        invocation.status.glyph(self.ticks as usize)
                    );
                    if selected == Some(id.as_str()) {
                        for line in invocation.detail_lines() {
                            chip.push('\n');
                            chip.push_str(&line);
                        }
                    }
                    chip
                }
            })
            .collect()
    }

    pub fn next_pane(&mut self) {
        self.active_pane = match self.active_pane {
            Pane::Chat if self.show_state_pane() => Pane::State,
            _ => Pane::Chat,
        };
    }

    pub fn prev_pane(&mut self) {
        self.next_pane();
    }

    pub fn show_state_pane(&self) -> bool {
        self.channel.is_running() || self.draft.is_editing()
    }

    pub fn input_char(&mut self, c: char) {
        match self.active_pane {
            Pane::Chat => self.chat_input.insert_char(c),
            Pane::State if self.draft.is_editing() => self.draft.input_char(c),
            Pane::State => match c {
                '[' => self.previous_week(),
                ']' => self.next_week(),
                _ => {}
            },
        }
    }

    pub fn backspace(&mut self) {
        match self.active_pane {
            Pane::Chat => {
                self.chat_input.backspace();
            }
            Pane::State => self.draft.backspace(),
        }
    }

    pub fn move_cursor_left(&mut self) {
        match self.active_pane {
            Pane::Chat => self.chat_input.move_left(),
            Pane::State => self.draft.move_cursor_left(),
        }
    }

    pub fn move_cursor_right(&mut self) {
        match self.active_pane {
            Pane::Chat => self.chat_input.move_right(),
            Pane::State => self.draft.move_cursor_right(),
        }
    }

    /// Up arrow: input cursor in the chat pane, draft cursor while editing, scroll otherwise.
    pub fn move_up(&mut self, text_width: u16) {
        match self.active_pane {
            Pane::Chat => self.chat_input.move_up(text_width),
            Pane::State if self.draft.is_editing() => self.draft.move_cursor_up(text_width),
            Pane::State => self.scroll_state_up(),
        }
    }

    pub fn move_down(&mut self, text_width: u16, state_max_scroll: u16) {
        match self.active_pane {
            Pane::Chat => self.chat_input.move_down(text_width),
            Pane::State if self.draft.is_editing() => self.draft.move_cursor_down(text_width),
            Pane::State => self.scroll_state_down(state_max_scroll),
        }
    }

    /// Enter. Answers the outstanding interrupt if there is one, otherwise sends a chat message.
    pub fn submit(&mut self) {
        if self.active_pane == Pane::State {
            if self.draft.is_editing() {
                self.draft.input_newline();
            }
            return;
        }
        let message = self.chat_input.text().trim().to_string();
        if message.is_empty() {
            return;
        }
        self.chat_input.clear();
        self.send_user_message(message);
    }

    pub fn send_user_message(&mut self, message: String) {
        self.push_message(format!("You: {message}"));
        self.chat_follow = true;
        self.streaming = None;
        if self.gate.is_awaiting() {
            self.gate.resolve(Value::String(message));
            return;
        }
        self.channel.send_message(message);
    }

    pub fn toggle_edit(&mut self) {
        if self.draft.is_editing() {
            self.draft.discard();
            self.restore_tab_after_edit();
            self.set_notice("Edit discarded.", false);
            return;
        }
        self.draft.begin_edit();
        self.tab_before_edit = Some(self.tab);
        self.tab = StateTab::Json;
        self.active_pane = Pane::State;
        self.set_notice("Editing agent state. Ctrl+S saves, Esc discards.", false);
    }

    pub fn save_draft(&mut self) {
        match self.draft.commit(&mut self.channel) {
            Ok(()) => {
                info!("draft committed");
                reconcile_view_state(&mut self.weeks, &mut self.expanded, self.channel.state());
                self.restore_tab_after_edit();
                self.set_notice("State saved.", false);
            }
            Err(DraftError::NotEditing) => {
                self.set_notice("Press Ctrl+E to edit the agent state first.", true);
            }
            Err(err) => self.set_notice(err.to_string(), true),
        }
    }

    /// Esc: discard an open edit, else decline the interrupt, else close the tool detail.
    pub fn cancel(&mut self) {
        if self.draft.is_editing() {
            self.draft.discard();
            self.restore_tab_after_edit();
            self.set_notice("Edit discarded.", false);
            return;
        }
        if self.gate.is_awaiting() {
            self.gate.cancel();
            self.push_message("System: You declined to answer; the agent was told to continue.");
            return;
        }
        self.tools.clear_selection();
        self.notice = None;
    }

    pub fn toggle_tab(&mut self) {
        if self.draft.is_editing() {
            return;
        }
        self.tab = self.tab.toggled();
        self.state_scroll = 0;
    }

    pub fn export(&mut self, kind: ExportKind) {
        match export::export_to_dir(kind, self.channel.state(), &self.export_dir) {
            Ok(path) => {
                info!(path = %path.display(), "export written");
                self.set_notice(format!("Exported to {}", path.display()), false);
            }
            Err(err) => {
                warn!(%err, "export failed");
                self.set_notice(format!("Export failed: {err}"), true);
            }
        }
    }

    pub fn cycle_tool_detail(&mut self) {
        self.tools.cycle_selection();
    }

    pub fn next_week(&mut self) {
        if self.weeks.next(self.channel.state().learning_plan()) {
            self.state_scroll = 0;
        }
    }

    pub fn previous_week(&mut self) {
        if self.weeks.previous(self.channel.state().learning_plan()) {
            self.state_scroll = 0;
        }
    }

    pub fn select_week(&mut self, week: usize) {
        self.weeks.select(week, self.channel.state().learning_plan());
    }

    pub fn toggle_expanded(&mut self, key: &str) {
        if !self.expanded.remove(key) {
            self.expanded.insert(key.to_string());
        }
    }

    pub fn scroll_chat_up(&mut self, max_scroll: u16) {
        self.chat_scroll = self.chat_scroll_offset(max_scroll).saturating_sub(1);
        self.chat_follow = false;
    }

    pub fn scroll_chat_down(&mut self, max_scroll: u16) {
        self.chat_scroll = self
            .chat_scroll_offset(max_scroll)
            .saturating_add(1)
            .min(max_scroll);
        self.chat_follow = self.chat_scroll >= max_scroll;
    }

    /// The chat scroll actually shown, pinned to the bottom until the user scrolls up.
    pub fn chat_scroll_offset(&self, max_scroll: u16) -> u16 {
        if self.chat_follow {
            max_scroll
        } else {
            self.chat_scroll.min(max_scroll)
        }
    }

    pub fn scroll_state_up(&mut self) {
        self.state_scroll = self.state_scroll.saturating_sub(1);
    }

    pub fn scroll_state_down(&mut self, max_scroll: u16) {
        self.state_scroll = (self.state_scroll + 1).min(max_scroll);
    }

    pub fn state_scroll(&self) -> u16 {
        self.state_scroll
    }

    pub fn state_tab(&self) -> StateTab {
        self.tab
    }

    /// Visual panels from the live document, or the draft text on the JSON tab.
    pub fn state_view(&self, width: u16) -> PaneBlockView {
        match self.tab {
            StateTab::Visual => {
                visual_view(self.channel.state(), &self.weeks, &self.expanded, width)
            }
            StateTab::Json => json_view(self.draft.text(), width),
        }
    }

    pub fn chat_input(&self) -> &str {
        self.chat_input.text()
    }

    pub fn chat_cursor_line_col(&self, width: u16) -> (u16, u16) {
        self.chat_input.cursor_line_col(width)
    }

    pub fn is_editing(&self) -> bool {
        self.draft.is_editing()
    }

    pub fn is_draft_dirty(&self) -> bool {
        self.draft.is_dirty()
    }

    /// The agent pushed a new document while the draft was open.
    pub fn has_pending_agent_update(&self) -> bool {
        self.draft.has_pending_snapshot()
    }

    pub fn draft_cursor_line_col(&self, width: u16) -> (u16, u16) {
        self.draft.cursor_line_col(width)
    }

    pub fn draft_error(&self) -> Option<&DraftError> {
        self.draft.last_error()
    }

    pub fn is_agent_running(&self) -> bool {
        self.channel.is_running()
    }

    pub fn is_agent_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub fn interrupt_prompt(&self) -> Option<String> {
        self.gate.pending().map(|pending| pending.prompt())
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    fn restore_tab_after_edit(&mut self) {
        if let Some(tab) = self.tab_before_edit.take() {
            self.tab = tab;
            self.state_scroll = 0;
        }
    }

    fn set_notice(&mut self, text: impl Into<String>, is_error: bool) {
        self.notice = Some(Notice {
            text: text.into(),
            is_error,
        });
    }
}

impl Drop for App {
    fn drop(&mut self) {
        // The channel field shuts the bridge down, so the cancellation has to be queued first.
        self.gate.cancel();
    }
}

/// Week selection and expanded groups follow whatever document is now current.
fn reconcile_view_state(
    weeks: &mut WeekSelection,
    expanded: &mut HashSet<String>,
    state: &AgentState,
) {
    weeks.reconcile(state.learning_plan());
    let keys = toggle_keys(state);
    expanded.retain(|key| keys.contains(key));
}

#[cfg(test)]
#[path = "../tests/unit/app_tests.rs"]
mod tests;
