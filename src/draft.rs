use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::channel::{StateChannel, StatePublisher};
use crate::state::AgentState;
use crate::text_layout::EditBuffer;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("Invalid JSON format. Please check your input. {0}")]
    MalformedDraftFormat(String),
    #[error("no edit session is open")]
    NotEditing,
}

/// Editable JSON projection of the agent state.
///
/// Holds the only [`StatePublisher`], so every write to the shared document goes through
/// [`DraftEditor::commit`]. While a session is open and dirty, snapshots are parked instead of
/// replacing the user's text.
#[derive(Debug)]
pub struct DraftEditor {
    publisher: StatePublisher,
    buffer: EditBuffer,
    last_good: String,
    editing: bool,
    dirty: bool,
    pending_snapshot: Option<AgentState>,
    last_error: Option<DraftError>,
}

impl DraftEditor {
    pub fn new(publisher: StatePublisher, initial: &AgentState) -> Self {
        let last_good = initial.editable_json();
        let mut buffer = EditBuffer::default();
        buffer.set_text(last_good.clone());
        Self {
            publisher,
            buffer,
            last_good,
            editing: false,
            dirty: false,
            pending_snapshot: None,
            last_error: None,
        }
    }

    pub fn text(&self) -> &str {
        self.buffer.text()
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn has_pending_snapshot(&self) -> bool {
        self.pending_snapshot.is_some()
    }

    pub fn last_error(&self) -> Option<&DraftError> {
        self.last_error.as_ref()
    }

    pub fn cursor_line_col(&self, width: u16) -> (u16, u16) {
        self.buffer.cursor_line_col(width)
    }

    /// Open the edit session. Already open is fine.
    pub fn begin_edit(&mut self) {
        if self.editing {
            return;
        }
        self.editing = true;
        self.last_error = None;
    }

    pub fn input_char(&mut self, c: char) {
        if !self.editing {
            return;
        }
        self.buffer.insert_char(c);
        self.dirty = true;
    }

    pub fn input_newline(&mut self) {
        self.input_char('\n');
    }

    pub fn backspace(&mut self) {
        if self.editing && self.buffer.backspace() {
            self.dirty = true;
        }
    }

    pub fn move_cursor_left(&mut self) {
        self.buffer.move_left();
    }

    pub fn move_cursor_right(&mut self) {
        self.buffer.move_right();
    }

    pub fn move_cursor_up(&mut self, width: u16) {
        self.buffer.move_up(width);
    }

    pub fn move_cursor_down(&mut self, width: u16) {
        self.buffer.move_down(width);
    }

    /// Parse the draft and publish it with the reserved fields of the current document.
    ///
    /// On a parse failure nothing is published, the session stays open and the text is kept.
    pub fn commit(&mut self, channel: &mut StateChannel) -> Result<(), DraftError> {
        if !self.editing {
            return Err(DraftError::NotEditing);
        }
        let parsed = match parse_draft(self.buffer.text()) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(%err, "draft rejected");
                self.last_error = Some(err.clone());
                return Err(err);
            }
        };
        let merged = parsed.with_reserved_from(channel.state());
        channel.publish(&self.publisher, merged.clone());
        info!("agent state overwritten from draft");

        self.last_good = merged.editable_json();
        self.buffer.set_text(self.last_good.clone());
        self.pending_snapshot = None;
        self.close_clean();
        Ok(())
    }

    /// Drop local edits and close the session. A snapshot parked during the edit is applied now.
    pub fn discard(&mut self) {
        if let Some(snapshot) = self.pending_snapshot.take() {
            self.last_good = snapshot.editable_json();
        }
        self.buffer.set_text(self.last_good.clone());
        self.close_clean();
    }

    /// Follow the channel unless the user has unsaved text.
    pub fn on_snapshot(&mut self, state: &AgentState) {
        if self.editing && self.dirty {
            debug!("snapshot held back while draft has unsaved edits");
            self.pending_snapshot = Some(state.clone());
            return;
        }
        self.last_good = state.editable_json();
        self.buffer.set_text(self.last_good.clone());
    }

    fn close_clean(&mut self) {
        self.editing = false;
        self.dirty = false;
        self.last_error = None;
    }
}

/// Draft text back to a document. Anything but a JSON object matching the known field shapes is
/// malformed.
pub fn parse_draft(text: &str) -> Result<AgentState, DraftError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| DraftError::MalformedDraftFormat(err.to_string()))?;
    if !value.is_object() {
        return Err(DraftError::MalformedDraftFormat(
            "the state must be a JSON object".to_string(),
        ));
    }
    AgentState::from_value(value).map_err(|err| DraftError::MalformedDraftFormat(err.to_string()))
}

#[cfg(test)]
#[path = "../tests/unit/draft_tests.rs"]
mod tests;
