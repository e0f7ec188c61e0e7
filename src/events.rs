use std::io;
use std::time::Duration;

use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEventKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Tick,
    Quit,
    NextPane,
    PrevPane,
    MoveUp,
    MoveDown,
    CursorLeft,
    CursorRight,
    ScrollChatUp,
    ScrollChatDown,
    ScrollStateUp,
    ScrollStateDown,
    InputChar(char),
    Backspace,
    Submit,
    ToggleEdit,
    SaveDraft,
    Cancel,
    ToggleTab,
    ExportPlan,
    ExportSearch,
    CycleToolDetail,
    MouseScrollUp,
    MouseScrollDown,
    MouseLeftClick(u16, u16),
}

fn ctrl_binding(code: KeyCode) -> Option<AppEvent> {
    let KeyCode::Char(c) = code else {
        return None;
    };
    match c {
        'c' => Some(AppEvent::Quit),
        'e' => Some(AppEvent::ToggleEdit),
        's' => Some(AppEvent::SaveDraft),
        't' => Some(AppEvent::ToggleTab),
        'p' => Some(AppEvent::ExportPlan),
        'r' => Some(AppEvent::ExportSearch),
        'o' => Some(AppEvent::CycleToolDetail),
        'u' => Some(AppEvent::ScrollStateUp),
        'd' => Some(AppEvent::ScrollStateDown),
        _ => None,
    }
}

fn map_key_event(key_event: KeyEvent) -> AppEvent {
    if key_event.kind != KeyEventKind::Press {
        return AppEvent::Tick;
    }

    if key_event.modifiers.contains(KeyModifiers::CONTROL)
        && let Some(event) = ctrl_binding(key_event.code)
    {
        return event;
    }

    let scroll_modifier = key_event.modifiers.contains(KeyModifiers::SHIFT)
        || key_event.modifiers.contains(KeyModifiers::CONTROL);
    match key_event.code {
        KeyCode::Tab => AppEvent::NextPane,
        KeyCode::BackTab => AppEvent::PrevPane,
        KeyCode::Esc => AppEvent::Cancel,
        KeyCode::Up if scroll_modifier => AppEvent::ScrollChatUp,
        KeyCode::Down if scroll_modifier => AppEvent::ScrollChatDown,
        KeyCode::PageUp => AppEvent::ScrollStateUp,
        KeyCode::PageDown => AppEvent::ScrollStateDown,
        KeyCode::Up => AppEvent::MoveUp,
        KeyCode::Down => AppEvent::MoveDown,
        KeyCode::Left => AppEvent::CursorLeft,
        KeyCode::Right => AppEvent::CursorRight,
        KeyCode::Backspace => AppEvent::Backspace,
        KeyCode::Enter => AppEvent::Submit,
        KeyCode::Char(c) => AppEvent::InputChar(c),
        _ => AppEvent::Tick,
    }
}

fn map_mouse_event_kind(kind: MouseEventKind, column: u16, row: u16) -> AppEvent {
    match kind {
        MouseEventKind::ScrollUp => AppEvent::MouseScrollUp,
        MouseEventKind::ScrollDown => AppEvent::MouseScrollDown,
        MouseEventKind::Down(MouseButton::Left) => AppEvent::MouseLeftClick(column, row),
        _ => AppEvent::Tick,
    }
}

/// Wait up to one frame for terminal input.
pub fn next_event() -> io::Result<AppEvent> {
    if event::poll(Duration::from_millis(16))? {
        match event::read()? {
            Event::Key(key_event) => return Ok(map_key_event(key_event)),
            Event::Mouse(mouse_event) => {
                return Ok(map_mouse_event_kind(
                    mouse_event.kind,
                    mouse_event.column,
                    mouse_event.row,
                ));
            }
            _ => {}
        }
    }

    Ok(AppEvent::Tick)
}
