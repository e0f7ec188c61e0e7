use ratatui::prelude::*;
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Padding, Paragraph};

use crate::app::{App, Pane};
use crate::text_layout::wrap_word_with_positions;
use crate::theme::Theme;
use crate::view::{PLAN_PLACEHOLDER, SEARCH_HEADER, SEARCH_PLACEHOLDER, StateTab};

const MAX_INPUT_TEXT_LINES: u16 = 5;
const MAX_BANNER_TEXT_LINES: u16 = 6;
const TEXT_PADDING: u16 = 1;
const STATUS_HEIGHT: u16 = 3;
const TITLE_BAR_HEIGHT: u16 = 3;
const ACTIVE_TITLE_BG: Color = Color::Rgb(90, 145, 200);
const ACTIVE_TITLE_FG: Color = Color::Black;
const INPUT_PLACEHOLDER: &str = "Type your message...";
const ANSWER_PLACEHOLDER: &str = "Type your answer...";
const STATUS_HELP_TEXT: &str = "Tab focus | Ctrl+E edit | Ctrl+S save | Esc discard | Ctrl+T tab | Ctrl+P/Ctrl+R export | Ctrl+O tool | Ctrl+C quit";

/// What a click inside the state pane landed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateHit {
    Toggle(String),
    Week(usize),
}

#[derive(Debug, Clone, Copy)]
struct ScreenLayout {
    chat: Rect,
    state: Option<Rect>,
    status: Rect,
}

#[derive(Debug, Clone, Copy)]
struct ChatLayout {
    messages: Rect,
    banner: Option<Rect>,
    input: Rect,
    input_scroll: u16,
}

fn screen_layout(screen: Rect, app: &App) -> ScreenLayout {
    let [body, status] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(STATUS_HEIGHT)]).areas(screen);
    if !app.show_state_pane() {
        return ScreenLayout {
            chat: body,
            state: None,
            status,
        };
    }
    let [chat, state] =
        Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(body);
    ScreenLayout {
        chat,
        state: Some(state),
        status,
    }
}

fn content_area(pane: Rect) -> Rect {
    let [_title_bar, content] =
        Layout::vertical([Constraint::Length(TITLE_BAR_HEIGHT), Constraint::Min(0)]).areas(pane);
    content
}

fn text_width(area: Rect) -> u16 {
    area.width.saturating_sub(TEXT_PADDING * 2).max(1)
}

fn chat_layout(content: Rect, app: &App) -> ChatLayout {
    let width = text_width(content);
    let input_text_lines = wrap_word_with_positions(app.chat_input(), width).line_count;
    let (cursor_line, _) = app.chat_cursor_line_col(width);
    let max_input_height = content.height.saturating_sub(1).max(1);
    let (input_height, input_scroll) =
        input_box_metrics(input_text_lines, cursor_line, max_input_height);
    let banner_height = app
        .interrupt_prompt()
        .map(|prompt| {
            let lines = banner_lines(&prompt, width).len() as u16;
            lines.min(MAX_BANNER_TEXT_LINES) + TEXT_PADDING * 2
        })
        .unwrap_or(0);
    let [messages, banner, input] = Layout::vertical([
        Constraint::Min(1),
        Constraint::Length(banner_height),
        Constraint::Length(input_height),
    ])
    .areas(content);
    ChatLayout {
        messages,
        banner: (banner_height > 0).then_some(banner),
        input,
        input_scroll,
    }
}

fn banner_lines(prompt: &str, width: u16) -> Vec<String> {
    wrap_text_lines(&format!("Agent asks: {prompt}"), width)
}

pub fn chat_input_text_width(screen: Rect, app: &App) -> u16 {
    text_width(content_area(screen_layout(screen, app).chat))
}

pub fn chat_max_scroll(screen: Rect, app: &App) -> u16 {
    let content = content_area(screen_layout(screen, app).chat);
    if content.width < 1 || content.height < 2 {
        return 0;
    }
    let layout = chat_layout(content, app);
    let visible_message_lines = layout.messages.height.saturating_sub(TEXT_PADDING * 2);
    let total_message_lines =
        chat_display_lines(&app.chat_messages(), text_width(layout.messages)).len() as u16;
    total_message_lines.saturating_sub(visible_message_lines)
}

fn state_body_area(state: Rect, app: &App) -> Rect {
    let content = content_area(state);
    if app.is_editing() && app.draft_error().is_some() {
        let [body, _error] =
            Layout::vertical([Constraint::Min(0), Constraint::Length(STATUS_HEIGHT)])
                .areas(content);
        return body;
    }
    content
}

pub fn state_text_width(screen: Rect, app: &App) -> u16 {
    screen_layout(screen, app)
        .state
        .map(|state| text_width(state_body_area(state, app)))
        .unwrap_or(1)
}

pub fn state_max_scroll(screen: Rect, app: &App) -> u16 {
    let Some(state) = screen_layout(screen, app).state else {
        return 0;
    };
    let body = state_body_area(state, app);
    if body.width < 1 || body.height < 1 {
        return 0;
    }
    let total_lines = app.state_view(text_width(body)).lines.len() as u16;
    let visible_lines = body.height.saturating_sub(TEXT_PADDING * 2);
    total_lines.saturating_sub(visible_lines)
}

/// Scroll that keeps the draft cursor on screen while editing.
fn state_scroll(app: &App, width: u16, visible_lines: u16) -> u16 {
    let scroll = app.state_scroll();
    if !app.is_editing() || visible_lines == 0 {
        return scroll;
    }
    let (cursor_line, _) = app.draft_cursor_line_col(width);
    if cursor_line < scroll {
        cursor_line
    } else if cursor_line >= scroll.saturating_add(visible_lines) {
        cursor_line.saturating_sub(visible_lines - 1)
    } else {
        scroll
    }
}

pub fn pane_hit_test(screen: Rect, app: &App, x: u16, y: u16) -> Option<Pane> {
    let layout = screen_layout(screen, app);
    if point_in_rect(layout.chat, x, y) {
        return Some(Pane::Chat);
    }
    if let Some(state) = layout.state
        && point_in_rect(state, x, y)
    {
        return Some(Pane::State);
    }
    None
}

/// Map a click in the state pane to an expandable group or a week chip.
pub fn state_pane_hit_test(screen: Rect, app: &App, x: u16, y: u16) -> Option<StateHit> {
    if app.state_tab() != StateTab::Visual {
        return None;
    }
    let state = screen_layout(screen, app).state?;
    let body = state_body_area(state, app);
    if !point_in_rect(body, x, y) {
        return None;
    }
    let inner_x = x.saturating_sub(body.x);
    let inner_y = y.saturating_sub(body.y);
    if inner_x < TEXT_PADDING || inner_y < TEXT_PADDING {
        return None;
    }
    let view = app.state_view(text_width(body));
    let line_index = app.state_scroll() as usize + (inner_y - TEXT_PADDING) as usize;
    let col = (inner_x - TEXT_PADDING) as usize;
    if let Some(key) = view.toggle_at(line_index) {
        return Some(StateHit::Toggle(key.to_string()));
    }
    view.week_at(line_index, col).map(StateHit::Week)
}

pub fn render(frame: &mut Frame, app: &App, theme: &Theme) {
    let layout = screen_layout(frame.area(), app);
    render_chat_pane(frame, layout.chat, app, app.active_pane == Pane::Chat, theme);
    if let Some(state) = layout.state {
        render_state_pane(frame, state, app, app.active_pane == Pane::State, theme);
    }

    frame.render_widget(
        Paragraph::new(status_line(app, theme))
            .style(Style::default().bg(theme.status_bg).fg(theme.muted_fg))
            .block(
                Block::default()
                    .style(Style::default().bg(theme.status_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        layout.status,
    );
}

fn render_title_bar(
    frame: &mut Frame,
    area: Rect,
    title: String,
    base: Color,
    active: bool,
    theme: &Theme,
) {
    let title_bg = title_bar_bg(base, active);
    let title_fg = if active {
        ACTIVE_TITLE_FG
    } else {
        theme.muted_fg
    };
    frame.render_widget(
        Paragraph::new(title)
            .style(Style::default().bg(title_bg).fg(title_fg))
            .block(
                Block::default()
                    .style(Style::default().bg(title_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        area,
    );
}

fn status_line(app: &App, theme: &Theme) -> Line<'static> {
    let mut spans = Vec::new();
    if app.is_agent_running() {
        let (text, color) = if app.is_stalled() {
            ("Agent running (stalled)".to_string(), theme.error_fg)
        } else {
            (
                format!("Agent running {}", agent_working_dots(app.ticks)),
                theme.accent_fg,
            )
        };
        spans.push(Span::styled(text, Style::default().fg(color)));
        spans.push(Span::raw(" | "));
    } else if !app.is_agent_connected() {
        spans.push(Span::styled("Agent offline", Style::default().fg(theme.muted_fg)));
        spans.push(Span::raw(" | "));
    }
    if let Some(notice) = app.notice() {
        let color = if notice.is_error {
            theme.error_fg
        } else {
            theme.text_fg
        };
        spans.push(Span::styled(notice.text.clone(), Style::default().fg(color)));
        spans.push(Span::raw(" | "));
    }
    spans.push(Span::raw(STATUS_HELP_TEXT));
    Line::from(spans)
}

fn agent_working_dots(ticks: u64) -> &'static str {
    const FRAMES: [&str; 6] = ["[   ]", "[.  ]", "[.. ]", "[...]", "[ ..]", "[  .]"];
    FRAMES[((ticks / 2) as usize) % FRAMES.len()]
}

fn render_chat_pane(frame: &mut Frame, area: Rect, app: &App, active: bool, theme: &Theme) {
    let [title_area, content] =
        Layout::vertical([Constraint::Length(TITLE_BAR_HEIGHT), Constraint::Min(0)]).areas(area);
    render_title_bar(frame, title_area, "Agent Chat".to_string(), theme.chat_bg, active, theme);

    frame.render_widget(
        Block::default().style(Style::default().bg(theme.chat_bg)),
        content,
    );
    if content.width < 1 || content.height < 2 {
        return;
    }

    let layout = chat_layout(content, app);
    let message_lines =
        chat_display_lines(&app.chat_messages(), text_width(layout.messages));
    let max_scroll = message_lines
        .len()
        .saturating_sub(layout.messages.height.saturating_sub(TEXT_PADDING * 2) as usize)
        as u16;
    frame.render_widget(
        Paragraph::new(chat_text(&message_lines, theme))
            .scroll((app.chat_scroll_offset(max_scroll), 0))
            .style(Style::default().bg(theme.chat_bg).fg(theme.text_fg))
            .block(
                Block::default()
                    .style(Style::default().bg(theme.chat_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        layout.messages,
    );

    if let (Some(banner), Some(prompt)) = (layout.banner, app.interrupt_prompt()) {
        let lines = banner_lines(&prompt, text_width(banner));
        frame.render_widget(
            Paragraph::new(lines.join("\n"))
                .style(Style::default().bg(theme.banner_bg).fg(theme.active_fg))
                .block(
                    Block::default()
                        .style(Style::default().bg(theme.banner_bg))
                        .padding(Padding::uniform(TEXT_PADDING)),
                ),
            banner,
        );
    }

    let input_width = text_width(layout.input);
    let input_text = if app.chat_input().is_empty() {
        let placeholder = if app.interrupt_prompt().is_some() {
            ANSWER_PLACEHOLDER
        } else {
            INPUT_PLACEHOLDER
        };
        Text::from(Span::styled(
            placeholder,
            Style::default().fg(theme.muted_fg).add_modifier(Modifier::DIM),
        ))
    } else {
        Text::from(wrap_word_with_positions(app.chat_input(), input_width).rendered)
    };
    frame.render_widget(
        Paragraph::new(input_text)
            .block(
                Block::default()
                    .style(Style::default().bg(theme.input_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            )
            .style(Style::default().bg(theme.input_bg).fg(theme.text_fg))
            .scroll((layout.input_scroll, 0)),
        layout.input,
    );

    if active {
        let (cursor_line, cursor_col) = app.chat_cursor_line_col(input_width);
        set_cursor_in(frame, layout.input, cursor_line, cursor_col, layout.input_scroll);
    }
}

fn set_cursor_in(frame: &mut Frame, area: Rect, line: u16, col: u16, scroll: u16) {
    let inner = area.inner(Margin {
        horizontal: TEXT_PADDING,
        vertical: TEXT_PADDING,
    });
    if inner.width == 0 || inner.height == 0 {
        return;
    }
    let visible_line = line.saturating_sub(scroll);
    if line < scroll || visible_line >= inner.height {
        return;
    }
    frame.set_cursor_position((
        inner.x.saturating_add(col.min(inner.width.saturating_sub(1))),
        inner.y.saturating_add(visible_line),
    ));
}

fn state_pane_title(app: &App) -> String {
    let mut title = format!("Agent State [{}]", app.state_tab().title());
    if app.is_editing() {
        title.push_str(" editing");
        if app.is_draft_dirty() {
            title.push('*');
        }
        if app.has_pending_agent_update() {
            title.push_str(" (agent updated)");
        }
    }
    title
}

fn render_state_pane(frame: &mut Frame, area: Rect, app: &App, active: bool, theme: &Theme) {
    let [title_area, content] =
        Layout::vertical([Constraint::Length(TITLE_BAR_HEIGHT), Constraint::Min(0)]).areas(area);
    render_title_bar(frame, title_area, state_pane_title(app), theme.state_bg, active, theme);

    let body = state_body_area(area, app);
    if body != content
        && let Some(err) = app.draft_error()
    {
        let [_, error_area] =
            Layout::vertical([Constraint::Min(0), Constraint::Length(STATUS_HEIGHT)])
                .areas(content);
        frame.render_widget(
            Paragraph::new(err.to_string())
                .style(Style::default().bg(theme.state_bg).fg(theme.error_fg))
                .block(
                    Block::default()
                        .style(Style::default().bg(theme.state_bg))
                        .padding(Padding::uniform(TEXT_PADDING)),
                ),
            error_area,
        );
    }

    let width = text_width(body);
    let view = app.state_view(width);
    let visible_lines = body.height.saturating_sub(TEXT_PADDING * 2);
    let scroll = state_scroll(app, width, visible_lines);
    let text = match app.state_tab() {
        StateTab::Visual => state_text(&view.lines, theme),
        StateTab::Json => Text::from(view.lines.join("\n")),
    };
    frame.render_widget(
        Paragraph::new(text)
            .style(Style::default().bg(theme.state_bg).fg(theme.text_fg))
            .scroll((scroll, 0))
            .block(
                Block::default()
                    .style(Style::default().bg(theme.state_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        body,
    );

    if active && app.is_editing() {
        let (line, col) = app.draft_cursor_line_col(width);
        set_cursor_in(frame, body, line, col, scroll);
    }
}

fn state_text(lines: &[String], theme: &Theme) -> Text<'static> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let trimmed = line.trim_start();
        let style = if line == PLAN_PLACEHOLDER || line == SEARCH_PLACEHOLDER {
            Style::default().fg(theme.muted_fg).add_modifier(Modifier::ITALIC)
        } else if line == SEARCH_HEADER || line.starts_with("Week ") {
            Style::default().fg(theme.active_fg).add_modifier(Modifier::BOLD)
        } else if trimmed.starts_with("[+]") || trimmed.starts_with("[-]") {
            Style::default().fg(theme.accent_fg)
        } else if line.contains("[Week ") {
            push_week_selector(line, theme, &mut out);
            continue;
        } else if trimmed.starts_with('─') {
            Style::default().fg(chat_separator_color(theme.state_bg, theme))
        } else {
            Style::default()
        };
        out.push(Line::from(Span::styled(line.clone(), style)));
    }
    Text::from(out)
}

/// Week selector row with the active chip highlighted.
fn push_week_selector(line: &str, theme: &Theme, out: &mut Vec<Line<'static>>) {
    let Some(start) = line.find("[Week ") else {
        out.push(Line::from(line.to_string()));
        return;
    };
    let end = line[start..]
        .find(']')
        .map(|offset| start + offset + 1)
        .unwrap_or(line.len());
    out.push(Line::from(vec![
        Span::raw(line[..start].to_string()),
        Span::styled(
            line[start..end].to_string(),
            Style::default()
                .fg(ACTIVE_TITLE_FG)
                .bg(ACTIVE_TITLE_BG),
        ),
        Span::raw(line[end..].to_string()),
    ]));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatPrefix {
    You,
    Agent,
    System,
    Tool,
}

impl ChatPrefix {
    fn label(self) -> &'static str {
        match self {
            Self::You => "You:",
            Self::Agent => "Agent:",
            Self::System => "System:",
            Self::Tool => "Tool:",
        }
    }
}

#[derive(Debug, Clone)]
struct ChatDisplayLine {
    prefix: Option<ChatPrefix>,
    body: String,
    show_label: bool,
    is_separator: bool,
}

fn chat_display_lines(messages: &[String], width: u16) -> Vec<ChatDisplayLine> {
    let width = width.max(1);
    let mut out = Vec::new();
    for (idx, message) in messages.iter().enumerate() {
        let (prefix, body) = parse_chat_prefix_and_body(message);
        if let Some(prefix) = prefix {
            let prefix_width = prefix.label().chars().count() + 1;
            let body_width = (width as usize).saturating_sub(prefix_width).max(1) as u16;
            let wrapped = wrap_text_lines(body, body_width);
            for (line_idx, line) in wrapped.into_iter().enumerate() {
                out.push(ChatDisplayLine {
                    prefix: Some(prefix),
                    body: line,
                    show_label: line_idx == 0,
                    is_separator: false,
                });
            }
        } else {
            for line in wrap_text_lines(body, width) {
                out.push(ChatDisplayLine {
                    prefix: None,
                    body: line,
                    show_label: false,
                    is_separator: false,
                });
            }
        }

        if idx + 1 < messages.len() {
            out.push(ChatDisplayLine {
                prefix: None,
                body: "─".repeat(width as usize),
                show_label: false,
                is_separator: true,
            });
        }
    }
    out
}

fn chat_text(lines: &[ChatDisplayLine], theme: &Theme) -> Text<'static> {
    let mut out_lines = Vec::with_capacity(lines.len());
    for line in lines {
        if line.is_separator {
            out_lines.push(Line::from(Span::styled(
                line.body.clone(),
                Style::default().fg(chat_separator_color(theme.chat_bg, theme)),
            )));
            continue;
        }
        let Some(prefix) = line.prefix else {
            out_lines.push(Line::from(Span::raw(line.body.clone())));
            continue;
        };
        let (label_style, body_style) = match prefix {
            ChatPrefix::You => (Style::default().fg(Color::Rgb(80, 190, 100)), Style::default()),
            ChatPrefix::Agent => (Style::default().fg(Color::Rgb(230, 150, 60)), Style::default()),
            ChatPrefix::System => {
                let style = Style::default()
                    .fg(theme.muted_fg)
                    .add_modifier(Modifier::DIM);
                (style, style)
            }
            ChatPrefix::Tool => {
                let style = Style::default().fg(theme.accent_fg);
                (style, style)
            }
        };
        let label = prefix.label();
        if line.show_label {
            out_lines.push(Line::from(vec![
                Span::styled(label.to_string(), label_style),
                Span::raw(" "),
                Span::styled(line.body.clone(), body_style),
            ]));
        } else {
            out_lines.push(Line::from(vec![
                Span::raw(" ".repeat(label.chars().count() + 1)),
                Span::styled(line.body.clone(), body_style),
            ]));
        }
    }
    Text::from(out_lines)
}

fn chat_separator_color(base: Color, theme: &Theme) -> Color {
    match base {
        Color::Rgb(r, g, b) => Color::Rgb(
            r.saturating_add(12),
            g.saturating_add(12),
            b.saturating_add(12),
        ),
        _ => theme.muted_fg,
    }
}

fn parse_chat_prefix_and_body(message: &str) -> (Option<ChatPrefix>, &str) {
    for prefix in [
        ChatPrefix::You,
        ChatPrefix::Agent,
        ChatPrefix::System,
        ChatPrefix::Tool,
    ] {
        if let Some(rest) = message.strip_prefix(prefix.label()) {
            return (Some(prefix), rest.trim_start_matches(' '));
        }
    }
    (None, message)
}

fn wrap_text_lines(text: &str, width: u16) -> Vec<String> {
    let rendered = wrap_word_with_positions(text, width.max(1)).rendered;
    let mut lines = rendered
        .split('\n')
        .map(|s| s.to_string())
        .collect::<Vec<_>>();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn input_box_metrics(input_text_lines: u16, cursor_line: u16, max_input_height: u16) -> (u16, u16) {
    let capped_text_lines = input_text_lines.clamp(1, MAX_INPUT_TEXT_LINES);
    let desired_height = capped_text_lines.saturating_add(TEXT_PADDING * 2);
    let input_height = desired_height.clamp(1, max_input_height.max(1));
    let visible_text_lines = input_height.saturating_sub(TEXT_PADDING * 2).max(1);
    let max_scroll = input_text_lines.saturating_sub(visible_text_lines);
    let middle_line = visible_text_lines / 2;
    let input_scroll = cursor_line.saturating_sub(middle_line).min(max_scroll);
    (input_height, input_scroll)
}

fn title_bar_bg(base: Color, active: bool) -> Color {
    if active {
        return ACTIVE_TITLE_BG;
    }
    match base {
        Color::Rgb(r, g, b) => {
            let delta = -12;
            Color::Rgb(
                adjust_channel(r, delta),
                adjust_channel(g, delta),
                adjust_channel(b, delta),
            )
        }
        _ => base,
    }
}

fn point_in_rect(rect: Rect, x: u16, y: u16) -> bool {
    x >= rect.x
        && x < rect.x.saturating_add(rect.width)
        && y >= rect.y
        && y < rect.y.saturating_add(rect.height)
}

fn adjust_channel(channel: u8, delta: i16) -> u8 {
    let value = channel as i16 + delta;
    value.clamp(0, 255) as u8
}

#[cfg(test)]
#[path = "../tests/unit/ui_tests.rs"]
mod tests;
