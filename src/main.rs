use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use crossterm::cursor::SetCursorStyle;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

mod app;
mod channel;
mod config;
mod draft;
mod events;
mod export;
mod gate;
mod interrupt;
mod logging;
mod state;
mod text_layout;
mod theme;
mod tool_calls;
mod ui;
mod view;

use app::{App, AppOptions, Pane};
use channel::{ChannelError, StateChannel};
use config::{CanvasConfig, ConfigError};
use events::AppEvent;
use export::{ExportError, ExportKind};
use gate::{GateDecision, GateError};
use state::AgentState;
use theme::Theme;
use ui::StateHit;

#[derive(Debug, Parser)]
#[command(name = "coagent-canvas", version, about = "Terminal canvas for a co-agent learning assistant")]
struct Cli {
    /// Config file. Defaults to ~/.coagent-canvas/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Bridge command line, replacing `[agent] program` and `args`.
    #[arg(long)]
    agent_cmd: Option<String>,
    /// Send the file's contents as the first chat message.
    #[arg(long)]
    send_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a markdown export from a saved agent state document.
    Export {
        #[arg(value_enum)]
        kind: ExportTarget,
        /// Agent state JSON file.
        #[arg(long)]
        state: PathBuf,
        /// Output directory. Defaults to `[export] dir`.
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Print the gate decision for a request path.
    Gate {
        #[arg(long)]
        path: String,
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        authenticated: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExportTarget {
    Plan,
    Search,
}

impl From<ExportTarget> for ExportKind {
    fn from(target: ExportTarget) -> Self {
        match target {
            ExportTarget::Plan => ExportKind::Plan,
            ExportTarget::Search => ExportKind::Search,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("'{path}' is not an agent state document: {source}")]
    StateDocument {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("terminal error: {0}")]
    Terminal(#[from] io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("coagent-canvas: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = CanvasConfig::load(cli.config.as_deref())?;
    match cli.command {
        Some(Command::Export {
            kind,
            state,
            out_dir,
        }) => {
            let out_dir = out_dir.unwrap_or_else(|| config.export_dir());
            let path = run_export(kind.into(), &state, &out_dir)?;
            println!("{}", path.display());
            Ok(())
        }
        Some(Command::Gate {
            path,
            query,
            authenticated,
        }) => {
            println!("{}", run_gate(&path, query.as_deref(), authenticated)?);
            Ok(())
        }
        None => {
            if let Some(command_line) = cli.agent_cmd.as_deref() {
                config.agent.override_command(command_line);
            }
            let startup_message = match cli.send_file {
                Some(path) => Some(read_file(&path)?),
                None => None,
            };
            run_interactive(&config, startup_message)
        }
    }
}

fn read_file(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn run_export(kind: ExportKind, state_path: &Path, out_dir: &Path) -> Result<PathBuf, CliError> {
    let contents = read_file(state_path)?;
    let state = serde_json::from_str::<serde_json::Value>(&contents)
        .and_then(AgentState::from_value)
        .map_err(|source| CliError::StateDocument {
            path: state_path.to_path_buf(),
            source,
        })?;
    Ok(export::export_to_dir(kind, &state, out_dir)?)
}

fn gate_target(path: &str, query: Option<&str>) -> String {
    match query.map(|q| q.trim_start_matches('?')) {
        Some(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path.to_string(),
    }
}

fn run_gate(path: &str, query: Option<&str>, authenticated: bool) -> Result<String, CliError> {
    let line = match gate::decide(&gate_target(path, query), authenticated)? {
        GateDecision::Allow => "allow".to_string(),
        GateDecision::Redirect(target) => format!("redirect {target}"),
    };
    Ok(line)
}

fn open_channel(config: &CanvasConfig) -> (StateChannel, Option<String>) {
    match StateChannel::connect(&config.agent) {
        Ok(channel) => {
            info!(program = %config.agent.program, "agent bridge started");
            (channel, None)
        }
        Err(err) => {
            warn!(%err, "running without an agent bridge");
            (
                StateChannel::detached(),
                Some(format!("System: {err}. Messages will not reach an agent.")),
            )
        }
    }
}

fn run_interactive(config: &CanvasConfig, startup_message: Option<String>) -> Result<(), CliError> {
    if let Some(log_file) = config.log_file()
        && let Err(err) = logging::init_file_logging(&log_file, &config.logging.level)
    {
        eprintln!("coagent-canvas: logging disabled: {err}");
    }

    let (channel, channel_notice) = open_channel(config);
    let mut app = App::new(
        channel,
        AppOptions {
            interrupt_timeout: config.agent.interrupt_timeout(),
            export_dir: config.export_dir(),
        },
    )?;
    if let Some(notice) = channel_notice {
        app.push_message(notice);
    }
    if let Some(message) = startup_message {
        app.send_user_message(message);
    }
    let theme = Theme::load_or_default(config.theme_path());

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        SetCursorStyle::SteadyBar
    )?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    let result = run_app(&mut terminal, app, &theme);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        SetCursorStyle::DefaultUserShape,
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    Ok(result?)
}

fn screen_rect<B: Backend>(terminal: &Terminal<B>) -> io::Result<Rect> {
    let size = terminal.size()?;
    Ok(Rect::new(0, 0, size.width, size.height))
}

fn active_text_width(screen: Rect, app: &App) -> u16 {
    match app.active_pane {
        Pane::Chat => ui::chat_input_text_width(screen, app),
        Pane::State => ui::state_text_width(screen, app),
    }
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App, theme: &Theme) -> io::Result<()> {
    while app.running {
        app.pump_channel(Instant::now());

        terminal.draw(|frame| ui::render(frame, &app, theme))?;

        match events::next_event()? {
            AppEvent::Tick => app.on_tick(),
            AppEvent::Quit => app.quit(),
            AppEvent::NextPane => app.next_pane(),
            AppEvent::PrevPane => app.prev_pane(),
            AppEvent::MoveUp => {
                let screen = screen_rect(terminal)?;
                app.move_up(active_text_width(screen, &app));
            }
            AppEvent::MoveDown => {
                let screen = screen_rect(terminal)?;
                let max_scroll = ui::state_max_scroll(screen, &app);
                app.move_down(active_text_width(screen, &app), max_scroll);
            }
            AppEvent::CursorLeft => app.move_cursor_left(),
            AppEvent::CursorRight => app.move_cursor_right(),
            AppEvent::ScrollChatUp => {
                let screen = screen_rect(terminal)?;
                app.scroll_chat_up(ui::chat_max_scroll(screen, &app));
            }
            AppEvent::ScrollChatDown => {
                let screen = screen_rect(terminal)?;
                app.scroll_chat_down(ui::chat_max_scroll(screen, &app));
            }
            AppEvent::ScrollStateUp => app.scroll_state_up(),
            AppEvent::ScrollStateDown => {
                let screen = screen_rect(terminal)?;
                app.scroll_state_down(ui::state_max_scroll(screen, &app));
            }
            AppEvent::InputChar(c) => app.input_char(c),
            AppEvent::Backspace => app.backspace(),
            AppEvent::Submit => app.submit(),
            AppEvent::ToggleEdit => app.toggle_edit(),
            AppEvent::SaveDraft => app.save_draft(),
            AppEvent::Cancel => app.cancel(),
            AppEvent::ToggleTab => app.toggle_tab(),
            AppEvent::ExportPlan => app.export(ExportKind::Plan),
            AppEvent::ExportSearch => app.export(ExportKind::Search),
            AppEvent::CycleToolDetail => app.cycle_tool_detail(),
            AppEvent::MouseScrollUp => {
                let screen = screen_rect(terminal)?;
                match app.active_pane {
                    Pane::Chat => app.scroll_chat_up(ui::chat_max_scroll(screen, &app)),
                    Pane::State => app.scroll_state_up(),
                }
            }
            AppEvent::MouseScrollDown => {
                let screen = screen_rect(terminal)?;
                match app.active_pane {
                    Pane::Chat => app.scroll_chat_down(ui::chat_max_scroll(screen, &app)),
                    Pane::State => app.scroll_state_down(ui::state_max_scroll(screen, &app)),
                }
            }
            AppEvent::MouseLeftClick(column, row) => {
                let screen = screen_rect(terminal)?;
                if let Some(pane) = ui::pane_hit_test(screen, &app, column, row) {
                    app.active_pane = pane;
                }
                match ui::state_pane_hit_test(screen, &app, column, row) {
                    Some(StateHit::Toggle(key)) => app.toggle_expanded(&key),
                    Some(StateHit::Week(week)) => app.select_week(week),
                    None => {}
                }
            }
        }
    }

    Ok(())
}
