use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::interrupt::InterruptOutcome;
use crate::state::AgentState;

/// Events the bridge writes to stdout, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    #[serde(rename = "RUN_STARTED")]
    RunStarted {
        #[serde(rename = "threadId", default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
        #[serde(rename = "runId", default, skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
    },
    #[serde(rename = "RUN_FINISHED")]
    RunFinished {
        #[serde(rename = "runId", default, skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
    },
    #[serde(rename = "RUN_ERROR")]
    RunError {
        #[serde(default)]
        message: String,
    },
    #[serde(rename = "STATE_SNAPSHOT")]
    StateSnapshot {
        snapshot: AgentState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        running: Option<bool>,
    },
    #[serde(rename = "TEXT_MESSAGE_CONTENT")]
    TextMessageContent {
        #[serde(rename = "messageId", default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        delta: String,
    },
    #[serde(rename = "TOOL_CALL_UPDATE")]
    ToolCallUpdate {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolCallName")]
        tool_call_name: String,
        #[serde(default)]
        args: Value,
        #[serde(default)]
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    #[serde(rename = "INTERRUPT")]
    Interrupt {
        id: String,
        #[serde(default)]
        value: Value,
    },
}

/// Commands written to the bridge's stdin, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentCommand {
    #[serde(rename = "STATE_OVERWRITE")]
    StateOverwrite { state: AgentState },
    #[serde(rename = "INTERRUPT_RESOLUTION")]
    InterruptResolution { id: String, outcome: InterruptOutcome },
    #[serde(rename = "USER_MESSAGE")]
    UserMessage { content: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Agent(AgentEvent),
    System(String),
    Disconnected { code: Option<i32> },
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("no agent bridge command configured")]
    NoBridgeConfigured,
    #[error("failed to start agent bridge `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("agent bridge `{0}` did not expose stdio pipes")]
    MissingPipes(String),
    #[error("agent channel is closed")]
    Closed,
    #[error("the state publisher was already handed out")]
    PublisherTaken,
}

/// What a subscriber sees first: the current document and the running flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub state: AgentState,
    pub running: bool,
}

/// Write capability for the shared document. The channel hands out exactly one.
#[derive(Debug)]
pub struct StatePublisher {
    _private: (),
}

/// Capability to answer interrupts upstream. Cannot publish state.
#[derive(Debug, Clone)]
pub struct InterruptResolver {
    commands: Sender<AgentCommand>,
}

impl InterruptResolver {
    pub fn send_resolution(&self, id: &str, outcome: InterruptOutcome) -> Result<(), ChannelError> {
        self.commands
            .send(AgentCommand::InterruptResolution {
                id: id.to_string(),
                outcome,
            })
            .map_err(|_| ChannelError::Closed)
    }
}

/// Owns the authoritative [`AgentState`] and the link to the remote agent.
pub struct StateChannel {
    state: AgentState,
    running: bool,
    commands: Sender<AgentCommand>,
    events: Receiver<ChannelEvent>,
    notices: Vec<ChannelEvent>,
    publisher: Option<StatePublisher>,
    stall_timeout: Option<Duration>,
    last_event_at: Instant,
    connected: bool,
    bridge: Option<BridgeProcess>,
}

impl StateChannel {
    fn from_parts(
        commands: Sender<AgentCommand>,
        events: Receiver<ChannelEvent>,
        stall_timeout: Option<Duration>,
        bridge: Option<BridgeProcess>,
    ) -> Self {
        Self {
            state: AgentState::default(),
            running: false,
            commands,
            events,
            notices: Vec::new(),
            publisher: Some(StatePublisher { _private: () }),
            stall_timeout,
            last_event_at: Instant::now(),
            connected: true,
            bridge,
        }
    }

    /// Launch the configured bridge process and connect to it.
    pub fn connect(config: &AgentConfig) -> Result<Self, ChannelError> {
        let (bridge, commands, events) = BridgeProcess::spawn(config)?;
        Ok(Self::from_parts(
            commands,
            events,
            config.stall_timeout(),
            Some(bridge),
        ))
    }

    /// A channel with nothing on the other end. Commands are dropped with a notice.
    pub fn detached() -> Self {
        let (commands, command_rx) = mpsc::channel();
        drop(command_rx);
        let (_event_tx, events) = mpsc::channel();
        let mut channel = Self::from_parts(commands, events, None, None);
        channel.connected = false;
        channel
    }

    /// Both ends of a channel kept in memory.
    #[cfg(test)]
    pub fn in_memory(stall_timeout: Option<Duration>) -> (Self, RemoteEnd) {
        let (commands, command_rx) = mpsc::channel();
        let (event_tx, events) = mpsc::channel();
        (
            Self::from_parts(commands, events, stall_timeout, None),
            RemoteEnd {
                events: event_tx,
                commands: command_rx,
            },
        )
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            state: self.state.clone(),
            running: self.running,
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn take_publisher(&mut self) -> Option<StatePublisher> {
        self.publisher.take()
    }

    pub fn interrupt_resolver(&self) -> InterruptResolver {
        InterruptResolver {
            commands: self.commands.clone(),
        }
    }

    /// Pull up to `max_events` events, applying each to the owned state in arrival order.
    pub fn drain_events_limited(&mut self, max_events: usize) -> Vec<ChannelEvent> {
        let mut events = std::mem::take(&mut self.notices);
        while events.len() < max_events {
            let Ok(event) = self.events.try_recv() else {
                break;
            };
            self.apply(&event);
            events.push(event);
        }
        events
    }

    fn apply(&mut self, event: &ChannelEvent) {
        self.last_event_at = Instant::now();
        match event {
            ChannelEvent::Agent(AgentEvent::StateSnapshot { snapshot, running }) => {
                self.state = snapshot.clone();
                if let Some(running) = running.or(snapshot.running) {
                    self.running = running;
                }
            }
            ChannelEvent::Agent(AgentEvent::RunStarted { run_id, .. }) => {
                debug!(run_id = run_id.as_deref().unwrap_or("-"), "agent run started");
                self.running = true;
            }
            ChannelEvent::Agent(AgentEvent::RunFinished { .. }) => {
                self.running = false;
            }
            ChannelEvent::Agent(AgentEvent::RunError { message }) => {
                warn!(%message, "agent run failed");
                self.running = false;
            }
            ChannelEvent::Disconnected { code } => {
                info!(?code, "agent bridge disconnected");
                self.connected = false;
            }
            ChannelEvent::Agent(_) | ChannelEvent::System(_) => {}
        }
    }

    /// Overwrite the whole document upstream. The local copy is replaced immediately; whatever
    /// the agent makes of it comes back later as a snapshot.
    pub fn publish(&mut self, _publisher: &StatePublisher, state: AgentState) {
        self.state = state.clone();
        self.send(AgentCommand::StateOverwrite { state });
    }

    pub fn send_message(&mut self, content: String) {
        self.send(AgentCommand::UserMessage { content });
    }

    fn send(&mut self, command: AgentCommand) {
        if self.commands.send(command).is_err() {
            warn!("agent channel closed; command dropped");
            self.notices.push(ChannelEvent::System(
                "Agent channel is closed; the change was kept locally only.".to_string(),
            ));
        }
    }

    /// A running session that has gone quiet for longer than the stall timeout.
    pub fn is_stalled(&self, now: Instant) -> bool {
        if !self.running {
            return false;
        }
        if !self.connected {
            return true;
        }
        self.stall_timeout
            .is_some_and(|timeout| now.saturating_duration_since(self.last_event_at) >= timeout)
    }
}

impl Drop for StateChannel {
    fn drop(&mut self) {
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.shutdown();
        }
    }
}

/// The remote side of an in-memory channel.
#[cfg(test)]
pub struct RemoteEnd {
    events: Sender<ChannelEvent>,
    commands: Receiver<AgentCommand>,
}

#[cfg(test)]
impl RemoteEnd {
    pub fn emit(&self, event: AgentEvent) {
        let _ = self.events.send(ChannelEvent::Agent(event));
    }

    pub fn emit_raw(&self, event: ChannelEvent) {
        let _ = self.events.send(event);
    }

    pub fn sent_commands(&self) -> Vec<AgentCommand> {
        self.commands.try_iter().collect()
    }
}

const WRITER_POLL: Duration = Duration::from_millis(25);
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

struct BridgeProcess {
    child: Child,
    writer: Option<thread::JoinHandle<()>>,
    closing: Arc<AtomicBool>,
}

impl BridgeProcess {
    fn spawn(
        config: &AgentConfig,
    ) -> Result<(Self, Sender<AgentCommand>, Receiver<ChannelEvent>), ChannelError> {
        let program = config.program.trim();
        if program.is_empty() {
            return Err(ChannelError::NoBridgeConfigured);
        }
        let mut command = Command::new(program);
        command
            .args(&config.args)
            .env("COAGENT_AGENT_NAME", &config.name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = command.spawn().map_err(|source| ChannelError::Spawn {
            program: program.to_string(),
            source,
        })?;
        info!(program, args = ?config.args, "agent bridge started");

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            return Err(ChannelError::MissingPipes(program.to_string()));
        };

        let (command_tx, command_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let closing = Arc::new(AtomicBool::new(false));
        let writer = spawn_writer(stdin, command_rx, event_tx.clone(), Arc::clone(&closing));
        spawn_event_reader(stdout, event_tx);
        spawn_log_reader(stderr);

        Ok((
            Self {
                child,
                writer: Some(writer),
                closing,
            },
            command_tx,
            event_rx,
        ))
    }

    /// Flush queued commands, close stdin, then give the bridge a short grace period before
    /// killing it.
    fn shutdown(&mut self) {
        self.closing.store(true, Ordering::Release);
        if let Some(writer) = self.writer.take()
            && writer.join().is_err()
        {
            warn!("agent bridge writer panicked");
        }
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while Instant::now() < deadline {
            match self.child.try_wait() {
                Ok(None) => thread::sleep(Duration::from_millis(10)),
                Ok(Some(_)) | Err(_) => break,
            }
        }
        if let Ok(None) = self.child.try_wait() {
            debug!("agent bridge still alive after stdin closed; killing it");
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

fn spawn_writer(
    mut stdin: ChildStdin,
    commands: Receiver<AgentCommand>,
    tx: Sender<ChannelEvent>,
    closing: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        loop {
            // Queued commands are written before a shutdown request is honoured.
            let command = match commands.recv_timeout(WRITER_POLL) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) if closing.load(Ordering::Acquire) => return,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return,
            };
            let line = match serde_json::to_string(&command) {
                Ok(line) => line,
                Err(err) => {
                    warn!(%err, "failed to encode agent command");
                    continue;
                }
            };
            if let Err(err) = writeln!(stdin, "{line}").and_then(|_| stdin.flush()) {
                warn!(%err, "agent bridge stdin closed");
                let _ = tx.send(ChannelEvent::System(format!(
                    "Agent bridge stopped accepting commands: {err}"
                )));
                return;
            }
        }
    })
}

fn spawn_event_reader<R: std::io::Read + Send + 'static>(
    reader: R,
    tx: Sender<ChannelEvent>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(reader).lines().map_while(Result::ok) {
            if let Some(event) = parse_event_line(&line)
                && tx.send(event).is_err()
            {
                return;
            }
        }
        let _ = tx.send(ChannelEvent::Disconnected { code: None });
    })
}

fn spawn_log_reader<R: std::io::Read + Send + 'static>(reader: R) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(reader).lines().map_while(Result::ok) {
            debug!(target: "coagent_canvas::bridge", "{line}");
        }
    })
}

/// Blank lines are skipped; anything unreadable becomes a visible notice.
pub fn parse_event_line(line: &str) -> Option<ChannelEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<AgentEvent>(trimmed) {
        Ok(event) => Some(ChannelEvent::Agent(event)),
        Err(err) => {
            warn!(%err, "unreadable agent event");
            Some(ChannelEvent::System(format!("Ignored unreadable agent event: {err}")))
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/channel_tests.rs"]
mod tests;
