use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const CONFIG_DIR: &str = ".coagent-canvas";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub agent: AgentConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
    pub theme: ThemeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Bridge executable speaking JSON lines on stdin/stdout.
    pub program: String,
    pub args: Vec<String>,
    pub name: String,
    /// Seconds of silence during a run before the session is shown as stalled. 0 disables.
    pub stall_timeout_secs: u64,
    /// Seconds an interrupt may wait for the user before it is answered with a timeout. 0 disables.
    pub interrupt_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub dir: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub file: String,
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    pub path: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            name: "agent".to_string(),
            stall_timeout_secs: 120,
            interrupt_timeout_secs: 0,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: ".".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: "~/.coagent-canvas/canvas.log".to_string(),
            level: "info".to_string(),
        }
    }
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            path: "~/.coagent-canvas/theme.toml".to_string(),
        }
    }
}

impl AgentConfig {
    pub fn stall_timeout(&self) -> Option<Duration> {
        (self.stall_timeout_secs > 0).then(|| Duration::from_secs(self.stall_timeout_secs))
    }

    pub fn interrupt_timeout(&self) -> Option<Duration> {
        (self.interrupt_timeout_secs > 0).then(|| Duration::from_secs(self.interrupt_timeout_secs))
    }

    /// Replace program and args with a whitespace-split command line.
    pub fn override_command(&mut self, command_line: &str) {
        let mut parts = command_line.split_whitespace().map(ToString::to_string);
        if let Some(program) = parts.next() {
            self.program = program;
            self.args = parts.collect();
        }
    }
}

impl CanvasConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Read `path`, or the default location when `None`. A missing default file yields defaults;
    /// a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match default_config_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound && !explicit => {
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        Self::from_toml_str(&contents).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn export_dir(&self) -> PathBuf {
        expand_home(&self.export.dir)
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        let trimmed = self.logging.file.trim();
        (!trimmed.is_empty()).then(|| expand_home(trimmed))
    }

    pub fn theme_path(&self) -> PathBuf {
        expand_home(&self.theme.path)
    }
}

fn default_config_path() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| PathBuf::from(home).join(CONFIG_DIR).join(CONFIG_FILE))
}

pub fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = env::var_os("HOME") {
            return PathBuf::from(home);
        }
    } else if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = env::var_os("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(raw)
}
