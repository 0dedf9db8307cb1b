//! Logging for warehouse-exec.
//!
//! Two layers: process-wide `tracing` initialization for the binary, and the
//! per-gateway `SessionLog` that timestamps statement and retry messages and
//! masks secrets before they reach any sink.

use chrono::Utc;
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the AWS credential masked by default.
pub const AWS_SECRET_ENV: &str = "AWS_SECRET_ACCESS_KEY";

/// Initializes logging to a file.
///
/// Location: `~/.local/state/warehouse-exec/whexec.log` on Linux (XDG state
/// directory), or the platform-appropriate state/config directory elsewhere.
pub fn init_file_logging() {
    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            init_stderr_logging();
            return;
        }
    }

    let log_file = match File::options().create(true).append(true).open(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file: {e}");
            init_stderr_logging();
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();
}

/// Initializes logging to stderr.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Returns the path for the log file.
pub fn get_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("warehouse-exec").join("whexec.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("warehouse-exec").join("whexec.log");
    }

    std::env::temp_dir().join("whexec.log")
}

/// Destination for session log lines.
pub trait LogSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Emits session lines as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write_line(&self, line: &str) {
        tracing::info!(target: "warehouse_exec::session", "{line}");
    }
}

/// Keeps session lines in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// True when any line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn write_line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}

/// Timestamped, secret-masking log for one gateway.
#[derive(Clone)]
pub struct SessionLog {
    secrets: Vec<String>,
    sink: Arc<dyn LogSink>,
}

impl std::fmt::Debug for SessionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLog")
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

impl SessionLog {
    /// Creates a log that writes through `tracing`.
    ///
    /// `env_secret` is the credential taken from the environment by the
    /// configuration layer; it is masked alongside `secrets`.
    pub fn new(secrets: Vec<String>, env_secret: Option<String>) -> Self {
        Self::with_sink(secrets, env_secret, Arc::new(TracingSink))
    }

    /// Creates a log writing to a custom sink.
    pub fn with_sink(
        mut secrets: Vec<String>,
        env_secret: Option<String>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        secrets.extend(env_secret);
        secrets.retain(|secret| !secret.is_empty());
        Self { secrets, sink }
    }

    /// Writes `YYYY-MM-DD HH:MM:SS | <message>` (UTC) with secrets masked.
    pub fn log(&self, message: impl AsRef<str>) {
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("{now} | {}", self.redact(message.as_ref()));
        self.sink.write_line(&line);
    }

    /// Replaces every occurrence of every secret with asterisks of equal length.
    pub fn redact(&self, message: &str) -> String {
        self.secrets
            .iter()
            .fold(message.to_string(), |text, secret| {
                text.replace(secret.as_str(), &"*".repeat(secret.chars().count()))
            })
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new(Vec::new(), None)
    }
}
