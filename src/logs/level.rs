// ABOUTME: Log severities and the canonical line format.
// ABOUTME: Every persisted and streamed line goes through format_line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a deployment log line.
///
/// `Info` is the user-facing summary level; `Debug` carries verbose
/// diagnostics such as configurator output and probe attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Success,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Success => "SUCCESS",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format one log line: `[YYYY-MM-DD HH:MM:SS] [LEVEL] message\n`.
///
/// The result always ends in exactly one newline so readers never see a
/// partial line.
pub fn format_line(at: DateTime<Utc>, level: LogLevel, message: &str) -> String {
    format!(
        "[{}] [{}] {}\n",
        at.format("%Y-%m-%d %H:%M:%S"),
        level,
        message.trim_end_matches('\n')
    )
}
