// ABOUTME: Message channel carrying progress lines from collaborators.
// ABOUTME: Decouples the configurator and prober from the log writer.

use tokio::sync::mpsc;

use super::LogLevel;

/// A progress message destined for a deployment log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
}

pub type LogReceiver = mpsc::UnboundedReceiver<LogEvent>;

/// Sending half handed to collaborators. Cheap to clone.
///
/// Sending never blocks and never fails loudly: if nobody is draining the
/// channel the message is dropped.
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: Option<mpsc::UnboundedSender<LogEvent>>,
}

impl LogSink {
    pub fn channel() -> (Self, LogReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops everything.
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, level: LogLevel, message: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(LogEvent {
                level,
                message: message.into(),
            });
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(LogLevel::Info, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.emit(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(LogLevel::Warn, message);
    }
}
