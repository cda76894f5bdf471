// ABOUTME: Per-deployment log pipeline: formatting, buffering, and streaming.
// ABOUTME: Lines are persisted on the record and mirrored to an in-memory buffer.

mod level;
mod registry;
mod sink;
mod stream;
mod writer;

pub use level::{LogLevel, format_line};
pub use registry::{BufferHandle, LogRegistry, RunClaim};
pub use sink::{LogEvent, LogReceiver, LogSink};
pub use stream::{LogStream, StreamEvent, StreamSettings, subscribe};
pub use writer::DeploymentLog;
