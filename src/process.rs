// ABOUTME: Async subprocess execution shared by the terraform and ansible adapters.
// ABOUTME: Captures output, optionally streams lines as they arrive, and enforces a timeout.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Failures launching or supervising a child process.
///
/// A non-zero exit is not an error here; callers inspect [`ProcessOutput`].
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {after:?}")]
    TimedOut { program: String, after: Duration },
}

/// A command line to run, with working directory and extra environment.
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// The command line as a single string. Environment values are never
    /// included.
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    fn build(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }
        command
    }
}

/// Result of a finished child process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// None when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout followed by stderr, for error reports.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }
}

/// Run a command to completion and capture its output.
pub async fn run(command: &ProcessCommand) -> Result<ProcessOutput, ProcessError> {
    run_streaming(command, |_| {}).await
}

/// Run a command, handing each non-empty output line (stdout or stderr, in
/// arrival order) to `on_line` while it runs.
pub async fn run_streaming<F>(
    command: &ProcessCommand,
    on_line: F,
) -> Result<ProcessOutput, ProcessError>
where
    F: FnMut(&str),
{
    let program = command.program_name();
    tracing::debug!(command = %command.display(), cwd = ?command.cwd(), "running command");

    let execution = execute(command, &program, on_line);
    match command.timeout {
        Some(after) => match tokio::time::timeout(after, execution).await {
            Ok(result) => result,
            // kill_on_drop reaps the child once the future is dropped
            Err(_) => Err(ProcessError::TimedOut { program, after }),
        },
        None => execution.await,
    }
}

async fn execute<F>(
    command: &ProcessCommand,
    program: &str,
    mut on_line: F,
) -> Result<ProcessOutput, ProcessError>
where
    F: FnMut(&str),
{
    let io_error = |source| ProcessError::Io {
        program: program.to_string(),
        source,
    };

    let mut child = command.build().spawn().map_err(|source| ProcessError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io_error(std::io::Error::other("stdout not captured")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io_error(std::io::Error::other("stderr not captured")))?;

    let mut stdout = BufReader::new(stdout);
    let mut stderr = BufReader::new(stderr);
    // read_until keeps partial reads in these buffers across select! wakeups
    let (mut stdout_buf, mut stderr_buf) = (Vec::new(), Vec::new());
    let mut output = ProcessOutput::default();
    let (mut stdout_done, mut stderr_done) = (false, false);

    while !(stdout_done && stderr_done) {
        tokio::select! {
            read = stdout.read_until(b'\n', &mut stdout_buf), if !stdout_done => {
                if read.map_err(io_error)? == 0 {
                    stdout_done = true;
                } else {
                    let line = take_line(&mut stdout_buf);
                    forward_line(&line, &mut on_line);
                    output.stdout.push_str(&line);
                    output.stdout.push('\n');
                }
            },
            read = stderr.read_until(b'\n', &mut stderr_buf), if !stderr_done => {
                if read.map_err(io_error)? == 0 {
                    stderr_done = true;
                } else {
                    let line = take_line(&mut stderr_buf);
                    forward_line(&line, &mut on_line);
                    output.stderr.push_str(&line);
                    output.stderr.push('\n');
                }
            },
        }
    }

    let status = child.wait().await.map_err(io_error)?;
    output.exit_code = status.code();

    if !output.success() {
        tracing::debug!(program, exit_code = ?output.exit_code, "command exited unsuccessfully");
    }
    Ok(output)
}

/// Drain one line from `buf`, dropping the line ending. Bytes that are not
/// valid UTF-8 are replaced rather than failing the command.
fn take_line(buf: &mut Vec<u8>) -> String {
    let mut end = buf.len();
    if buf[..end].ends_with(b"\n") {
        end -= 1;
    }
    if buf[..end].ends_with(b"\r") {
        end -= 1;
    }
    let line = String::from_utf8_lossy(&buf[..end]).into_owned();
    buf.clear();
    line
}

fn forward_line<F: FnMut(&str)>(line: &str, on_line: &mut F) {
    let trimmed = line.trim();
    if !trimmed.is_empty() {
        on_line(trimmed);
    }
}
