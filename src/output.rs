// ABOUTME: Terminal reporting for deployment commands.
// ABOUTME: Human text, quiet CI output, or one JSON object per line.

use serde::Serialize;
use std::time::Instant;

use crate::diagnostics::Warning;
use crate::logs::StreamEvent;
use crate::model::DeploymentRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Progress lines, warnings, and the streamed deployment log
    Normal,
    /// Final result only
    Quiet,
    Json,
}

pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => {
                println!("{message}");
            }
            OutputMode::Json => {
                print_json(&JsonEvent {
                    event: "success",
                    message,
                    duration_secs: self.duration(),
                });
            }
        }
    }

    /// Print a non-fatal warning collected during a run.
    pub fn warning(&self, warning: &Warning) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("Warning: {}", warning.message);
            }
            OutputMode::Json => {
                if let Ok(json) = serde_json::to_string(&JsonWarning {
                    event: "warning",
                    warning,
                }) {
                    eprintln!("{json}");
                }
            }
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("Error: {message}");
            }
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "error",
                    message,
                    duration_secs: self.duration(),
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    eprintln!("{json}");
                }
            }
        }
    }

    /// Render one log stream event. Log text is passed through as-is.
    pub fn stream_event(&self, event: &StreamEvent) {
        match self.mode {
            OutputMode::Json => print_json(event),
            OutputMode::Quiet => {}
            OutputMode::Normal => match event {
                StreamEvent::Initial { logs, .. } | StreamEvent::Update { logs, .. } => {
                    print!("{logs}");
                }
                StreamEvent::Heartbeat { .. } => {}
                StreamEvent::Final { .. } => {}
                StreamEvent::Error { message, .. } => eprintln!("Stream error: {message}"),
            },
        }
    }

    /// Print a deployment record: a summary in normal mode, the whole record
    /// in JSON mode, only the status in quiet mode.
    pub fn record(&self, record: &DeploymentRecord) {
        match self.mode {
            OutputMode::Json => print_json(record),
            OutputMode::Quiet => println!("{}", record.status),
            OutputMode::Normal => {
                println!("Deployment: {}", record.id);
                println!("Status:     {}", record.status);
                println!("Provider:   {} ({})", record.provider, record.region);
                println!("Branch:     {}", record.branch);
                if let Some(ip) = &record.public_ip {
                    println!("Public IP:  {ip}");
                }
                if let Some(url) = &record.public_url {
                    println!("URL:        {url}");
                }
                if let Some(secs) = record.deployment_time_seconds {
                    println!("Took:       {secs}s");
                }
                if let Some(err) = &record.error_message {
                    println!("Error:      {err}");
                }
            }
        }
    }

    /// Print raw log text, or a JSON object carrying it.
    pub fn logs(&self, snapshot: &impl Serialize, text: &str) {
        match self.mode {
            OutputMode::Json => print_json(snapshot),
            OutputMode::Normal | OutputMode::Quiet => print!("{text}"),
        }
    }
}

fn print_json(value: &impl Serialize) {
    if let Ok(json) = serde_json::to_string(value) {
        println!("{json}");
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct JsonWarning<'a> {
    event: &'a str,
    #[serde(flatten)]
    warning: &'a Warning,
}
