// ABOUTME: Live log subscription for one deployment.
// ABOUTME: Emits initial, update, heartbeat, final, and error events.

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::model::{DeploymentRecord, DeploymentStatus};
use crate::store::{DeploymentStore, StoreError, with_timeout};
use crate::types::DeploymentId;

use super::LogRegistry;

/// Boxed stream of events for one subscriber.
pub type LogStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// One event delivered to a log subscriber. Serialized with a `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Persisted log at the moment of attaching.
    Initial {
        logs: String,
        status: DeploymentStatus,
    },
    /// Lines appended since the previous event.
    Update {
        logs: String,
        status: DeploymentStatus,
    },
    /// Nothing new this poll.
    Heartbeat {
        status: DeploymentStatus,
        timestamp: DateTime<Utc>,
    },
    /// Terminal status reached. Always the last event of a healthy stream.
    Final {
        status: DeploymentStatus,
        public_url: Option<String>,
        completed: bool,
    },
    /// A poll failed. The stream keeps going until the error budget is spent.
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl StreamEvent {
    pub fn is_final(&self) -> bool {
        matches!(self, StreamEvent::Final { .. })
    }
}

/// Polling behaviour for subscribers.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub poll_interval: Duration,
    /// Deadline for each record refresh.
    pub read_timeout: Duration,
    /// Consecutive failed polls after which the stream gives up.
    pub max_consecutive_errors: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            read_timeout: Duration::from_secs(3),
            max_consecutive_errors: 5,
        }
    }
}

struct Subscriber {
    id: DeploymentId,
    store: Arc<dyn DeploymentStore>,
    registry: Arc<LogRegistry>,
    settings: StreamSettings,
    cursor: usize,
    sent_initial: bool,
    consecutive_errors: u32,
    polled_once: bool,
    pending: VecDeque<StreamEvent>,
    done: bool,
}

impl Subscriber {
    async fn poll(&mut self) {
        // Taken before the record is read: a line landing in between shows up
        // twice rather than not at all.
        let position_before_read = self.registry.position(&self.id);

        let refreshed = with_timeout(
            "stream_refresh",
            self.settings.read_timeout,
            self.store.get_deployment(&self.id),
        )
        .await;

        match refreshed {
            Ok(record) => {
                self.consecutive_errors = 0;
                self.on_record(record, position_before_read);
            }
            Err(StoreError::NotFound(_)) => {
                tracing::debug!(deployment_id = %self.id, "deployment vanished, closing stream");
                self.done = true;
            }
            Err(e) => self.on_error(&e),
        }
    }

    fn on_record(&mut self, record: DeploymentRecord, position_before_read: Option<usize>) {
        let mut delivered = false;

        if !self.sent_initial {
            self.cursor = position_before_read.unwrap_or(0);
            self.sent_initial = true;
            delivered = true;
            self.pending.push_back(StreamEvent::Initial {
                logs: record.logs.clone(),
                status: record.status,
            });
        } else {
            let (logs, position) = self.registry.read_since(&self.id, self.cursor);
            self.cursor = position;
            if !logs.is_empty() {
                delivered = true;
                self.pending.push_back(StreamEvent::Update {
                    logs,
                    status: record.status,
                });
            }
        }

        if record.status.is_terminal() {
            self.pending.push_back(StreamEvent::Final {
                status: record.status,
                public_url: record.public_url,
                completed: true,
            });
            self.done = true;
        } else if !delivered {
            self.pending.push_back(StreamEvent::Heartbeat {
                status: record.status,
                timestamp: Utc::now(),
            });
        }
    }

    fn on_error(&mut self, error: &StoreError) {
        self.consecutive_errors += 1;
        tracing::warn!(
            deployment_id = %self.id,
            attempt = self.consecutive_errors,
            error = %error,
            "log stream poll failed"
        );
        self.pending.push_back(StreamEvent::Error {
            message: format!(
                "Streaming error (attempt {}): {}",
                self.consecutive_errors, error
            ),
            timestamp: Utc::now(),
        });

        if self.consecutive_errors >= self.settings.max_consecutive_errors {
            self.pending.push_back(StreamEvent::Error {
                message: "Too many consecutive errors, stopping stream".to_string(),
                timestamp: Utc::now(),
            });
            self.done = true;
        }
    }
}

/// Subscribe to a deployment's log.
///
/// Each subscriber tracks its own buffer position, so any number of them can
/// attach at different times.
pub fn subscribe(
    id: DeploymentId,
    store: Arc<dyn DeploymentStore>,
    registry: Arc<LogRegistry>,
    settings: StreamSettings,
) -> LogStream {
    let subscriber = Subscriber {
        id,
        store,
        registry,
        settings,
        cursor: 0,
        sent_initial: false,
        consecutive_errors: 0,
        polled_once: false,
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(futures::stream::unfold(subscriber, |mut sub| async move {
        loop {
            if let Some(event) = sub.pending.pop_front() {
                return Some((event, sub));
            }
            if sub.done {
                return None;
            }
            if sub.polled_once {
                tokio::time::sleep(sub.settings.poll_interval).await;
            }
            sub.polled_once = true;
            sub.poll().await;
        }
    }))
}
