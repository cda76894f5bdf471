// ABOUTME: Appends deployment log lines to the record and the live buffer.
// ABOUTME: Persistence is best-effort; the buffer append always happens.

use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::model::DeploymentRecord;
use crate::store::DeploymentStore;

use super::{BufferHandle, LogLevel, format_line};

/// The writing side of one deployment's log pipeline.
///
/// Appends take `&mut DeploymentRecord`, so there is exactly one writer per
/// record and the persisted log and the buffer receive lines in the same
/// order.
pub struct DeploymentLog {
    store: Arc<dyn DeploymentStore>,
    buffer: BufferHandle,
    persist_failures: AtomicUsize,
}

impl std::fmt::Debug for DeploymentLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentLog")
            .field("deployment_id", self.buffer.deployment_id())
            .field("persist_failures", &self.persist_failures)
            .finish()
    }
}

impl DeploymentLog {
    pub fn new(store: Arc<dyn DeploymentStore>, buffer: BufferHandle) -> Self {
        Self {
            store,
            buffer,
            persist_failures: AtomicUsize::new(0),
        }
    }

    pub fn buffer(&self) -> &BufferHandle {
        &self.buffer
    }

    /// Format `message`, append it to the record's log and the live buffer,
    /// then persist the record.
    ///
    /// A failed save is logged and counted but never returned: a flaky store
    /// must not abort the phase that produced the line.
    pub async fn append(&self, record: &mut DeploymentRecord, level: LogLevel, message: &str) {
        let line = format_line(Utc::now(), level, message);
        record.logs.push_str(&line);
        self.buffer.push(line);

        mirror_to_tracing(record, level, message);

        if let Err(e) = self.store.save_deployment(record).await {
            self.persist_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                deployment_id = %record.id,
                error = %e,
                "failed to persist deployment log line"
            );
        }
    }

    pub async fn info(&self, record: &mut DeploymentRecord, message: &str) {
        self.append(record, LogLevel::Info, message).await;
    }

    pub async fn debug(&self, record: &mut DeploymentRecord, message: &str) {
        self.append(record, LogLevel::Debug, message).await;
    }

    /// Number of lines that reached the buffer but not the store.
    pub fn persistence_failures(&self) -> usize {
        self.persist_failures.load(Ordering::Relaxed)
    }
}

fn mirror_to_tracing(record: &DeploymentRecord, level: LogLevel, message: &str) {
    let id = &record.id;
    match level {
        LogLevel::Debug => tracing::debug!(deployment_id = %id, "{message}"),
        LogLevel::Info | LogLevel::Success => tracing::info!(deployment_id = %id, "{message}"),
        LogLevel::Warn => tracing::warn!(deployment_id = %id, "{message}"),
        LogLevel::Error => tracing::error!(deployment_id = %id, "{message}"),
    }
}
