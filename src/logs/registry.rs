// ABOUTME: Registry of in-memory log buffers keyed by deployment.
// ABOUTME: Explicit open/dispose lifecycle with generation-checked disposal.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::DeploymentId;

/// One deployment's buffered lines.
///
/// The mutex serialises every append and read for this deployment. Other
/// deployments have their own buffer and never touch this lock.
#[derive(Debug)]
struct LogBuffer {
    generation: u64,
    lines: Mutex<Vec<String>>,
}

/// Writer-side handle to a buffer opened by [`LogRegistry::open`].
///
/// Holding the handle lets a writer append without going through the
/// registry map.
#[derive(Debug, Clone)]
pub struct BufferHandle {
    id: DeploymentId,
    buffer: Arc<LogBuffer>,
}

impl BufferHandle {
    pub fn deployment_id(&self) -> &DeploymentId {
        &self.id
    }

    /// Append one fully formatted line.
    pub fn push(&self, line: String) {
        self.buffer.lines.lock().push(line);
    }

    pub fn len(&self) -> usize {
        self.buffer.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive right to run one deployment. Released on drop.
#[derive(Debug)]
pub struct RunClaim {
    id: DeploymentId,
    runs: Arc<Mutex<HashSet<DeploymentId>>>,
}

impl RunClaim {
    pub fn deployment_id(&self) -> &DeploymentId {
        &self.id
    }
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        self.runs.lock().remove(&self.id);
    }
}

/// Process-wide registry of live log buffers.
///
/// Created once and shared (behind an `Arc`) by the orchestrator and every
/// stream consumer. The map lock is only held long enough to look up or
/// replace an entry.
#[derive(Debug, Default)]
pub struct LogRegistry {
    buffers: Mutex<HashMap<DeploymentId, Arc<LogBuffer>>>,
    runs: Arc<Mutex<HashSet<DeploymentId>>>,
    next_generation: AtomicU64,
}

impl LogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a fresh, empty buffer for a run of `id`.
    ///
    /// Any buffer left over from an earlier run of the same deployment is
    /// replaced; that run's pending disposal then becomes a no-op.
    pub fn open(&self, id: &DeploymentId) -> BufferHandle {
        let buffer = Arc::new(LogBuffer {
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            lines: Mutex::new(Vec::new()),
        });
        self.buffers.lock().insert(id.clone(), Arc::clone(&buffer));
        tracing::debug!(deployment_id = %id, generation = buffer.generation, "opened log buffer");
        BufferHandle {
            id: id.clone(),
            buffer,
        }
    }

    /// Claim `id` for one run. `None` while another claim on `id` is held.
    pub fn claim(&self, id: &DeploymentId) -> Option<RunClaim> {
        if !self.runs.lock().insert(id.clone()) {
            return None;
        }
        Some(RunClaim {
            id: id.clone(),
            runs: Arc::clone(&self.runs),
        })
    }

    /// Whether a run of `id` holds its claim.
    pub fn is_running(&self, id: &DeploymentId) -> bool {
        self.runs.lock().contains(id)
    }

    /// Lines appended after `last_position`, and the position to ask for next.
    ///
    /// Returns `("", 0)` when no buffer exists (never opened or already
    /// disposed). Callers treat that as "no more updates".
    pub fn read_since(&self, id: &DeploymentId, last_position: usize) -> (String, usize) {
        let Some(buffer) = self.lookup(id) else {
            return (String::new(), 0);
        };

        let lines = buffer.lines.lock();
        let start = last_position.min(lines.len());
        (lines[start..].concat(), lines.len())
    }

    /// Current buffer length, if a buffer is live.
    pub fn position(&self, id: &DeploymentId) -> Option<usize> {
        self.lookup(id).map(|buffer| buffer.lines.lock().len())
    }

    /// Whether a run of `id` currently owns a buffer.
    pub fn is_active(&self, id: &DeploymentId) -> bool {
        self.buffers.lock().contains_key(id)
    }

    /// Drop the buffer opened for `handle`, unless a newer run replaced it.
    ///
    /// Returns true if the buffer was removed.
    pub fn dispose(&self, handle: &BufferHandle) -> bool {
        let mut buffers = self.buffers.lock();
        let current = buffers
            .get(&handle.id)
            .is_some_and(|buffer| buffer.generation == handle.buffer.generation);
        if current {
            buffers.remove(&handle.id);
            tracing::debug!(deployment_id = %handle.id, "disposed log buffer");
        }
        current
    }

    fn lookup(&self, id: &DeploymentId) -> Option<Arc<LogBuffer>> {
        self.buffers.lock().get(id).cloned()
    }
}
