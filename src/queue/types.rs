//! Queue bookkeeping types

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::NetError;
use crate::time::TimeRecorder;
use crate::transport::{Operation, Response, TransportHandle};

/// Identifier assigned at submission; later submissions get larger ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

pub(super) type ResultSender = oneshot::Sender<Result<Response, NetError>>;

/// A submitted task that has not started yet
pub(super) struct QueueEntry {
    pub id: TaskId,
    pub operation: Operation,
    pub submitted_at: Instant,
    pub result_tx: ResultSender,
}

/// A task currently holding a running slot
pub(super) struct RunningTask {
    pub handle: Arc<dyn TransportHandle>,
    /// Wakes the task's driver when the task is aborted
    pub abort: CancellationToken,
    pub time: Option<TimeRecorder>,
    pub started_at: Instant,
    pub url: String,
    pub jump: bool,
}

/// Statistics for the queue
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_submitted: u64,
    pub total_started: u64,
    pub total_completed: u64,
    pub total_aborted: u64,
    pub total_timed_out: u64,
    pub peak_concurrent: usize,
    pub peak_backlog: usize,
}

/// Queue state snapshot
#[derive(Debug, Clone)]
pub struct QueueState {
    pub running: usize,
    pub queued: usize,
    pub stats: QueueStats,
}

/// One task as reported by `queue_details`
#[derive(Debug, Clone)]
pub struct QueueEntryInfo {
    pub id: TaskId,
    pub url: String,
    pub jump: bool,
    pub status: QueueEntryStatus,
    /// Time queued for backlog entries, time running for running ones
    pub elapsed: Duration,
}

/// Status of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEntryStatus {
    Running,
    Queued,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_ordering_and_display() {
        assert!(TaskId(1) < TaskId(2));
        assert_eq!(TaskId(42).to_string(), "task-42");
    }
}
