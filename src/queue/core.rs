//! TaskQueue implementation

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Instant;

use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::QueueConfig;
use super::types::{
    QueueEntry, QueueEntryInfo, QueueEntryStatus, QueueState, QueueStats, ResultSender, RunningTask, TaskId,
};
use crate::error::NetError;
use crate::time::TimeRecorder;
use crate::transport::{
    Dispatch, HeadersCallback, Operation, OperationKind, ProgressCallback, Response, Transport, TransportHandle,
};

/// Internal state protected by mutex
struct QueueInner {
    /// Last assigned task id
    last_id: u64,

    /// Submitted but not started, front is admitted first
    backlog: VecDeque<QueueEntry>,

    /// Tasks holding a slot
    running: HashMap<TaskId, RunningTask>,

    stats: QueueStats,
}

/// State shared between the queue, its handles and the per-task drivers
struct Shared {
    max: usize,
    transport: Arc<dyn Transport>,
    inner: Mutex<QueueInner>,
}

/// Bounded-concurrency queue in front of a transport
///
/// At most `max_concurrent` operations are dispatched to the transport at
/// any time. Every running task is driven by a spawned tokio task, so
/// `submit` must be called from within a tokio runtime.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
}

impl TaskQueue {
    /// Create a new queue with the given configuration
    pub fn new(transport: Arc<dyn Transport>, config: QueueConfig) -> Self {
        debug!(?config, "TaskQueue::new: called");
        Self {
            shared: Arc::new(Shared {
                max: config.effective_max(),
                transport,
                inner: Mutex::new(QueueInner {
                    last_id: 0,
                    backlog: VecDeque::new(),
                    running: HashMap::new(),
                    stats: QueueStats::default(),
                }),
            }),
        }
    }

    /// Create a queue with `max_concurrent` slots
    pub fn with_max(transport: Arc<dyn Transport>, max_concurrent: usize) -> Self {
        Self::new(transport, QueueConfig::new(max_concurrent))
    }

    pub fn max_concurrent(&self) -> usize {
        self.shared.max
    }

    /// Submit an operation
    ///
    /// Starts it right away when a slot is free, otherwise parks it in the
    /// backlog (at the front when `operation.jump` is set). Never blocks.
    pub fn submit(&self, operation: Operation) -> (TaskHandle, TaskFuture) {
        let (result_tx, result_rx) = oneshot::channel();
        let kind = operation.kind;
        let mut inner = self.shared.lock();

        inner.last_id += 1;
        let id = TaskId(inner.last_id);
        inner.stats.total_submitted += 1;
        debug!(%id, url = %operation.url, jump = operation.jump, "TaskQueue::submit: called");

        let entry = QueueEntry {
            id,
            operation,
            submitted_at: Instant::now(),
            result_tx,
        };

        if inner.running.len() < self.shared.max {
            debug!(%id, "TaskQueue::submit: slot free, starting immediately");
            self.shared.start(&mut inner, entry);
        } else {
            if entry.operation.jump {
                debug!(%id, "TaskQueue::submit: at capacity, jumping the backlog");
                inner.backlog.push_front(entry);
            } else {
                debug!(%id, "TaskQueue::submit: at capacity, queuing");
                inner.backlog.push_back(entry);
            }
            inner.stats.peak_backlog = inner.stats.peak_backlog.max(inner.backlog.len());
        }
        drop(inner);

        let handle = TaskHandle {
            id,
            shared: Arc::clone(&self.shared),
        };
        let future = TaskFuture {
            id,
            kind,
            rx: result_rx,
            shared: Arc::clone(&self.shared),
            settled: false,
        };
        (handle, future)
    }

    /// Abort a task by id; returns false when it already finished
    pub fn abort(&self, id: TaskId) -> bool {
        self.shared.abort(id)
    }

    /// Get current queue state
    pub fn queue_state(&self) -> QueueState {
        let inner = self.shared.lock();
        QueueState {
            running: inner.running.len(),
            queued: inner.backlog.len(),
            stats: inner.stats.clone(),
        }
    }

    /// Running tasks first, then the backlog in admission order
    pub fn queue_details(&self) -> Vec<QueueEntryInfo> {
        let inner = self.shared.lock();
        let now = Instant::now();

        let mut running: Vec<_> = inner
            .running
            .iter()
            .map(|(id, task)| QueueEntryInfo {
                id: *id,
                url: task.url.clone(),
                jump: task.jump,
                status: QueueEntryStatus::Running,
                elapsed: now - task.started_at,
            })
            .collect();
        running.sort_by_key(|e| e.id);

        running
            .into_iter()
            .chain(inner.backlog.iter().map(|e| QueueEntryInfo {
                id: e.id,
                url: e.operation.url.clone(),
                jump: e.operation.jump,
                status: QueueEntryStatus::Queued,
                elapsed: now - e.submitted_at,
            }))
            .collect()
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.lock().stats.clone()
    }
}

impl Transport for TaskQueue {
    fn dispatch(&self, operation: Operation) -> Dispatch {
        let (handle, future) = self.submit(operation);
        Dispatch {
            handle: Arc::new(handle),
            completion: Box::pin(future) as BoxFuture<'static, Result<Response, NetError>>,
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move an entry into the running set and hand it to the transport
    fn start(self: &Arc<Self>, inner: &mut QueueInner, entry: QueueEntry) {
        let QueueEntry {
            id, operation, result_tx, ..
        } = entry;
        debug!(%id, url = %operation.url, "TaskQueue::start: called");

        let kind = operation.kind;
        let url = operation.url.clone();
        let jump = operation.jump;
        let time = operation.timestamp.then(TimeRecorder::start);
        let deadline = operation
            .timeout
            .filter(|t| !t.is_zero())
            .map(|t| tokio::time::Instant::now() + t);
        let on_progress = operation.on_progress_update.clone();
        let on_headers = operation.on_headers_received.clone();

        let Dispatch { handle, completion } = self.transport.dispatch(operation);

        if let Some(callback) = on_progress
            && handle.supports_progress()
        {
            handle.on_progress_update(callback);
        }
        if let Some(callback) = on_headers {
            handle.on_headers_received(callback);
        }

        let abort = CancellationToken::new();
        inner.running.insert(
            id,
            RunningTask {
                handle: Arc::clone(&handle),
                abort: abort.clone(),
                time,
                started_at: Instant::now(),
                url,
                jump,
            },
        );
        inner.stats.total_started += 1;
        inner.stats.peak_concurrent = inner.stats.peak_concurrent.max(inner.running.len());

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            shared
                .drive(id, kind, completion, handle, abort, deadline, result_tx)
                .await;
        });
    }

    /// Wait for a running task to settle, then update bookkeeping and report
    #[allow(clippy::too_many_arguments)]
    async fn drive(
        self: Arc<Self>,
        id: TaskId,
        kind: OperationKind,
        completion: BoxFuture<'static, Result<Response, NetError>>,
        handle: Arc<dyn TransportHandle>,
        abort: CancellationToken,
        deadline: Option<tokio::time::Instant>,
        result_tx: ResultSender,
    ) {
        let outcome = match deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    result = completion => result,
                    _ = abort.cancelled() => Err(NetError::aborted(kind, None)),
                    _ = tokio::time::sleep_until(deadline) => {
                        debug!(%id, "TaskQueue::drive: timeout fired, aborting transport");
                        handle.abort();
                        Err(NetError::timed_out(kind))
                    }
                }
            }
            None => {
                tokio::select! {
                    biased;
                    result = completion => result,
                    _ = abort.cancelled() => Err(NetError::aborted(kind, None)),
                }
            }
        };

        let timed_out = matches!(&outcome, Err(e) if e.is_timeout());
        let result = match self.finish(id, timed_out) {
            Some(Some(time)) => outcome
                .map(|mut response| {
                    response.time = Some(time);
                    response
                })
                .map_err(|err| err.with_time(time)),
            Some(None) => outcome,
            // Removed by an explicit abort, which already admitted the next entry
            None => Err(NetError::aborted(kind, None)),
        };

        if result_tx.send(result).is_err() {
            debug!(%id, "TaskQueue::drive: result receiver dropped");
        }
    }

    /// Release the slot of a finished task
    ///
    /// Returns `None` when the task was already removed by `abort`.
    fn finish(self: &Arc<Self>, id: TaskId, timed_out: bool) -> Option<Option<TimeRecorder>> {
        let mut inner = self.lock();
        let Some(task) = inner.running.remove(&id) else {
            debug!(%id, "TaskQueue::finish: not in running set");
            return None;
        };

        inner.stats.total_completed += 1;
        if timed_out {
            inner.stats.total_timed_out += 1;
        }
        let time = task.time.map(|mut t| {
            t.stamp_response();
            t
        });

        self.next(&mut inner);
        Some(time)
    }

    /// Admit one backlog entry if a slot is free
    fn next(self: &Arc<Self>, inner: &mut QueueInner) {
        if inner.running.len() >= self.max {
            return;
        }
        if let Some(entry) = inner.backlog.pop_front() {
            debug!(id = %entry.id, "TaskQueue::next: promoting from backlog");
            self.start(inner, entry);
        } else {
            debug!("TaskQueue::next: backlog empty, nothing to promote");
        }
    }

    fn abort(self: &Arc<Self>, id: TaskId) -> bool {
        debug!(%id, "TaskQueue::abort: called");
        let mut inner = self.lock();

        if let Some(pos) = inner.backlog.iter().position(|e| e.id == id) {
            let Some(entry) = inner.backlog.remove(pos) else {
                return false;
            };
            inner.stats.total_aborted += 1;
            drop(inner);

            debug!(%id, "TaskQueue::abort: removed from backlog");
            let err = NetError::aborted(entry.operation.kind, None);
            if entry.result_tx.send(Err(err)).is_err() {
                debug!(%id, "TaskQueue::abort: result receiver dropped");
            }
            return true;
        }

        if let Some(task) = inner.running.remove(&id) {
            debug!(%id, "TaskQueue::abort: aborting running task");
            task.handle.abort();
            task.abort.cancel();
            inner.stats.total_aborted += 1;
            self.next(&mut inner);
            return true;
        }

        debug!(%id, "TaskQueue::abort: unknown or finished task");
        false
    }

    fn bind_progress(&self, id: TaskId, callback: ProgressCallback) {
        let mut inner = self.lock();
        if let Some(entry) = inner.backlog.iter_mut().find(|e| e.id == id) {
            entry.operation.on_progress_update = Some(callback);
        } else if let Some(task) = inner.running.get(&id) {
            if task.handle.supports_progress() {
                task.handle.on_progress_update(callback);
            } else {
                warn!(%id, "TaskQueue: transport handle does not report progress");
            }
        }
    }

    fn bind_headers(&self, id: TaskId, callback: HeadersCallback) {
        let mut inner = self.lock();
        if let Some(entry) = inner.backlog.iter_mut().find(|e| e.id == id) {
            entry.operation.on_headers_received = Some(callback);
        } else if let Some(task) = inner.running.get(&id) {
            task.handle.on_headers_received(callback);
        }
    }

    fn status(&self, id: TaskId) -> Option<QueueEntryStatus> {
        let inner = self.lock();
        if inner.running.contains_key(&id) {
            Some(QueueEntryStatus::Running)
        } else if inner.backlog.iter().any(|e| e.id == id) {
            Some(QueueEntryStatus::Queued)
        } else {
            None
        }
    }
}

/// Caller's handle to one submitted task
///
/// Valid whether or not the task has started: before start, callback
/// bindings rebind the pending entry; afterwards they go to the live
/// transport handle.
#[derive(Clone)]
pub struct TaskHandle {
    id: TaskId,
    shared: Arc<Shared>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Abort the task; a no-op once it has finished or was already aborted
    pub fn abort(&self) -> bool {
        self.shared.abort(self.id)
    }

    pub fn on_progress_update(&self, callback: ProgressCallback) {
        self.shared.bind_progress(self.id, callback);
    }

    pub fn on_headers_received(&self, callback: HeadersCallback) {
        self.shared.bind_headers(self.id, callback);
    }

    /// `None` once the task has finished
    pub fn status(&self) -> Option<QueueEntryStatus> {
        self.shared.status(self.id)
    }
}

impl TransportHandle for TaskHandle {
    fn abort(&self) {
        TaskHandle::abort(self);
    }

    fn supports_progress(&self) -> bool {
        true
    }

    fn on_progress_update(&self, callback: ProgressCallback) {
        TaskHandle::on_progress_update(self, callback);
    }

    fn on_headers_received(&self, callback: HeadersCallback) {
        TaskHandle::on_headers_received(self, callback);
    }
}

/// Settles with the task's outcome
///
/// Dropping it before it settles aborts the task, so an abandoned call
/// never keeps its slot.
pub struct TaskFuture {
    id: TaskId,
    kind: OperationKind,
    rx: oneshot::Receiver<Result<Response, NetError>>,
    shared: Arc<Shared>,
    settled: bool,
}

impl TaskFuture {
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl Future for TaskFuture {
    type Output = Result<Response, NetError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let kind = this.kind;
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(received) => {
                this.settled = true;
                Poll::Ready(received.unwrap_or_else(|_| Err(NetError::transport(kind, "task dropped"))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for TaskFuture {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        // Admitting the next entry spawns its driver, which needs a runtime
        if tokio::runtime::Handle::try_current().is_err() {
            warn!(id = %self.id, "TaskFuture::drop: no runtime, task left to finish on its own");
            return;
        }
        debug!(id = %self.id, "TaskFuture::drop: dropped before settling, aborting");
        self.shared.abort(self.id);
    }
}
