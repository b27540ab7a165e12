//! Scriptable transport for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    Dispatch, Headers, HeadersCallback, Operation, Progress, ProgressCallback, Response, Transport, TransportHandle,
};
use crate::error::NetError;

/// How the mock answers a dispatch
#[derive(Debug, Clone)]
pub enum MockReply {
    Ok(Response),
    Fail(String),
    /// Succeed after a delay
    Delay(Duration, Response),
    /// Never complete on its own; settles with an abort failure once aborted
    Hang,
}

pub struct MockHandle {
    token: CancellationToken,
    aborts: AtomicUsize,
    progress: Mutex<Option<ProgressCallback>>,
    headers: Mutex<Option<HeadersCallback>>,
}

impl MockHandle {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            aborts: AtomicUsize::new(0),
            progress: Mutex::new(None),
            headers: Mutex::new(None),
        }
    }

    pub fn abort_count(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    pub fn has_progress_callback(&self) -> bool {
        self.progress.lock().unwrap().is_some()
    }

    pub fn has_headers_callback(&self) -> bool {
        self.headers.lock().unwrap().is_some()
    }

    /// Fire the attached progress callback, if any
    pub fn emit_progress(&self, progress: Progress) {
        let callback = self.progress.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(progress);
        }
    }

    pub fn emit_headers(&self, headers: &Headers) {
        let callback = self.headers.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(headers);
        }
    }
}

impl TransportHandle for MockHandle {
    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        self.token.cancel();
    }

    fn supports_progress(&self) -> bool {
        true
    }

    fn on_progress_update(&self, callback: ProgressCallback) {
        *self.progress.lock().unwrap() = Some(callback);
    }

    fn on_headers_received(&self, callback: HeadersCallback) {
        *self.headers.lock().unwrap() = Some(callback);
    }
}

/// Mock transport with per-URL replies and call accounting
pub struct MockTransport {
    default: MockReply,
    replies: HashMap<String, MockReply>,
    calls: AtomicUsize,
    active: Arc<AtomicUsize>,
    peak_active: Arc<AtomicUsize>,
    dispatched: Mutex<Vec<(String, Arc<MockHandle>)>>,
}

impl MockTransport {
    pub fn new(default: MockReply) -> Self {
        debug!(?default, "MockTransport::new: called");
        Self {
            default,
            replies: HashMap::new(),
            calls: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
            peak_active: Arc::new(AtomicUsize::new(0)),
            dispatched: Mutex::new(Vec::new()),
        }
    }

    pub fn ok() -> Self {
        Self::new(MockReply::Ok(Response::new(200, serde_json::json!({"ok": true}))))
    }

    pub fn failing(err_msg: &str) -> Self {
        Self::new(MockReply::Fail(err_msg.to_string()))
    }

    pub fn with_reply(mut self, url: &str, reply: MockReply) -> Self {
        self.replies.insert(url.to_string(), reply);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    /// URLs in dispatch order
    pub fn started(&self) -> Vec<String> {
        self.dispatched.lock().unwrap().iter().map(|(url, _)| url.clone()).collect()
    }

    /// Handle of the most recent dispatch of `url`
    pub fn handle(&self, url: &str) -> Option<Arc<MockHandle>> {
        self.dispatched
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(u, _)| u == url)
            .map(|(_, h)| Arc::clone(h))
    }
}

/// Decrements the active counter when the completion future finishes or is dropped
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    fn dispatch(&self, operation: Operation) -> Dispatch {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now_active, Ordering::SeqCst);

        let handle = Arc::new(MockHandle::new());
        self.dispatched
            .lock()
            .unwrap()
            .push((operation.url.clone(), Arc::clone(&handle)));

        let reply = self
            .replies
            .get(&operation.url)
            .cloned()
            .unwrap_or_else(|| self.default.clone());
        let kind = operation.kind;
        let token = handle.token.clone();
        let guard = ActiveGuard(Arc::clone(&self.active));

        let completion = async move {
            let _guard = guard;
            match reply {
                MockReply::Ok(response) => Ok(response),
                MockReply::Fail(msg) => Err(NetError::transport(kind, msg)),
                MockReply::Delay(delay, response) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => Ok(response),
                        _ = token.cancelled() => Err(NetError::transport(kind, "abort")),
                    }
                }
                MockReply::Hang => {
                    token.cancelled().await;
                    Err(NetError::transport(kind, "abort"))
                }
            }
        }
        .boxed();

        Dispatch { handle, completion }
    }
}
