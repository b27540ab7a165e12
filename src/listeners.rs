//! Lifecycle observers
//!
//! Observers are grouped by stage and run synchronously, in registration
//! order, on the task that drives the request. A panicking observer is
//! logged and skipped; the remaining observers and the request carry on.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::error::NetError;
use crate::lifecycle::RequestOptions;
use crate::transport::Response;

pub type SendListener = Arc<dyn Fn(&RequestOptions) + Send + Sync>;
pub type ResponseListener = Arc<dyn Fn(&Response, &RequestOptions) + Send + Sync>;
pub type RejectedListener = Arc<dyn Fn(&NetError, &RequestOptions) + Send + Sync>;
pub type CompleteListener = Arc<dyn Fn(&Result<Response, NetError>, &RequestOptions) + Send + Sync>;
pub type AbortListener = Arc<dyn Fn(&str, &RequestOptions) + Send + Sync>;

/// Lifecycle stage an observer is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerStage {
    Send,
    Response,
    Rejected,
    Complete,
    Abort,
}

impl fmt::Display for ListenerStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send => write!(f, "before-send"),
            Self::Response => write!(f, "after-response"),
            Self::Rejected => write!(f, "on-rejected"),
            Self::Complete => write!(f, "on-complete"),
            Self::Abort => write!(f, "on-abort"),
        }
    }
}

/// Observer registry for one pipeline
#[derive(Default)]
pub struct EventListeners {
    on_send: RwLock<Vec<SendListener>>,
    on_response: RwLock<Vec<ResponseListener>>,
    on_rejected: RwLock<Vec<RejectedListener>>,
    on_complete: RwLock<Vec<CompleteListener>>,
    on_abort: RwLock<Vec<AbortListener>>,
}

impl EventListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with observers that log every stage via tracing
    pub fn with_tracing() -> Self {
        let listeners = Self::new();
        listeners
            .on_send(|options| {
                debug!(kind = %options.kind, url = %options.url, "request: sending");
            })
            .on_response(|response, options| {
                debug!(url = %options.url, status_code = response.status_code, "request: response received");
            })
            .on_rejected(|err, options| {
                warn!(url = %options.url, error = %err, "request: rejected");
            })
            .on_complete(|result, options| {
                debug!(url = %options.url, ok = result.is_ok(), "request: attempt complete");
            })
            .on_abort(|reason, options| {
                info!(url = %options.url, %reason, "request: aborted");
            });
        listeners
    }

    /// Observe options right before dispatch
    pub fn on_send(&self, f: impl Fn(&RequestOptions) + Send + Sync + 'static) -> &Self {
        push(&self.on_send, Arc::new(f) as SendListener);
        self
    }

    /// Observe raw successful responses, before the response-transform
    pub fn on_response(&self, f: impl Fn(&Response, &RequestOptions) + Send + Sync + 'static) -> &Self {
        push(&self.on_response, Arc::new(f) as ResponseListener);
        self
    }

    /// Observe final failures
    pub fn on_rejected(&self, f: impl Fn(&NetError, &RequestOptions) + Send + Sync + 'static) -> &Self {
        push(&self.on_rejected, Arc::new(f) as RejectedListener);
        self
    }

    /// Observe every attempt's raw outcome, after the after-response observers
    pub fn on_complete(
        &self,
        f: impl Fn(&Result<Response, NetError>, &RequestOptions) + Send + Sync + 'static,
    ) -> &Self {
        push(&self.on_complete, Arc::new(f) as CompleteListener);
        self
    }

    /// Observe cancellations with their reason
    pub fn on_abort(&self, f: impl Fn(&str, &RequestOptions) + Send + Sync + 'static) -> &Self {
        push(&self.on_abort, Arc::new(f) as AbortListener);
        self
    }

    /// Number of observers registered for a stage
    pub fn count(&self, stage: ListenerStage) -> usize {
        match stage {
            ListenerStage::Send => snapshot(&self.on_send).len(),
            ListenerStage::Response => snapshot(&self.on_response).len(),
            ListenerStage::Rejected => snapshot(&self.on_rejected).len(),
            ListenerStage::Complete => snapshot(&self.on_complete).len(),
            ListenerStage::Abort => snapshot(&self.on_abort).len(),
        }
    }

    pub(crate) fn emit_send(&self, options: &RequestOptions) {
        for listener in snapshot(&self.on_send) {
            guard(ListenerStage::Send, || listener(options));
        }
    }

    pub(crate) fn emit_response(&self, response: &Response, options: &RequestOptions) {
        for listener in snapshot(&self.on_response) {
            guard(ListenerStage::Response, || listener(response, options));
        }
    }

    pub(crate) fn emit_rejected(&self, err: &NetError, options: &RequestOptions) {
        for listener in snapshot(&self.on_rejected) {
            guard(ListenerStage::Rejected, || listener(err, options));
        }
    }

    pub(crate) fn emit_complete(&self, result: &Result<Response, NetError>, options: &RequestOptions) {
        for listener in snapshot(&self.on_complete) {
            guard(ListenerStage::Complete, || listener(result, options));
        }
    }

    pub(crate) fn emit_abort(&self, reason: &str, options: &RequestOptions) {
        for listener in snapshot(&self.on_abort) {
            guard(ListenerStage::Abort, || listener(reason, options));
        }
    }
}

fn push<T>(lock: &RwLock<Vec<T>>, listener: T) {
    lock.write().unwrap_or_else(PoisonError::into_inner).push(listener);
}

// Copy out so observers may register more observers while running
fn snapshot<T: Clone>(lock: &RwLock<Vec<T>>) -> Vec<T> {
    lock.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn guard(stage: ListenerStage, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        warn!(%stage, %message, "listener panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_registration_order() {
        let listeners = EventListeners::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let seen = Arc::clone(&seen);
            listeners.on_send(move |_| seen.lock().unwrap().push(i));
        }

        listeners.emit_send(&RequestOptions::new("/a"));
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(listeners.count(ListenerStage::Send), 3);
        assert_eq!(listeners.count(ListenerStage::Abort), 0);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let listeners = EventListeners::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let after = Arc::clone(&seen);

        listeners
            .on_abort(|_, _| panic!("observer bug"))
            .on_abort(move |reason, _| after.lock().unwrap().push(reason.to_string()));

        listeners.emit_abort("user cancelled", &RequestOptions::new("/a"));
        assert_eq!(*seen.lock().unwrap(), vec!["user cancelled".to_string()]);
    }

    #[test]
    fn test_stages_are_independent() {
        let listeners = EventListeners::new();
        let hits = Arc::new(Mutex::new(Vec::new()));

        let h = Arc::clone(&hits);
        listeners.on_response(move |r, _| h.lock().unwrap().push(format!("response {}", r.status_code)));
        let h = Arc::clone(&hits);
        listeners.on_rejected(move |e, _| h.lock().unwrap().push(format!("rejected {}", e.err_msg())));
        let h = Arc::clone(&hits);
        listeners.on_complete(move |r, _| h.lock().unwrap().push(format!("complete {}", r.is_ok())));

        let options = RequestOptions::new("/a");
        listeners.emit_response(&Response::new(201, serde_json::Value::Null), &options);
        listeners.emit_rejected(&NetError::transform("boom"), &options);
        listeners.emit_complete(&Ok(Response::default()), &options);

        assert_eq!(
            *hits.lock().unwrap(),
            vec![
                "response 201".to_string(),
                "rejected Transform failed: boom".to_string(),
                "complete true".to_string(),
            ]
        );
    }

    #[test]
    fn test_listener_can_register_listener() {
        let listeners = Arc::new(EventListeners::new());
        let inner = Arc::clone(&listeners);
        listeners.on_send(move |_| {
            inner.on_send(|_| {});
        });

        listeners.emit_send(&RequestOptions::new("/a"));
        assert_eq!(listeners.count(ListenerStage::Send), 2);
    }

    #[test]
    fn test_with_tracing_registers_every_stage() {
        let listeners = EventListeners::with_tracing();
        for stage in [
            ListenerStage::Send,
            ListenerStage::Response,
            ListenerStage::Rejected,
            ListenerStage::Complete,
            ListenerStage::Abort,
        ] {
            assert_eq!(listeners.count(stage), 1, "stage {}", stage);
        }
    }
}
