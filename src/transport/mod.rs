//! Transport contract
//!
//! A transport takes one [`Operation`] and returns a [`Dispatch`]: a live
//! handle that can be aborted and observed, plus a future that settles with
//! the outcome. The [`TaskQueue`](crate::queue::TaskQueue) is itself a
//! transport, as is the [`CachedTransport`] decorator, so they compose.

mod cache;
mod http;
#[cfg(test)]
pub(crate) mod mock;

pub use cache::{CacheConfig, CachedTransport};
pub use http::HttpTransport;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::NetError;
use crate::time::TimeRecorder;

/// Header map (ordered so cache keys and logs are stable)
pub type Headers = BTreeMap<String, String>;

/// Progress notification callback
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// Headers-received notification callback
pub type HeadersCallback = Arc<dyn Fn(&Headers) + Send + Sync>;

/// What the transport is asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    #[default]
    Request,
    Download,
    Upload,
}

impl OperationKind {
    /// Prefix used in failure messages (`request:fail ...`)
    pub fn err_prefix(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Download => "downloadFile",
            Self::Upload => "uploadFile",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Download => write!(f, "download"),
            Self::Upload => write!(f, "upload"),
        }
    }
}

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Options,
    #[default]
    Get,
    Head,
    Post,
    Put,
    Delete,
    Trace,
    Connect,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Options => "OPTIONS",
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
            Self::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OPTIONS" => Ok(Self::Options),
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "TRACE" => Ok(Self::Trace),
            "CONNECT" => Ok(Self::Connect),
            "PATCH" => Ok(Self::Patch),
            _ => Err(format!("Unknown method: {}", s)),
        }
    }
}

/// Transfer progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Percentage, 0-100
    pub progress: u8,
    pub total_bytes: u64,
    pub total_bytes_expected: Option<u64>,
}

impl Progress {
    pub fn new(total_bytes: u64, total_bytes_expected: Option<u64>) -> Self {
        let progress = match total_bytes_expected {
            Some(0) | None => 0,
            Some(expected) => ((total_bytes.min(expected) * 100) / expected) as u8,
        };
        Self {
            progress,
            total_bytes,
            total_bytes_expected,
        }
    }
}

/// Concrete input for one transport call
///
/// Produced by the send-transform. The queue reads `timeout`, `jump`,
/// `timestamp` and the callbacks; transports ignore them.
#[derive(Clone, Default)]
pub struct Operation {
    pub kind: OperationKind,
    pub url: String,
    pub method: Method,
    pub header: Headers,
    pub data: Option<serde_json::Value>,
    /// Download destination or upload source
    pub local_path: Option<PathBuf>,
    /// Upload form field name
    pub name: Option<String>,
    pub form_data: BTreeMap<String, String>,

    pub timeout: Option<Duration>,
    pub jump: bool,
    pub timestamp: bool,
    pub on_progress_update: Option<ProgressCallback>,
    pub on_headers_received: Option<HeadersCallback>,
}

impl Operation {
    pub fn new(kind: OperationKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_jump(mut self, jump: bool) -> Self {
        self.jump = jump;
        self
    }

    pub fn with_timestamp(mut self, timestamp: bool) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("kind", &self.kind)
            .field("url", &self.url)
            .field("method", &self.method)
            .field("header", &self.header)
            .field("data", &self.data)
            .field("local_path", &self.local_path)
            .field("name", &self.name)
            .field("form_data", &self.form_data)
            .field("timeout", &self.timeout)
            .field("jump", &self.jump)
            .field("timestamp", &self.timestamp)
            .field("on_progress_update", &self.on_progress_update.is_some())
            .field("on_headers_received", &self.on_headers_received.is_some())
            .finish()
    }
}

/// Successful transport result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status_code: u16,
    pub header: Headers,
    pub data: serde_json::Value,
    /// Where a download was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    /// Present only when the task asked for timestamps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeRecorder>,
}

impl Response {
    pub fn new(status_code: u16, data: serde_json::Value) -> Self {
        Self {
            status_code,
            data,
            ..Default::default()
        }
    }

    /// True for 2xx statuses
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Deserialize `data` into a typed value
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, NetError> {
        debug!(status_code = self.status_code, "Response::json: called");
        serde_json::from_value(self.data.clone()).map_err(NetError::transform)
    }
}

/// Live handle to an in-flight transport call
pub trait TransportHandle: Send + Sync {
    /// Stop the call; must be idempotent
    fn abort(&self);

    /// Whether `on_progress_update` does anything
    fn supports_progress(&self) -> bool {
        false
    }

    fn on_progress_update(&self, _callback: ProgressCallback) {}

    fn on_headers_received(&self, callback: HeadersCallback);
}

/// Handle for results that never touched a live transport (cache hits)
pub struct NoopHandle;

impl TransportHandle for NoopHandle {
    fn abort(&self) {}

    fn on_headers_received(&self, _callback: HeadersCallback) {}
}

/// Outcome of handing one operation to a transport
pub struct Dispatch {
    pub handle: Arc<dyn TransportHandle>,
    pub completion: BoxFuture<'static, Result<Response, NetError>>,
}

/// The primitive that actually performs network operations
///
/// `dispatch` returns immediately. It must not call back into a queue that
/// dispatches to it, since the queue holds its lock while dispatching.
pub trait Transport: Send + Sync {
    fn dispatch(&self, operation: Operation) -> Dispatch;
}
