//! Caller options, pipeline defaults and the per-call request context

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::transform::transform_send_default;
use crate::cancel::CancelToken;
use crate::config::DefaultsConfig;
use crate::error::NetError;
use crate::transport::{Headers, HeadersCallback, Method, Operation, OperationKind, Progress, ProgressCallback, Response};

/// Turns caller options into the transport's operation
pub type SendTransform = Arc<dyn Fn(&RequestOptions) -> Result<Operation, NetError> + Send + Sync>;

/// Post-processes a successful response; an error sends the call down the failure path
pub type ResponseTransform = Arc<dyn Fn(Response, &RequestOptions) -> Result<Response, NetError> + Send + Sync>;

/// Everything a caller can say about one network call
///
/// Unset fields inherit the pipeline's [`Defaults`].
#[derive(Clone, Default)]
pub struct RequestOptions {
    pub kind: OperationKind,
    pub url: String,
    pub method: Option<Method>,
    pub base_url: Option<String>,
    /// Values for `{key}` placeholders in `url`
    pub params: BTreeMap<String, String>,
    pub header: Headers,
    pub data: Option<Value>,
    pub local_path: Option<PathBuf>,
    /// Upload form field name
    pub name: Option<String>,

    /// Total attempts, at least 1
    pub retry: Option<u32>,
    pub timeout: Option<Duration>,
    pub jump: Option<bool>,
    pub timestamp: Option<bool>,
    pub transform_send: Option<SendTransform>,
    pub transform_response: Option<ResponseTransform>,
    pub cancel_token: Option<CancelToken>,
    pub on_progress_update: Option<ProgressCallback>,
    pub on_headers_received: Option<HeadersCallback>,
}

impl RequestOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: OperationKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_jump(mut self, jump: bool) -> Self {
        self.jump = Some(jump);
        self
    }

    pub fn with_timestamp(mut self, timestamp: bool) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn with_transform_send(
        mut self,
        f: impl Fn(&RequestOptions) -> Result<Operation, NetError> + Send + Sync + 'static,
    ) -> Self {
        self.transform_send = Some(Arc::new(f));
        self
    }

    pub fn with_transform_response(
        mut self,
        f: impl Fn(Response, &RequestOptions) -> Result<Response, NetError> + Send + Sync + 'static,
    ) -> Self {
        self.transform_response = Some(Arc::new(f));
        self
    }

    pub fn on_progress_update(mut self, f: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.on_progress_update = Some(Arc::new(f));
        self
    }

    pub fn on_headers_received(mut self, f: impl Fn(&Headers) + Send + Sync + 'static) -> Self {
        self.on_headers_received = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("kind", &self.kind)
            .field("url", &self.url)
            .field("method", &self.method)
            .field("base_url", &self.base_url)
            .field("params", &self.params)
            .field("header", &self.header)
            .field("data", &self.data)
            .field("local_path", &self.local_path)
            .field("name", &self.name)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("jump", &self.jump)
            .field("timestamp", &self.timestamp)
            .field("transform_send", &self.transform_send.is_some())
            .field("transform_response", &self.transform_response.is_some())
            .field("cancel_token", &self.cancel_token)
            .finish_non_exhaustive()
    }
}

/// Per-pipeline defaults
#[derive(Clone)]
pub struct Defaults {
    pub base_url: Option<String>,
    pub header: Headers,
    pub method: Method,
    /// Total attempts, at least 1
    pub retry: u32,
    pub timeout: Option<Duration>,
    pub jump: bool,
    pub timestamp: bool,
    pub transform_send: SendTransform,
    /// `None` returns responses unchanged
    pub transform_response: Option<ResponseTransform>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            base_url: None,
            header: Headers::new(),
            method: Method::Get,
            retry: 1,
            timeout: None,
            jump: false,
            timestamp: false,
            transform_send: Arc::new(transform_send_default),
            transform_response: None,
        }
    }
}

impl Defaults {
    pub fn with_transform_response(
        mut self,
        f: impl Fn(Response, &RequestOptions) -> Result<Response, NetError> + Send + Sync + 'static,
    ) -> Self {
        self.transform_response = Some(Arc::new(f));
        self
    }
}

impl From<&DefaultsConfig> for Defaults {
    fn from(config: &DefaultsConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            header: config.header.clone(),
            method: config.method,
            retry: config.retry.max(1),
            timeout: config.timeout(),
            jump: config.jump,
            timestamp: config.timestamp,
            ..Default::default()
        }
    }
}

impl fmt::Debug for Defaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Defaults")
            .field("base_url", &self.base_url)
            .field("header", &self.header)
            .field("method", &self.method)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("jump", &self.jump)
            .field("timestamp", &self.timestamp)
            .field("transform_response", &self.transform_response.is_some())
            .finish_non_exhaustive()
    }
}

/// Pipeline-owned state for one call
///
/// `options` are the caller's options merged over the defaults; the caller's
/// own value is never touched again. `remaining` counts attempts left.
pub(crate) struct RequestContext {
    pub options: RequestOptions,
    pub remaining: u32,
}

impl RequestContext {
    pub fn new(mut options: RequestOptions, defaults: &Defaults) -> Self {
        debug!(url = %options.url, "RequestContext::new: merging defaults");
        if options.base_url.is_none() {
            options.base_url = defaults.base_url.clone();
        }
        let mut header = defaults.header.clone();
        header.append(&mut options.header);
        options.header = header;
        options.method = options.method.or(Some(defaults.method));
        options.retry = Some(options.retry.unwrap_or(defaults.retry).max(1));
        options.timeout = options.timeout.or(defaults.timeout);
        options.jump = options.jump.or(Some(defaults.jump));
        options.timestamp = options.timestamp.or(Some(defaults.timestamp));

        let remaining = options.retry.unwrap_or(1);
        Self { options, remaining }
    }

    /// Use up one attempt; true when another one is allowed
    pub fn consume_attempt(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining > 0
    }
}
