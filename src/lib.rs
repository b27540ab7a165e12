//! netqueue - bounded-concurrency network tasks with a request lifecycle
//!
//! Network operations (requests, downloads, uploads) go through a
//! [`TaskQueue`] that caps how many run at once, and a [`LifeCycle`] that
//! adds option defaults, send/response transforms, retries, timeouts,
//! cancellation tokens and observer events on top.
//!
//! # Modules
//!
//! - [`queue`] - Admission-controlled task queue
//! - [`lifecycle`] - Request pipeline with retry and cancellation
//! - [`transport`] - Transport contract, HTTP transport and response cache
//! - [`client`] - `Http`, `Downloader` and `Uploader` entry points
//! - [`listeners`] - Lifecycle observers
//! - [`config`] - Configuration types and loading
//! - [`logging`] - tracing subscriber setup

pub mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod listeners;
pub mod logging;
pub mod queue;
pub mod time;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use client::{Downloader, Http, Network, Uploader, build_transport};
pub use config::{DefaultsConfig, NetConfig};
pub use error::NetError;
pub use lifecycle::{
    Defaults, LifeCycle, RequestOptions, ResponseTransform, SendTransform, transform_response_ok_data,
    transform_send_default,
};
pub use listeners::{EventListeners, ListenerStage};
pub use queue::{QueueConfig, QueueEntryInfo, QueueEntryStatus, QueueState, QueueStats, TaskHandle, TaskId, TaskQueue};
pub use time::TimeRecorder;
pub use transport::{
    CacheConfig, CachedTransport, Dispatch, Headers, HttpTransport, Method, Operation, OperationKind, Progress,
    Response, Transport, TransportHandle,
};
pub use utils::build_params;
