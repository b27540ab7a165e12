//! Request lifecycle
//!
//! [`LifeCycle`] wraps a transport with option merging, send/response
//! transforms, retries, cancellation and observer events.

mod core;
mod options;
mod transform;

pub use core::LifeCycle;
pub use options::{Defaults, RequestOptions, ResponseTransform, SendTransform};
pub use transform::{transform_response_ok_data, transform_send_default};
