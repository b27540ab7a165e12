//! Network task error types

use std::fmt::Display;

use thiserror::Error;

use crate::time::TimeRecorder;
use crate::transport::OperationKind;

/// Errors that can settle a network task
///
/// Every variant carries the human-readable `err_msg` that callers see.
/// Timeouts and aborts are transport failures with an extra marker.
/// Failures that reached the transport keep the task's timestamps when the
/// caller asked for them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetError {
    #[error("{err_msg}")]
    Transport {
        err_msg: String,
        status_code: Option<u16>,
        time: Option<TimeRecorder>,
    },

    #[error("{err_msg}")]
    Timeout { err_msg: String, time: Option<TimeRecorder> },

    #[error("{err_msg}")]
    Aborted { err_msg: String, reason: Option<String> },

    #[error("Transform failed: {0}")]
    Transform(String),

    /// Local file access failed (download destination, upload source)
    #[error("{err_msg}")]
    Io { err_msg: String, time: Option<TimeRecorder> },
}

impl NetError {
    /// Transport failure with the `<prefix>:fail <detail>` message shape
    pub fn transport(kind: OperationKind, detail: impl Display) -> Self {
        NetError::Transport {
            err_msg: format!("{}:fail {}", kind.err_prefix(), detail),
            status_code: None,
            time: None,
        }
    }

    /// Transport failure caused by an unacceptable HTTP status
    pub fn status(kind: OperationKind, status_code: u16) -> Self {
        NetError::Transport {
            err_msg: format!("{}:fail status {}", kind.err_prefix(), status_code),
            status_code: Some(status_code),
            time: None,
        }
    }

    /// Timeout failure for a task of the given kind
    pub fn timed_out(kind: OperationKind) -> Self {
        NetError::Timeout {
            err_msg: timeout_message(&format!("{}:fail abort", kind.err_prefix())),
            time: None,
        }
    }

    /// Cancellation failure (`request:fail abort` for plain requests)
    pub fn aborted(kind: OperationKind, reason: Option<String>) -> Self {
        NetError::Aborted {
            err_msg: format!("{}:fail abort", kind.err_prefix()),
            reason,
        }
    }

    /// Local file failure for a task of the given kind
    pub fn io(kind: OperationKind, err: &std::io::Error) -> Self {
        NetError::Io {
            err_msg: format!("{}:fail {}", kind.err_prefix(), err),
            time: None,
        }
    }

    /// Failure raised by a send or response transform
    pub fn transform(detail: impl Display) -> Self {
        NetError::Transform(detail.to_string())
    }

    /// The caller-visible error message
    pub fn err_msg(&self) -> String {
        match self {
            NetError::Transport { err_msg, .. }
            | NetError::Timeout { err_msg, .. }
            | NetError::Aborted { err_msg, .. }
            | NetError::Io { err_msg, .. } => err_msg.clone(),
            NetError::Transform(_) => self.to_string(),
        }
    }

    /// True when the task was aborted by its timeout timer
    pub fn is_timeout(&self) -> bool {
        matches!(self, NetError::Timeout { .. })
    }

    /// True when the task was cancelled (handle abort or cancel token)
    pub fn is_cancel(&self) -> bool {
        matches!(self, NetError::Aborted { .. })
    }

    /// Aborts are final; everything else goes back through the retry counter
    pub fn is_retryable(&self) -> bool {
        !self.is_cancel()
    }

    /// HTTP status that caused the failure, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            NetError::Transport { status_code, .. } => *status_code,
            _ => None,
        }
    }

    /// Send/response timestamps of the failed task, when recorded
    pub fn time(&self) -> Option<TimeRecorder> {
        match self {
            NetError::Transport { time, .. } | NetError::Timeout { time, .. } | NetError::Io { time, .. } => *time,
            NetError::Aborted { .. } | NetError::Transform(_) => None,
        }
    }

    /// Attach timestamps; aborts and transform failures never carry them
    pub fn with_time(mut self, recorded: TimeRecorder) -> Self {
        match &mut self {
            NetError::Transport { time, .. } | NetError::Timeout { time, .. } | NetError::Io { time, .. } => {
                *time = Some(recorded);
            }
            NetError::Aborted { .. } | NetError::Transform(_) => {}
        }
        self
    }
}

/// Rewrite a failure message as `<prefix>: timeout`
pub fn timeout_message(err_msg: &str) -> String {
    let prefix = err_msg.split(':').next().unwrap_or_default();
    format!("{}: timeout", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_message() {
        let err = NetError::aborted(OperationKind::Request, None);
        assert_eq!(err.err_msg(), "request:fail abort");
        assert!(err.is_cancel());
        assert!(!err.is_timeout());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_timeout_message_keeps_prefix() {
        assert_eq!(timeout_message("downloadFile:fail abort"), "downloadFile: timeout");
        assert_eq!(timeout_message(""), ": timeout");

        let err = NetError::timed_out(OperationKind::Request);
        assert_eq!(err.err_msg(), "request: timeout");
        assert!(err.is_timeout());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_transport_and_status() {
        let err = NetError::transport(OperationKind::Upload, "connection refused");
        assert_eq!(err.err_msg(), "uploadFile:fail connection refused");
        assert_eq!(err.status_code(), None);

        let err = NetError::status(OperationKind::Request, 503);
        assert_eq!(err.status_code(), Some(503));
        assert!(err.err_msg().contains("503"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_io_failure() {
        let err = NetError::io(
            OperationKind::Download,
            &std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        );
        assert_eq!(err.err_msg(), "downloadFile:fail read-only");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_time_attaches_to_transport_failures() {
        let time = TimeRecorder {
            send: Some(10),
            response: Some(30),
        };

        let err = NetError::timed_out(OperationKind::Request).with_time(time);
        assert_eq!(err.time(), Some(time));
        assert_eq!(err.err_msg(), "request: timeout");

        assert_eq!(NetError::status(OperationKind::Request, 500).with_time(time).time(), Some(time));
        assert_eq!(NetError::aborted(OperationKind::Request, None).with_time(time).time(), None);
        assert_eq!(NetError::transform("x").with_time(time).time(), None);
    }

    #[test]
    fn test_transform_display() {
        let err = NetError::transform("bad payload");
        assert_eq!(err.to_string(), "Transform failed: bad payload");
        assert_eq!(err.err_msg(), "Transform failed: bad payload");
        assert!(err.is_retryable());
    }
}
