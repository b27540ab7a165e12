//! Send/response timestamps for tasks that request them

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Unix-epoch millisecond timestamps for one task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRecorder {
    pub send: Option<i64>,
    pub response: Option<i64>,
}

impl TimeRecorder {
    /// Recorder with `send` stamped now
    pub fn start() -> Self {
        Self {
            send: Some(now_millis()),
            response: None,
        }
    }

    /// Stamp `response` with the current time
    pub fn stamp_response(&mut self) {
        self.response = Some(now_millis());
    }

    /// Time between send and response, once both are known
    pub fn elapsed(&self) -> Option<Duration> {
        match (self.send, self.response) {
            (Some(send), Some(response)) => Some(Duration::from_millis(response.saturating_sub(send).max(0) as u64)),
            _ => None,
        }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
