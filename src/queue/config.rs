//! Queue configuration

use serde::{Deserialize, Serialize};

/// Queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Max concurrent transport operations (0 falls back to the default)
    #[serde(rename = "max-concurrent", default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_concurrent() -> usize {
    10
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl QueueConfig {
    pub fn new(max_concurrent: usize) -> Self {
        Self { max_concurrent }
    }

    /// The running-set bound actually enforced
    pub fn effective_max(&self) -> usize {
        if self.max_concurrent == 0 {
            default_max_concurrent()
        } else {
            self.max_concurrent
        }
    }
}
