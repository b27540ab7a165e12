//! Admission-controlled task queue
//!
//! Limits how many transport operations run at once. Extra submissions wait
//! in a FIFO backlog; `jump` submissions go to its front.

mod config;
mod core;
mod types;

pub use config::QueueConfig;
pub use core::{TaskFuture, TaskHandle, TaskQueue};
pub use types::{QueueEntryInfo, QueueEntryStatus, QueueState, QueueStats, TaskId};
