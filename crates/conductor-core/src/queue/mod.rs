//! Task queue: worker leasing, retry with backoff, dead-lettering.
//!
//! - `backoff` -- exponential retry delay computation
//! - `manager` -- queue lifecycle, task admission, leasing, completion and
//!   failure handling

pub mod backoff;
pub mod manager;

pub use manager::{QueueError, TaskQueueManager};
