//! Wall-clock adapter.
//!
//! Implements the `Clock` trait from `conductor-core` over `chrono::Utc`.

use chrono::{DateTime, Utc};

use conductor_core::service::clock::Clock;

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
