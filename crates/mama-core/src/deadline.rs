//! Cooperative deadlines and cancellation.
//!
//! Long operations (candidate scans, graph traversal, cleanup batches) check
//! the deadline between units of work and abort cleanly with `Timeout` or
//! `Cancelled`. Point operations ignore it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{MamaError, Result};

/// Optional deadline plus cancellation flag, checked cooperatively.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    at: Option<Instant>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Deadline {
    /// No deadline, no cancellation. Checks always pass.
    pub fn none() -> Self {
        Self::default()
    }

    /// Deadline this many milliseconds from now.
    pub fn after_millis(ms: u64) -> Self {
        Self {
            at: Some(Instant::now() + Duration::from_millis(ms)),
            cancel: None,
        }
    }

    /// Attach a cancellation flag. Setting the flag to `true` makes the next
    /// check fail with `Cancelled`.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Fail with `Cancelled` or `Timeout` if either condition holds.
    /// `context` names the operation for the timeout message.
    pub fn check(&self, context: &str) -> Result<()> {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Relaxed) {
                return Err(MamaError::Cancelled);
            }
        }
        if let Some(at) = self.at {
            if Instant::now() >= at {
                return Err(MamaError::Timeout(context.to_string()));
            }
        }
        Ok(())
    }
}
