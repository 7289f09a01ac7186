use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Why the per-step check asked the loop to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    Timeout,
}

/// Cooperative stop check run between decode steps.
///
/// Looks at the cancel flag first, then at the wall clock. Nothing here can
/// interrupt a step already in progress.
pub struct StopControl<'a> {
    cancel: &'a AtomicBool,
    started: Instant,
    timeout: Duration,
}

impl<'a> StopControl<'a> {
    /// Start the clock now.
    pub fn start(cancel: &'a AtomicBool, timeout: Duration) -> Self {
        Self {
            cancel,
            started: Instant::now(),
            timeout,
        }
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn check(&self) -> Option<Interrupt> {
        if self.cancel.load(Ordering::Relaxed) {
            return Some(Interrupt::Cancelled);
        }
        if past_deadline(self.elapsed(), self.timeout) {
            return Some(Interrupt::Timeout);
        }
        None
    }
}

/// Deadlines are compared in whole milliseconds.
fn past_deadline(elapsed: Duration, timeout: Duration) -> bool {
    elapsed.as_millis() > timeout.as_millis()
}
