//! Stop / wake signalling between producers and the worker loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// What ended a wait on the worker side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Stop,
    Wake,
    Timeout,
}

#[derive(Debug, Default)]
struct Flags {
    /// Auto-reset: consumed by the wait that observes it.
    wake: bool,
    /// Sticky once raised.
    stop: bool,
}

/// Debounced wake signal plus a sticky stop signal.
pub(crate) struct WakeSignal {
    flags: Mutex<Flags>,
    cond: Condvar,
    debounce: Duration,
    last_wake: Mutex<Option<Instant>>,
    delivered: AtomicU64,
}

impl WakeSignal {
    /// A zero `debounce` delivers every wake request.
    pub(crate) fn new(debounce: Duration) -> Self {
        Self {
            flags: Mutex::new(Flags::default()),
            cond: Condvar::new(),
            debounce,
            last_wake: Mutex::new(None),
            delivered: AtomicU64::new(0),
        }
    }

    /// Signal the worker that work may be pending.
    ///
    /// Returns `false` when the request was coalesced into a wake delivered
    /// less than `debounce` ago.
    pub(crate) fn request_wake(&self) -> bool {
        if !self.debounce.is_zero() {
            let mut last = self.last_wake.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            if let Some(previous) = *last {
                if now.duration_since(previous) < self.debounce {
                    return false;
                }
            }
            *last = Some(now);
        }

        let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        flags.wake = true;
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.cond.notify_one();
        true
    }

    pub(crate) fn stop(&self) {
        let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        flags.stop = true;
        self.cond.notify_all();
    }

    /// Block until stop, wake, or `timeout`. Stop wins over a pending wake.
    pub(crate) fn wait(&self, timeout: Duration) -> Signal {
        let flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut flags, _) = self
            .cond
            .wait_timeout_while(flags, timeout, |f| !f.stop && !f.wake)
            .unwrap_or_else(PoisonError::into_inner);

        if flags.stop {
            Signal::Stop
        } else if flags.wake {
            flags.wake = false;
            Signal::Wake
        } else {
            Signal::Timeout
        }
    }

    /// Number of wake requests that actually reached the worker.
    pub(crate) fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}
