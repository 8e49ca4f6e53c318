//! Expiration signal (C4).
//!
//! A counting wake-up primitive: `post` is idempotent with respect to
//! aggregation (any number of posts before a `wait` collapse into "wake up
//! once"), and `wait` blocks until the count is positive, then decrements
//! it. Posted from the OS timer callback thread, from the arm-time race
//! mitigation in [`crate::timer`], and from teardown.

use parking_lot::{Condvar, Mutex};

pub struct ExpirationSignal {
    count: Mutex<u64>,
    condvar: Condvar,
}

impl ExpirationSignal {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            condvar: Condvar::new(),
        }
    }

    /// Wakes one waiter (or primes the next `wait` if nobody is currently
    /// waiting). Safe to call from any thread, including the OS timer
    /// callback thread.
    pub fn post(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_add(1);
        self.condvar.notify_one();
    }

    /// Blocks until a post is pending, then consumes exactly one.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.condvar.wait(&mut count);
        }
        *count -= 1;
    }
}

impl Default for ExpirationSignal {
    fn default() -> Self {
        Self::new()
    }
}
