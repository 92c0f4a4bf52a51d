//! Counting admission gate
//!
//! Bounds how many optimizations run at once. Workers take a permit with a
//! timeout; the permit returns its slot when dropped.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct GateState {
    available: usize,
    closed: bool,
}

/// Counting semaphore with timed acquisition
#[derive(Debug)]
pub struct AdmissionGate {
    state: Mutex<GateState>,
    released: Condvar,
    capacity: usize,
}

impl AdmissionGate {
    /// Create a gate with `capacity` slots (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(GateState {
                available: capacity,
                closed: false,
            }),
            released: Condvar::new(),
            capacity,
        }
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently held
    pub fn available(&self) -> usize {
        self.state.lock().available
    }

    /// Take a slot, waiting at most `timeout`
    ///
    /// Returns `None` on timeout or once the gate is closed.
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<GatePermit<'_>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if state.available > 0 {
                state.available -= 1;
                return Some(GatePermit { gate: self });
            }
            if self.released.wait_until(&mut state, deadline).timed_out() {
                if !state.closed && state.available > 0 {
                    state.available -= 1;
                    return Some(GatePermit { gate: self });
                }
                return None;
            }
        }
    }

    /// Refuse all further acquisitions and wake every waiter
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.released.notify_all();
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.available = (state.available + 1).min(self.capacity);
        drop(state);
        self.released.notify_one();
    }
}

/// A held gate slot
#[derive(Debug)]
pub struct GatePermit<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
