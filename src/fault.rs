//! Fatal fault handling.
//!
//! # Philosophy
//!
//! > A corrupted report stream is worse than a dead keyboard.
//! > If a primitive is misused, record why and stop.
//!
//! Context violations mean the scheduler's own invariants (interrupt
//! nesting, lock ownership) may already be broken. There is no partial
//! recovery: the reason is recorded here, logged, and the device halts.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::error::ContextViolation;
use crate::{sys, RT_LOG_STREAM};

/// Process-wide fault record, readable after the fact (debugger, host tests).
pub static FAULT: FaultState = FaultState::new();

/// Thread-safe fault state.
///
/// Written once on the way down by [`halt`]. Atomics only, so it is safe
/// from interrupt context and while the critical section is held.
pub struct FaultState {
    /// True if a fault was recorded.
    active: AtomicBool,

    /// Raw [`ContextViolation`] value.
    code: AtomicU8,

    /// Timestamp of the fault in microseconds since boot (truncated).
    at_us: AtomicU32,

    /// Total fault count since boot (never cleared).
    count: AtomicU32,
}

impl FaultState {
    /// Create new fault state (no fault).
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            code: AtomicU8::new(0),
            at_us: AtomicU32::new(0),
            count: AtomicU32::new(0),
        }
    }

    /// Record a violation.
    #[inline]
    pub fn set(&self, violation: ContextViolation, at_us: u64) {
        self.code.store(violation as u8, Ordering::Release);
        self.at_us.store(at_us as u32, Ordering::Release);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.active.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Recorded violation, `None` if no fault is active.
    #[inline]
    pub fn violation(&self) -> Option<ContextViolation> {
        if !self.is_active() {
            return None;
        }
        ContextViolation::from_u8(self.code.load(Ordering::Acquire))
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Get a snapshot of the current fault state.
    #[inline]
    pub fn snapshot(&self) -> FaultSnapshot {
        FaultSnapshot {
            violation: self.violation(),
            at_us: self.at_us.load(Ordering::Acquire),
            count: self.count(),
        }
    }
}

impl Default for FaultState {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of fault state at a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaultSnapshot {
    pub violation: Option<ContextViolation>,
    pub at_us: u32,
    pub count: u32,
}

/// Record `violation`, log it and stop the device.
///
/// Never returns. On the host backend the stop is a panic carrying the
/// violation text, which is what `#[should_panic]` tests match on.
#[cold]
pub fn halt(violation: ContextViolation) -> ! {
    let now = sys::now_us();
    FAULT.set(violation, now);
    crate::rt_error!(RT_LOG_STREAM, now, "FAULT {}", violation);
    sys::halt(&violation)
}
