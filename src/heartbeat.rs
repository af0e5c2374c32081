//! Heartbeat timer.
//!
//! Fires at a fixed period and calls one external callback with no payload.
//! The callback runs in the timer service context (interrupt-like): it must
//! finish in bounded time and must not block.

use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicU32, Ordering};
use core::time::Duration;

use crate::error::SysError;
use crate::sys::PeriodicTimer;

/// Shortest accepted period, one scheduler tick.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// The current callback, a `fn()` cast to a data pointer. Null until the
/// first start.
static CALLBACK: AtomicPtr<()> = AtomicPtr::new(ptr::null_mut());
static FIRED: AtomicU32 = AtomicU32::new(0);

fn fire() {
    FIRED.fetch_add(1, Ordering::Relaxed);
    let raw = CALLBACK.load(Ordering::Acquire);
    if !raw.is_null() {
        // SAFETY: only ever stored from a `fn()` in `Heartbeat::start`.
        let callback = unsafe { core::mem::transmute::<*mut (), fn()>(raw) };
        callback();
    }
}

/// Running heartbeat. Stops when dropped.
pub struct Heartbeat {
    timer: PeriodicTimer,
    period: Duration,
}

impl Heartbeat {
    /// Start firing `callback` every `period`.
    ///
    /// There is one callback slot for the whole firmware: starting a second
    /// heartbeat replaces the callback of the first, which keeps firing into
    /// the new one until it is stopped.
    pub fn start(period: Duration, callback: fn()) -> Result<Self, SysError> {
        if period < MIN_PERIOD {
            return Err(SysError::InvalidArgument);
        }
        CALLBACK.store(callback as *mut (), Ordering::Release);
        let timer = PeriodicTimer::start(c"heartbeat", period, fire)?;
        Ok(Self { timer, period })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stop(&mut self) {
        self.timer.stop();
    }

    /// Total fires since boot.
    pub fn fired() -> u32 {
        FIRED.load(Ordering::Relaxed)
    }
}

/// Default liveness callback: the fire count itself is the signal.
pub fn liveness() {}
