//! Host backend: `std` primitives standing in for the RTOS.
//!
//! Interrupt context is simulated per thread. Code running inside
//! [`simulate_isr`] observes `in_isr() == true`, which is how tests drive the
//! completion callback and catch blocking calls from interrupt context.
//! Code inside [`no_preempt`] is tracked the same way, and a blocking wait
//! there halts, as the FreeRTOS scheduler asserts on the device.

use core::cell::Cell;
use core::ffi::CStr;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use std::sync::{Arc, OnceLock, PoisonError};
use std::time::Instant;

use super::SchedClass;
use crate::error::SysError;
use crate::thread::Lifecycle;

std::thread_local! {
    static IN_ISR: Cell<bool> = const { Cell::new(false) };
    static PREEMPT_OFF: Cell<bool> = const { Cell::new(false) };
}

/// Returns true when the calling context is (simulated) interrupt context.
#[inline]
pub fn in_isr() -> bool {
    IN_ISR.with(|flag| flag.get())
}

/// Run `f` as if it were an interrupt handler on the calling thread.
pub fn simulate_isr<R>(f: impl FnOnce() -> R) -> R {
    struct Restore(bool);
    impl Drop for Restore {
        fn drop(&mut self) {
            let prev = self.0;
            IN_ISR.with(|flag| flag.set(prev));
        }
    }

    let _restore = Restore(IN_ISR.with(|flag| flag.replace(true)));
    f()
}

/// Stop the device. On the host this panics so tests can observe it.
pub fn halt(reason: &dyn fmt::Display) -> ! {
    panic!("halt: {}", reason)
}

fn epoch() -> &'static Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now)
}

/// Monotonic microseconds since first use.
#[inline]
pub fn now_us() -> u64 {
    epoch().elapsed().as_micros() as u64
}

/// Put the calling thread to sleep.
pub fn sleep_ms(ms: u32) {
    std::thread::sleep(Duration::from_millis(ms as u64));
}

/// Give up the processor to any ready thread.
pub fn yield_now() {
    std::thread::yield_now();
}

/// Run `f` without being preempted by other threads.
///
/// The host scheduler cannot be suspended; the closure runs with a flag set
/// so that any blocking wait inside it halts. `f` must not block.
pub fn no_preempt<R>(f: impl FnOnce() -> R) -> R {
    struct Restore(bool);
    impl Drop for Restore {
        fn drop(&mut self) {
            let prev = self.0;
            PREEMPT_OFF.with(|flag| flag.set(prev));
        }
    }

    let _restore = Restore(PREEMPT_OFF.with(|flag| flag.replace(true)));
    f()
}

/// Returns true inside [`no_preempt`].
#[inline]
pub fn preempt_disabled() -> bool {
    PREEMPT_OFF.with(|flag| flag.get())
}

fn check_may_block(timeout: Duration) {
    if !timeout.is_zero() && preempt_disabled() {
        halt(&"blocking wait with the scheduler suspended");
    }
}

/// Point in time after which a blocking wait gives up.
#[derive(Clone, Copy, Debug)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// `Duration::MAX` means wait forever.
    pub fn after(timeout: Duration) -> Self {
        if timeout == Duration::MAX {
            return Deadline(None);
        }
        Deadline(Instant::now().checked_add(timeout))
    }

    /// Time left, `None` once expired. Forever deadlines report `Duration::MAX`.
    pub fn remaining(&self) -> Option<Duration> {
        match self.0 {
            None => Some(Duration::MAX),
            Some(at) => at.checked_duration_since(Instant::now()).filter(|d| !d.is_zero()),
        }
    }
}

/// Fixed-cadence wakeups for periodic workers.
pub struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    pub fn every(period: Duration) -> Self {
        Self {
            period,
            next: Instant::now() + period,
        }
    }

    /// Sleep until the next tick. Returns how many ticks were missed.
    pub fn wait(&mut self) -> u32 {
        let now = Instant::now();
        if now < self.next {
            std::thread::sleep(self.next - now);
            self.next += self.period;
            return 0;
        }

        // Behind schedule: skip the missed ticks rather than bursting.
        let behind = now - self.next;
        let missed = (behind.as_nanos() / self.period.as_nanos().max(1)) as u32;
        self.next += self.period * (missed + 1);
        missed
    }
}

/// Mutual exclusion between threads (not interrupts).
pub struct Mutex<T>(std::sync::Mutex<T>);

pub type MutexGuard<'a, T> = std::sync::MutexGuard<'a, T>;

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Self(std::sync::Mutex::new(value))
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        // A panicking holder already escalated through `halt`.
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Condition variable paired with [`Mutex`].
pub struct Condvar(std::sync::Condvar);

impl Condvar {
    pub fn new() -> Self {
        Self(std::sync::Condvar::new())
    }

    /// Release the guard and wait for a notification or `timeout`.
    /// `Duration::MAX` waits forever. Spurious wakeups are possible.
    pub fn wait_timeout<'a, T>(&self, guard: MutexGuard<'a, T>, timeout: Duration) -> MutexGuard<'a, T> {
        check_may_block(timeout);
        if timeout == Duration::MAX {
            return self.0.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
        match self.0.wait_timeout(guard, timeout) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    pub fn notify_one(&self) {
        self.0.notify_one();
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

/// Counting semaphore with an upper bound.
pub struct Semaphore {
    count: std::sync::Mutex<u32>,
    max: u32,
    available: std::sync::Condvar,
}

impl Semaphore {
    pub fn new(initial: u32, max: u32) -> Result<Self, SysError> {
        if max == 0 || initial > max {
            return Err(SysError::InvalidArgument);
        }
        Ok(Self {
            count: std::sync::Mutex::new(initial),
            max,
            available: std::sync::Condvar::new(),
        })
    }

    /// Take a permit, waiting up to `timeout`. Returns false on timeout.
    pub fn take(&self, timeout: Duration) -> bool {
        check_may_block(timeout);
        let deadline = Deadline::after(timeout);
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count == 0 {
            let Some(left) = deadline.remaining() else {
                return false;
            };
            count = if left == Duration::MAX {
                self.available.wait(count).unwrap_or_else(PoisonError::into_inner)
            } else {
                match self.available.wait_timeout(count, left) {
                    Ok((guard, _)) => guard,
                    Err(poisoned) => poisoned.into_inner().0,
                }
            };
        }
        *count -= 1;
        true
    }

    /// Return a permit. Returns false if the count is already at its bound.
    pub fn give(&self) -> bool {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        if *count >= self.max {
            return false;
        }
        *count += 1;
        self.available.notify_one();
        true
    }

    /// Interrupt-context variant of [`Semaphore::give`].
    pub fn give_from_isr(&self) -> bool {
        self.give()
    }

    pub fn count(&self) -> u32 {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Statically owned thread stack.
///
/// The host runtime allocates the real stack; this records the requested
/// size and makes sure a region backs at most one thread.
pub struct ThreadStack<const N: usize> {
    claimed: AtomicBool,
}

impl<const N: usize> ThreadStack<N> {
    pub const fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
        }
    }

    pub const fn size(&self) -> usize {
        N
    }

    fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }
}

/// Entry information handed to a new thread.
pub(crate) struct Launch {
    pub entry: fn(*mut ()) -> !,
    pub arg: *mut (),
    pub lifecycle: &'static Lifecycle,
}

// SAFETY: `arg` points to a `'static` worker handed over exclusively to the
// new thread.
unsafe impl Send for Launch {}

/// Start a thread on `stack`. `class` and `core` are recorded only.
pub(crate) fn start_thread<const N: usize>(
    stack: &'static ThreadStack<N>,
    name: &'static CStr,
    _class: SchedClass,
    _core: Option<u8>,
    launch: Launch,
) -> Result<(), SysError> {
    if !stack.claim() {
        return Err(SysError::StackInUse);
    }

    let name = name.to_str().unwrap_or("worker");
    std::thread::Builder::new()
        .name(name.into())
        .stack_size(N.max(64 * 1024))
        .spawn(move || {
            let launch = launch;
            launch.lifecycle.enter_running();
            (launch.entry)(launch.arg)
        })
        .map(|_| ())
        .map_err(|_| SysError::SpawnFailed)
}

/// Periodic timer invoking a plain function in (simulated) interrupt context.
pub struct PeriodicTimer {
    stop: Arc<AtomicBool>,
}

impl PeriodicTimer {
    pub fn start(name: &'static CStr, period: Duration, callback: fn()) -> Result<Self, SysError> {
        if period.is_zero() {
            return Err(SysError::InvalidArgument);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = stop.clone();
        std::thread::Builder::new()
            .name(name.to_str().unwrap_or("timer").into())
            .spawn(move || {
                let mut ticker = Ticker::every(period);
                while !stop2.load(Ordering::Acquire) {
                    ticker.wait();
                    if stop2.load(Ordering::Acquire) {
                        break;
                    }
                    simulate_isr(callback);
                }
            })
            .map_err(|_| SysError::TimerFailed(-1))?;

        Ok(Self { stop })
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
