//! FreeRTOS backend (ESP-IDF).
//!
//! Mutexes and semaphores are FreeRTOS queue objects created once at
//! startup and never deleted. A condition variable is a binary semaphore:
//! every queue in this firmware has a single waiter per condition, so a
//! latched signal cannot be lost and spurious wakeups are handled by the
//! caller's predicate loop.

use core::cell::UnsafeCell;
use core::ffi::{c_void, CStr};
use core::fmt;
use core::mem::MaybeUninit;
use core::ops::{Deref, DerefMut};
use core::ptr;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use esp_idf_svc::hal::{interrupt, task};
use esp_idf_svc::sys::{
    self, configMAX_PRIORITIES, configTICK_RATE_HZ, esp_timer_create, esp_timer_create_args_t,
    esp_timer_delete, esp_timer_dispatch_t_ESP_TIMER_TASK, esp_timer_handle_t,
    esp_timer_start_periodic, esp_timer_stop, tskNO_AFFINITY, BaseType_t, QueueHandle_t,
    StackType_t, StaticTask_t, TickType_t, ESP_OK,
};

use super::{duration_ms, SchedClass};
use crate::error::SysError;
use crate::thread::Lifecycle;

const QUEUE_TYPE_MUTEX: u8 = 1;
const QUEUE_SEND_TO_BACK: BaseType_t = 0;
const PD_TRUE: BaseType_t = 1;
const BLOCK: TickType_t = TickType_t::MAX;

fn ms_to_ticks(ms: u32) -> TickType_t {
    if ms == 0 {
        return 0;
    }
    let ticks = (ms as u64 * configTICK_RATE_HZ as u64) / 1000;
    ticks.clamp(1, (TickType_t::MAX - 1) as u64) as TickType_t
}

fn ticks_to_ms(ticks: TickType_t) -> u64 {
    ticks as u64 * 1000 / configTICK_RATE_HZ as u64
}

fn timeout_ticks(timeout: Duration) -> TickType_t {
    if timeout == Duration::MAX {
        BLOCK
    } else {
        ms_to_ticks(duration_ms(timeout))
    }
}

/// Returns true when called from an interrupt handler.
#[inline]
pub fn in_isr() -> bool {
    interrupt::active()
}

/// Stop the device: print the reason on the ROM console and abort.
pub fn halt(reason: &dyn fmt::Display) -> ! {
    let mut buf = [0u8; 128];
    let len = crate::logging::format_to_buffer(&mut buf[..127], format_args!("HALT: {}\n", reason));
    buf[len] = 0;
    unsafe {
        sys::esp_rom_printf(b"%s\0".as_ptr() as *const _, buf.as_ptr());
        sys::abort()
    }
}

/// Monotonic microseconds since boot.
#[inline]
pub fn now_us() -> u64 {
    unsafe { sys::esp_timer_get_time() as u64 }
}

pub fn sleep_ms(ms: u32) {
    unsafe { sys::vTaskDelay(ms_to_ticks(ms)) }
}

pub fn yield_now() {
    task::do_yield();
}

/// `taskSCHEDULER_SUSPENDED`; a cast macro, so bindgen does not emit it.
const SCHEDULER_SUSPENDED: BaseType_t = 0;

/// Run `f` with this core's scheduler suspended.
///
/// Interrupts keep running; no other task on this core is switched in until
/// `f` returns. `f` must not block: any semaphore, queue or delay with a
/// non-zero timeout trips a FreeRTOS assert while the scheduler is
/// suspended. Driver calls that wait for hardware (RMT `start`, UART
/// `write`) belong outside.
#[inline]
pub fn no_preempt<R>(f: impl FnOnce() -> R) -> R {
    unsafe { sys::vTaskSuspendAll() };
    let result = f();
    unsafe { sys::xTaskResumeAll() };
    result
}

/// Returns true inside [`no_preempt`].
#[inline]
pub fn preempt_disabled() -> bool {
    unsafe { sys::xTaskGetSchedulerState() == SCHEDULER_SUSPENDED }
}

/// Point in time after which a blocking wait gives up.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    start: TickType_t,
    ticks: TickType_t,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            start: unsafe { sys::xTaskGetTickCount() },
            ticks: timeout_ticks(timeout),
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        if self.ticks == BLOCK {
            return Some(Duration::MAX);
        }
        let elapsed = unsafe { sys::xTaskGetTickCount() }.wrapping_sub(self.start);
        if elapsed >= self.ticks {
            return None;
        }
        Some(Duration::from_millis(ticks_to_ms(self.ticks - elapsed).max(1)))
    }
}

/// Fixed-cadence wakeups for periodic workers.
pub struct Ticker {
    period: TickType_t,
    last_wake: TickType_t,
}

impl Ticker {
    pub fn every(period: Duration) -> Self {
        Self {
            period: ms_to_ticks(duration_ms(period)).max(1),
            last_wake: unsafe { sys::xTaskGetTickCount() },
        }
    }

    /// Sleep until the next tick. Returns 1 if the tick was already late.
    pub fn wait(&mut self) -> u32 {
        let delayed = unsafe { sys::xTaskDelayUntil(&mut self.last_wake, self.period) };
        if delayed == PD_TRUE {
            0
        } else {
            1
        }
    }
}

/// Thread mutex (FreeRTOS mutex with priority inheritance).
pub struct Mutex<T> {
    handle: QueueHandle_t,
    data: UnsafeCell<T>,
}

// SAFETY: the FreeRTOS mutex serializes every access to `data`.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

#[must_use = "if unused the Mutex will immediately unlock"]
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        let handle = unsafe { sys::xQueueCreateMutex(QUEUE_TYPE_MUTEX) };
        if handle.is_null() {
            halt(&SysError::OutOfMemory);
        }
        Self {
            handle,
            data: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.raw_lock();
        MutexGuard { mutex: self }
    }

    fn raw_lock(&self) {
        if unsafe { sys::xQueueSemaphoreTake(self.handle, BLOCK) } != PD_TRUE {
            halt(&"mutex take failed");
        }
    }

    fn raw_unlock(&self) {
        unsafe {
            sys::xQueueGenericSend(self.handle, ptr::null(), 0, QUEUE_SEND_TO_BACK);
        }
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.mutex.raw_unlock();
    }
}

/// Single-waiter condition variable.
pub struct Condvar {
    signal: Semaphore,
}

impl Condvar {
    pub fn new() -> Self {
        match Semaphore::new(0, 1) {
            Ok(signal) => Self { signal },
            Err(e) => halt(&e),
        }
    }

    /// Release the guard and wait for a notification or `timeout`.
    pub fn wait_timeout<'a, T>(&self, guard: MutexGuard<'a, T>, timeout: Duration) -> MutexGuard<'a, T> {
        let mutex = guard.mutex;
        core::mem::forget(guard);
        mutex.raw_unlock();
        let _ = self.signal.take(timeout);
        mutex.raw_lock();
        MutexGuard { mutex }
    }

    pub fn notify_one(&self) {
        let _ = self.signal.give();
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

/// Counting semaphore with an upper bound.
pub struct Semaphore {
    handle: QueueHandle_t,
}

// SAFETY: FreeRTOS semaphores are safe to use from any task or ISR.
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    pub fn new(initial: u32, max: u32) -> Result<Self, SysError> {
        if max == 0 || initial > max {
            return Err(SysError::InvalidArgument);
        }
        let handle = unsafe { sys::xQueueCreateCountingSemaphore(max, initial) };
        if handle.is_null() {
            return Err(SysError::OutOfMemory);
        }
        Ok(Self { handle })
    }

    pub fn take(&self, timeout: Duration) -> bool {
        unsafe { sys::xQueueSemaphoreTake(self.handle, timeout_ticks(timeout)) == PD_TRUE }
    }

    /// Fails (returns false) when the count is already at its bound.
    pub fn give(&self) -> bool {
        unsafe { sys::xQueueGenericSend(self.handle, ptr::null(), 0, QUEUE_SEND_TO_BACK) == PD_TRUE }
    }

    pub fn give_from_isr(&self) -> bool {
        let mut woken: BaseType_t = 0;
        let given = unsafe { sys::xQueueGiveFromISR(self.handle, &mut woken) == PD_TRUE };
        if woken != 0 {
            task::do_yield();
        }
        given
    }

    pub fn count(&self) -> u32 {
        unsafe {
            if in_isr() {
                sys::uxQueueMessagesWaitingFromISR(self.handle) as u32
            } else {
                sys::uxQueueMessagesWaiting(self.handle) as u32
            }
        }
    }
}

#[repr(C, align(16))]
struct StackRegion<const N: usize>([u8; N]);

/// Statically owned stack and task control block for one thread.
pub struct ThreadStack<const N: usize> {
    stack: UnsafeCell<StackRegion<N>>,
    tcb: UnsafeCell<MaybeUninit<StaticTask_t>>,
    launch: UnsafeCell<MaybeUninit<Launch>>,
    claimed: AtomicBool,
}

// SAFETY: the region is handed to exactly one task, guarded by `claimed`.
unsafe impl<const N: usize> Sync for ThreadStack<N> {}

impl<const N: usize> ThreadStack<N> {
    pub const fn new() -> Self {
        Self {
            stack: UnsafeCell::new(StackRegion([0; N])),
            tcb: UnsafeCell::new(MaybeUninit::uninit()),
            launch: UnsafeCell::new(MaybeUninit::uninit()),
            claimed: AtomicBool::new(false),
        }
    }

    pub const fn size(&self) -> usize {
        N
    }
}

/// Entry information handed to a new task.
pub(crate) struct Launch {
    pub entry: fn(*mut ()) -> !,
    pub arg: *mut (),
    pub lifecycle: &'static Lifecycle,
}

unsafe extern "C" fn task_main(param: *mut c_void) {
    let launch = &*(param as *const Launch);
    launch.lifecycle.enter_running();
    (launch.entry)(launch.arg)
}

fn native_priority(class: SchedClass) -> u32 {
    let top = configMAX_PRIORITIES - 1;
    match class {
        // Highest task priority; the worker also suspends the scheduler
        // around its output step via `no_preempt`.
        SchedClass::Cooperative => top,
        SchedClass::Preemptible(p) => (p as u32).min(top - 1),
    }
}

pub(crate) fn start_thread<const N: usize>(
    stack: &'static ThreadStack<N>,
    name: &'static CStr,
    class: SchedClass,
    core: Option<u8>,
    launch: Launch,
) -> Result<(), SysError> {
    if stack.claimed.swap(true, Ordering::AcqRel) {
        return Err(SysError::StackInUse);
    }

    let core = core.map(|c| c as BaseType_t).unwrap_or(tskNO_AFFINITY as BaseType_t);

    // SAFETY: `claimed` gives us exclusive use of the stack, TCB and launch
    // slot for the lifetime of the image.
    let handle = unsafe {
        let slot = (*stack.launch.get()).write(launch);
        sys::xTaskCreateStaticPinnedToCore(
            Some(task_main),
            name.as_ptr(),
            N as u32,
            slot as *mut Launch as *mut c_void,
            native_priority(class),
            stack.stack.get() as *mut StackType_t,
            (*stack.tcb.get()).as_mut_ptr(),
            core,
        )
    };

    if handle.is_null() {
        return Err(SysError::SpawnFailed);
    }
    Ok(())
}

unsafe extern "C" fn timer_fired(arg: *mut c_void) {
    let callback: fn() = core::mem::transmute(arg);
    callback();
}

/// Periodic `esp_timer` invoking a plain function from the timer task.
pub struct PeriodicTimer {
    handle: esp_timer_handle_t,
}

// SAFETY: esp_timer handles may be used from any task.
unsafe impl Send for PeriodicTimer {}

impl PeriodicTimer {
    pub fn start(name: &'static CStr, period: Duration, callback: fn()) -> Result<Self, SysError> {
        if period.is_zero() {
            return Err(SysError::InvalidArgument);
        }

        let args = esp_timer_create_args_t {
            callback: Some(timer_fired),
            arg: callback as *mut c_void,
            dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
            name: name.as_ptr(),
            skip_unhandled_events: true,
        };

        let mut handle: esp_timer_handle_t = ptr::null_mut();
        let err = unsafe { esp_timer_create(&args, &mut handle) };
        if err != ESP_OK {
            return Err(SysError::TimerFailed(err));
        }

        let err = unsafe { esp_timer_start_periodic(handle, period.as_micros() as u64) };
        if err != ESP_OK {
            unsafe { esp_timer_delete(handle) };
            return Err(SysError::TimerFailed(err));
        }

        Ok(Self { handle })
    }

    pub fn stop(&mut self) {
        unsafe {
            esp_timer_stop(self.handle);
        }
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        unsafe {
            esp_timer_stop(self.handle);
            esp_timer_delete(self.handle);
        }
    }
}
