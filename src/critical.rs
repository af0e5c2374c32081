//! Critical section shared by threads and interrupt handlers.
//!
//! Wraps the platform `critical_section` implementation (interrupt mask plus
//! cross-core spinlock on the device, a global lock on the host) and adds the
//! nesting rule: a logical critical section is entered at most once per
//! execution context. Entering it again before release is a context
//! violation and halts the device.
//!
//! Hold it for a handful of instructions only. Never block inside it.

use core::cell::Cell;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::RestoreState;

use crate::error::ContextViolation;
use crate::fault;

/// Set while some context is inside the section.
static HELD: AtomicBool = AtomicBool::new(false);

/// Proof that the critical section is held.
///
/// Dropping the token releases the section, so every exit path (early
/// return, `?`, unwind on the host) releases it.
#[must_use = "dropping the token releases the critical section immediately"]
pub struct Token {
    restore: RestoreState,
    // Release must happen on the context that acquired.
    _not_send: PhantomData<*const ()>,
}

impl Token {
    /// Borrow the platform critical section for `critical_section::Mutex`.
    #[inline]
    pub fn cs(&self) -> critical_section::CriticalSection<'_> {
        // SAFETY: the token exists only while the section is held.
        unsafe { critical_section::CriticalSection::new() }
    }
}

impl Drop for Token {
    #[inline]
    fn drop(&mut self) {
        HELD.store(false, Ordering::Release);
        // SAFETY: `restore` came from the matching `acquire` on this context.
        unsafe { critical_section::release(self.restore) };
    }
}

/// Enter the critical section.
///
/// Halts with [`ContextViolation::CriticalReentry`] if the calling context
/// already holds it.
#[inline]
pub fn acquire() -> Token {
    // SAFETY: paired with `critical_section::release` in `Token::drop`.
    let restore = unsafe { critical_section::acquire() };

    // The underlying implementation is re-entrant for the same context and
    // exclusive otherwise, so seeing HELD here means we nested.
    if HELD.swap(true, Ordering::Acquire) {
        fault::halt(ContextViolation::CriticalReentry);
    }

    Token {
        restore,
        _not_send: PhantomData,
    }
}

/// Leave the critical section.
#[inline]
pub fn release(token: Token) {
    drop(token);
}

/// Run `f` inside the critical section.
#[inline]
pub fn with<R>(f: impl FnOnce(&Token) -> R) -> R {
    let token = acquire();
    f(&token)
}

/// Small `Copy` value shared between interrupt and thread context.
pub struct Shared<T: Copy> {
    inner: critical_section::Mutex<Cell<T>>,
}

impl<T: Copy> Shared<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: critical_section::Mutex::new(Cell::new(value)),
        }
    }

    pub fn get(&self) -> T {
        with(|token| self.inner.borrow(token.cs()).get())
    }

    pub fn set(&self, value: T) {
        with(|token| self.inner.borrow(token.cs()).set(value));
    }

    /// Read-modify-write as one step. Returns the new value.
    pub fn update(&self, f: impl FnOnce(T) -> T) -> T {
        with(|token| {
            let cell = self.inner.borrow(token.cs());
            let value = f(cell.get());
            cell.set(value);
            value
        })
    }

    /// Access while the caller already holds the section.
    pub fn get_in(&self, token: &Token) -> T {
        self.inner.borrow(token.cs()).get()
    }

    pub fn set_in(&self, token: &Token, value: T) {
        self.inner.borrow(token.cs()).set(value);
    }
}
