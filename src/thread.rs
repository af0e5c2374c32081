//! Worker threads.
//!
//! Every worker is a `'static` object implementing [`Runnable`], started
//! once on a statically owned stack and never joined. Lifecycle per thread:
//!
//! ```text
//! Created ──spawn()──▶ Started ──first instruction──▶ Running (forever)
//! ```
//!
//! The state is observable through [`ThreadHandle::state`]; startup code
//! uses it to confirm workers reached `Running` before entering idle.

use core::ffi::CStr;
use core::sync::atomic::{AtomicU8, Ordering};

use crate::error::SysError;
use crate::sys::{self, Launch, SchedClass, ThreadStack};

/// Body of a worker thread. Never returns.
pub trait Runnable: Send + 'static {
    fn run(&mut self) -> !;
}

/// Static description of a worker thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThreadDesc {
    pub name: &'static CStr,
    pub class: SchedClass,
    /// Pin to a core, `None` lets the scheduler choose.
    pub core: Option<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    Created = 0,
    Started = 1,
    Running = 2,
}

impl ThreadState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ThreadState::Started,
            2 => ThreadState::Running,
            _ => ThreadState::Created,
        }
    }
}

/// Lifecycle state shared between the spawner and the thread.
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(ThreadState::Created as u8),
        }
    }

    pub fn state(&self) -> ThreadState {
        ThreadState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Created → Started. The thread may already be Running, in which case
    /// the state is left alone.
    fn mark_started(&self) {
        let _ = self.state.compare_exchange(
            ThreadState::Created as u8,
            ThreadState::Started as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Called by the backend as the first thing on the new thread.
    pub(crate) fn enter_running(&self) {
        self.state.store(ThreadState::Running as u8, Ordering::Release);
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Stack plus lifecycle for one worker, placed in a `static`.
pub struct ThreadSlot<const N: usize> {
    stack: ThreadStack<N>,
    lifecycle: Lifecycle,
}

impl<const N: usize> ThreadSlot<N> {
    pub const fn new() -> Self {
        Self {
            stack: ThreadStack::new(),
            lifecycle: Lifecycle::new(),
        }
    }

    pub fn state(&self) -> ThreadState {
        self.lifecycle.state()
    }

    pub const fn stack_size(&self) -> usize {
        self.stack.size()
    }
}

impl<const N: usize> Default for ThreadSlot<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer for a started worker.
#[derive(Clone, Copy)]
pub struct ThreadHandle {
    name: &'static CStr,
    lifecycle: &'static Lifecycle,
}

impl ThreadHandle {
    pub fn name(&self) -> &'static CStr {
        self.name
    }

    pub fn state(&self) -> ThreadState {
        self.lifecycle.state()
    }

    /// Wait until the thread has reached `Running`, polling once per
    /// millisecond for at most `attempts` polls.
    pub fn wait_running(&self, attempts: u32) -> bool {
        for _ in 0..attempts {
            if self.state() == ThreadState::Running {
                return true;
            }
            sys::sleep_ms(1);
        }
        self.state() == ThreadState::Running
    }
}

fn run_worker<W: Runnable>(arg: *mut ()) -> ! {
    // SAFETY: `arg` is the `&'static mut W` handed to `spawn`, moved to this
    // thread and never touched by the spawner again.
    let worker = unsafe { &mut *(arg as *mut W) };
    worker.run()
}

/// Start `worker` on `slot` with no initial delay.
///
/// A slot backs exactly one thread; reusing it returns
/// [`SysError::StackInUse`].
pub fn spawn<W: Runnable, const N: usize>(
    desc: &ThreadDesc,
    slot: &'static ThreadSlot<N>,
    worker: &'static mut W,
) -> Result<ThreadHandle, SysError> {
    let launch = Launch {
        entry: run_worker::<W>,
        arg: worker as *mut W as *mut (),
        lifecycle: &slot.lifecycle,
    };

    sys::start_thread(&slot.stack, desc.name, desc.class, desc.core, launch)?;
    slot.lifecycle.mark_started();

    Ok(ThreadHandle {
        name: desc.name,
        lifecycle: &slot.lifecycle,
    })
}
