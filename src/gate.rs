//! Output gate: one HID report in flight at a time.
//!
//! # Handoff
//!
//! ```text
//! output stage (thread)                 USB driver (interrupt)
//! ─────────────────────                 ──────────────────────
//! send_blocking(report)
//!   take permit  ── blocks while busy
//!   write report ───────────────────▶  transmits
//!   return (permit still held)
//!                                       completion
//!                          permit ◀──── release()
//! ```
//!
//! The permit is a semaphore bounded to 1. The completion interrupt is the
//! only thing that gives it back, and it does nothing else. Context misuse
//! halts: a blocking send from interrupt context, or a release from
//! thread context.

use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};
use core::time::Duration;

use crate::critical::Shared;
use crate::error::{ContextViolation, SinkError, SysError};
use crate::event::HidReport;
use crate::fault;
use crate::sys::{self, Semaphore};

/// Binary permit guarding the single output endpoint.
pub struct OutputGate {
    permit: Semaphore,
}

impl OutputGate {
    /// Create the gate in the ready state.
    pub fn new() -> Result<Self, SysError> {
        Ok(Self {
            permit: Semaphore::new(1, 1)?,
        })
    }

    /// True if a send would not block.
    #[inline]
    pub fn try_is_ready(&self) -> bool {
        self.permit.count() > 0
    }

    /// Completion interrupt: the report left, the endpoint is free.
    ///
    /// Returns false if the permit was already free (a spurious
    /// completion); the count never exceeds 1.
    pub fn release(&self) -> bool {
        if !sys::in_isr() {
            fault::halt(ContextViolation::ReleaseOutsideIsr);
        }
        self.permit.give_from_isr()
    }

    fn acquire(&self) {
        // Waits forever: only the completion interrupt ends the wait.
        while !self.permit.take(Duration::MAX) {}
    }

    /// Hand the permit back after a write the device never accepted.
    fn undo_acquire(&self) {
        let _ = self.permit.give();
    }
}

/// Destination for HID reports (USB stack on the device, recorder on host).
pub trait ReportSink: Send {
    /// Queue `report` on the endpoint. On `Ok` a completion interrupt
    /// follows once the host has read it.
    fn write_report(&mut self, report: &HidReport) -> Result<(), SinkError>;
}

/// HID output channel: the gate plus the sink it protects.
pub struct OutputChannel<S: ReportSink> {
    gate: &'static OutputGate,
    sink: S,
}

impl<S: ReportSink> OutputChannel<S> {
    pub fn new(gate: &'static OutputGate, sink: S) -> Self {
        Self { gate, sink }
    }

    #[inline]
    pub fn try_is_ready(&self) -> bool {
        self.gate.try_is_ready()
    }

    /// Send one report, waiting for the previous one to complete first.
    ///
    /// The permit stays held after return until the completion interrupt
    /// releases it. If the sink refuses the report no completion will
    /// come, so the permit is handed back and the error returned.
    pub fn send_blocking(&mut self, report: &HidReport) -> Result<(), SinkError> {
        if sys::in_isr() {
            fault::halt(ContextViolation::BlockingInIsr);
        }

        self.gate.acquire();
        match self.sink.write_report(report) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.gate.undo_acquire();
                Err(e)
            }
        }
    }

    pub fn gate(&self) -> &'static OutputGate {
        self.gate
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

/// Gate released by [`on_report_complete`], set once at startup.
static COMPLETION_GATE: AtomicPtr<OutputGate> = AtomicPtr::new(ptr::null_mut());

/// Host connection state, written by the USB status interrupt.
static HOST_ATTACHED: Shared<bool> = Shared::new(false);

/// Route completion interrupts to `gate`. Returns false if a gate was
/// already registered; the first registration stays.
pub fn register_completion(gate: &'static OutputGate) -> bool {
    COMPLETION_GATE
        .compare_exchange(
            ptr::null_mut(),
            gate as *const OutputGate as *mut OutputGate,
            Ordering::AcqRel,
            Ordering::Acquire,
        )
        .is_ok()
}

/// Completion entry point, called by the USB driver from interrupt context.
///
/// Completions before registration are ignored: nothing was sent yet.
pub fn on_report_complete() {
    let gate = COMPLETION_GATE.load(Ordering::Acquire);
    // SAFETY: only ever set from a `&'static OutputGate`.
    if let Some(gate) = unsafe { gate.as_ref() } {
        gate.release();
    }
}

/// USB status entry point (interrupt context).
///
/// Losing the host also frees the endpoint: the completion for a report in
/// flight will never arrive.
pub fn on_host_status(configured: bool) {
    HOST_ATTACHED.set(configured);
    if !configured {
        let gate = COMPLETION_GATE.load(Ordering::Acquire);
        // SAFETY: only ever set from a `&'static OutputGate`.
        if let Some(gate) = unsafe { gate.as_ref() } {
            if !gate.try_is_ready() {
                gate.release();
            }
        }
    }
}

/// Whether a USB host has configured the device.
pub fn host_attached() -> bool {
    HOST_ATTACHED.get()
}
