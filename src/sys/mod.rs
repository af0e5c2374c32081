//! Kernel services.
//!
//! Every primitive the core needs from the scheduler lives behind this
//! module: mutex and condition variable, counting semaphore, interrupt
//! context detection, time, statically owned thread stacks and periodic
//! timers.
//!
//! Two backends expose the same surface:
//! - `freertos` (ESP-IDF target): thin wrappers over FreeRTOS queue objects,
//!   tasks and `esp_timer`.
//! - `host` (everything else): `std` primitives plus a per-thread
//!   "simulated interrupt" flag, so the whole pipeline runs under `cargo test`.

use core::time::Duration;

#[cfg(target_os = "espidf")]
mod freertos;
#[cfg(target_os = "espidf")]
pub use freertos::*;

#[cfg(not(target_os = "espidf"))]
mod host;
#[cfg(not(target_os = "espidf"))]
pub use host::*;

/// Scheduling class of a worker thread.
///
/// The class is a capability, not a number: the backend maps it onto
/// whatever its scheduler offers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedClass {
    /// Never preempted by other threads once running. Only interrupt-class
    /// work may run in between. Used for bit-banged LED output.
    Cooperative,
    /// Ordinary preemptible thread. Higher value means higher priority.
    Preemptible(u8),
}

impl SchedClass {
    /// Whether this class may be preempted by `other`.
    pub fn preemptible_by(self, other: SchedClass) -> bool {
        match (self, other) {
            (SchedClass::Cooperative, _) => false,
            (SchedClass::Preemptible(_), SchedClass::Cooperative) => true,
            (SchedClass::Preemptible(a), SchedClass::Preemptible(b)) => b > a,
        }
    }
}

/// Convert a duration to whole milliseconds, saturating.
#[inline]
pub(crate) fn duration_ms(d: Duration) -> u32 {
    d.as_millis().min(u32::MAX as u128) as u32
}
