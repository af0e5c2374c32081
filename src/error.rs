//! Error taxonomy.
//!
//! - [`Full`] and [`Timeout`] are recoverable and returned to the caller.
//! - [`ContextViolation`] is fatal: it is never returned, the primitive that
//!   detects it escalates through [`crate::fault::halt`].
//! - [`SysError`] covers startup failures (allocation, thread and timer
//!   creation). They happen before any worker runs and halt bring-up.
//! - [`SinkError`] is a refused HID write; the report is dropped.

use core::fmt;

/// Push rejected because the queue is at capacity. Carries the item back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Recover the rejected item.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Q01: queue full")
    }
}

/// Blocking pop gave up before an item arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout;

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Q02: timed out")
    }
}

/// A primitive was used from the wrong execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContextViolation {
    /// C01: blocking call made from interrupt context
    BlockingInIsr = 1,
    /// C02: completion release issued from thread context
    ReleaseOutsideIsr = 2,
    /// C03: critical section acquired again before release
    CriticalReentry = 3,
}

impl ContextViolation {
    /// Get error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::BlockingInIsr => "C01",
            Self::ReleaseOutsideIsr => "C02",
            Self::CriticalReentry => "C03",
        }
    }

    /// Get error message
    pub fn message(&self) -> &'static str {
        match self {
            Self::BlockingInIsr => "blocking call in interrupt context",
            Self::ReleaseOutsideIsr => "gate released outside interrupt context",
            Self::CriticalReentry => "critical section re-entered",
        }
    }

    /// Convert from the raw value stored in fault state.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::BlockingInIsr),
            2 => Some(Self::ReleaseOutsideIsr),
            3 => Some(Self::CriticalReentry),
            _ => None,
        }
    }
}

impl fmt::Display for ContextViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// Kernel object creation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysError {
    /// S01: bad bound or zero period
    InvalidArgument,
    /// S02: kernel heap exhausted
    OutOfMemory,
    /// S03: stack region already backs a thread
    StackInUse,
    /// S04: scheduler refused the thread
    SpawnFailed,
    /// S05: timer service error (platform code)
    TimerFailed(i32),
}

impl SysError {
    /// Get error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "S01",
            Self::OutOfMemory => "S02",
            Self::StackInUse => "S03",
            Self::SpawnFailed => "S04",
            Self::TimerFailed(_) => "S05",
        }
    }

    /// Get error message
    pub fn message(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid argument",
            Self::OutOfMemory => "out of memory",
            Self::StackInUse => "stack already in use",
            Self::SpawnFailed => "thread creation failed",
            Self::TimerFailed(_) => "timer error",
        }
    }
}

impl fmt::Display for SysError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimerFailed(code) => write!(f, "{}: {} ({})", self.code(), self.message(), code),
            _ => write!(f, "{}: {}", self.code(), self.message()),
        }
    }
}

/// Report sink refused a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    /// H01: no host has configured the device
    NotConfigured,
    /// H02: driver error (platform code)
    Device(i32),
}

impl SinkError {
    /// Get error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConfigured => "H01",
            Self::Device(_) => "H02",
        }
    }

    /// Get error message
    pub fn message(&self) -> &'static str {
        match self {
            Self::NotConfigured => "host not configured",
            Self::Device(_) => "device error",
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(code) => write!(f, "{}: {} ({})", self.code(), self.message(), code),
            _ => write!(f, "{}: {}", self.code(), self.message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_display() {
        let text = std::format!("{}", ContextViolation::BlockingInIsr);
        assert_eq!(text, "C01: blocking call in interrupt context");
    }

    #[test]
    fn test_violation_round_trips_through_u8() {
        for v in [
            ContextViolation::BlockingInIsr,
            ContextViolation::ReleaseOutsideIsr,
            ContextViolation::CriticalReentry,
        ] {
            assert_eq!(ContextViolation::from_u8(v as u8), Some(v));
        }
        assert_eq!(ContextViolation::from_u8(0), None);
    }

    #[test]
    fn test_full_returns_item() {
        let err = Full(7u8);
        assert_eq!(err.into_inner(), 7);
    }

    #[test]
    fn test_timer_error_shows_platform_code() {
        let text = std::format!("{}", SysError::TimerFailed(259));
        assert_eq!(text, "S05: timer error (259)");
    }
}
