//! Diagnostic counters.
//!
//! Observe data loss without changing it: every place that drops data on
//! purpose (full queue, full UART FIFO, boot noise) bumps a counter here.
//! Relaxed atomics only; safe from any thread or interrupt.

use core::sync::atomic::{AtomicU32, Ordering};

#[derive(Default)]
pub struct Diagnostics {
    pub scan_queued: AtomicU32,
    pub scan_dropped: AtomicU32,
    pub reports_queued: AtomicU32,
    pub reports_dropped: AtomicU32,
    pub reports_sent: AtomicU32,
    pub reports_refused: AtomicU32,
    pub link_rx: AtomicU32,
    pub link_tx: AtomicU32,
    pub link_tx_dropped: AtomicU32,
    pub link_noise: AtomicU32,
    pub led_frames: AtomicU32,
}

impl Diagnostics {
    pub const fn new() -> Self {
        Self {
            scan_queued: AtomicU32::new(0),
            scan_dropped: AtomicU32::new(0),
            reports_queued: AtomicU32::new(0),
            reports_dropped: AtomicU32::new(0),
            reports_sent: AtomicU32::new(0),
            reports_refused: AtomicU32::new(0),
            link_rx: AtomicU32::new(0),
            link_tx: AtomicU32::new(0),
            link_tx_dropped: AtomicU32::new(0),
            link_noise: AtomicU32::new(0),
            led_frames: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn bump(counter: &AtomicU32) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(counter: &AtomicU32, n: u32) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagSnapshot {
        let load = |c: &AtomicU32| c.load(Ordering::Relaxed);
        DiagSnapshot {
            scan_queued: load(&self.scan_queued),
            scan_dropped: load(&self.scan_dropped),
            reports_queued: load(&self.reports_queued),
            reports_dropped: load(&self.reports_dropped),
            reports_sent: load(&self.reports_sent),
            reports_refused: load(&self.reports_refused),
            link_rx: load(&self.link_rx),
            link_tx: load(&self.link_tx),
            link_tx_dropped: load(&self.link_tx_dropped),
            link_noise: load(&self.link_noise),
            led_frames: load(&self.led_frames),
        }
    }
}

/// Counter values at a point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiagSnapshot {
    pub scan_queued: u32,
    pub scan_dropped: u32,
    pub reports_queued: u32,
    pub reports_dropped: u32,
    pub reports_sent: u32,
    pub reports_refused: u32,
    pub link_rx: u32,
    pub link_tx: u32,
    pub link_tx_dropped: u32,
    pub link_noise: u32,
    pub led_frames: u32,
}

impl core::fmt::Display for DiagSnapshot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "scan {}/{} drop, report {}/{} drop/{} sent, link rx {} tx {}/{} drop, noise {}, led {}",
            self.scan_queued,
            self.scan_dropped,
            self.reports_queued,
            self.reports_dropped,
            self.reports_sent,
            self.link_rx,
            self.link_tx,
            self.link_tx_dropped,
            self.link_noise,
            self.led_frames,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let diag = Diagnostics::new();
        Diagnostics::bump(&diag.scan_dropped);
        Diagnostics::bump(&diag.scan_dropped);
        Diagnostics::add(&diag.link_noise, 17);

        let snap = diag.snapshot();
        assert_eq!(snap.scan_dropped, 2);
        assert_eq!(snap.link_noise, 17);
        assert_eq!(snap.reports_sent, 0);
    }
}
