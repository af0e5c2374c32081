//! Scan worker: samples the matrix at a fixed cadence.
//!
//! Every raw transition becomes a timestamped [`ScanEvent`] pushed to the
//! scan queue. The push never waits: when the steno worker has fallen
//! behind, the event is dropped and counted. Warnings about drops are rate
//! limited so a stalled consumer cannot flood the log.

use core::time::Duration;

use crate::diag::Diagnostics;
use crate::event::ScanEvent;
use crate::sys::{self, Ticker};
use crate::thread::Runnable;
use crate::RT_LOG_STREAM;

use super::ScanQueue;

/// Minimum spacing between "queue full" warnings.
const DROP_WARN_INTERVAL_US: u64 = 1_000_000;

/// Source of raw key transitions (no debouncing).
pub trait MatrixScanner: Send {
    /// Sample once, calling `report(row, col, pressed)` for every key whose
    /// state changed since the previous sample.
    fn scan(&mut self, report: &mut dyn FnMut(u8, u8, bool));
}

/// Electrical lines of a row/column key matrix.
pub trait MatrixLines: Send {
    fn rows(&self) -> u8;
    fn cols(&self) -> u8;
    /// Drive `row` active and let it settle. False if the line did not
    /// change.
    fn select(&mut self, row: u8) -> bool;
    /// Release `row`. False if the line is still driven.
    fn deselect(&mut self, row: u8) -> bool;
    /// Whether the key at the selected row and `col` is down.
    fn is_down(&mut self, col: u8) -> bool;
}

/// Row-at-a-time scanner over [`MatrixLines`].
///
/// A row that fails to deselect would read as pressed keys on every row
/// scanned after it, so the pass stops there. The next pass first retries
/// the release and scans nothing until it succeeds.
pub struct KeyMatrix<L: MatrixLines> {
    lines: L,
    /// Bit `row * cols + col` set while the key is down.
    state: u16,
    stuck: Option<u8>,
    line_faults: u32,
}

impl<L: MatrixLines> KeyMatrix<L> {
    pub fn new(lines: L) -> Self {
        Self {
            lines,
            state: 0,
            stuck: None,
            line_faults: 0,
        }
    }

    /// Row lines that failed to switch since boot.
    pub fn line_faults(&self) -> u32 {
        self.line_faults
    }

    pub fn lines(&self) -> &L {
        &self.lines
    }

    pub fn lines_mut(&mut self) -> &mut L {
        &mut self.lines
    }

    fn line_fault(&mut self, row: u8, action: &str) {
        self.line_faults += 1;
        if self.line_faults.is_power_of_two() {
            crate::rt_warn!(
                RT_LOG_STREAM,
                sys::now_us(),
                "scan: {} row {} failed ({} line faults)",
                action,
                row,
                self.line_faults
            );
        }
    }
}

impl<L: MatrixLines> MatrixScanner for KeyMatrix<L> {
    fn scan(&mut self, report: &mut dyn FnMut(u8, u8, bool)) {
        if let Some(row) = self.stuck {
            if !self.lines.deselect(row) {
                self.line_fault(row, "release");
                return;
            }
            self.stuck = None;
        }

        let cols = self.lines.cols();
        for row in 0..self.lines.rows() {
            if !self.lines.select(row) {
                self.line_fault(row, "select");
                continue;
            }

            for col in 0..cols {
                let Some(bit) = 1u16.checked_shl(row as u32 * cols as u32 + col as u32) else {
                    continue;
                };
                let down = self.lines.is_down(col);
                if down != (self.state & bit != 0) {
                    self.state ^= bit;
                    report(row, col, down);
                }
            }

            if !self.lines.deselect(row) {
                self.stuck = Some(row);
                self.line_fault(row, "release");
                return;
            }
        }
    }
}

pub struct ScanWorker<M: MatrixScanner> {
    matrix: M,
    events: &'static ScanQueue,
    diag: &'static Diagnostics,
    period: Duration,
    last_drop_warn_us: Option<u64>,
    dropped_since_warn: u32,
}

impl<M: MatrixScanner> ScanWorker<M> {
    pub fn new(
        matrix: M,
        events: &'static ScanQueue,
        diag: &'static Diagnostics,
        period: Duration,
    ) -> Self {
        Self {
            matrix,
            events,
            diag,
            period,
            last_drop_warn_us: None,
            dropped_since_warn: 0,
        }
    }

    /// One scan pass. Returns the number of events dropped.
    pub fn scan_once(&mut self) -> u32 {
        let now = sys::now_us();
        let events = self.events;
        let diag = self.diag;
        let mut dropped = 0;

        self.matrix.scan(&mut |row, col, pressed| {
            match events.push(ScanEvent::new(row, col, pressed, now)) {
                Ok(()) => Diagnostics::bump(&diag.scan_queued),
                Err(_) => {
                    Diagnostics::bump(&diag.scan_dropped);
                    dropped += 1;
                }
            }
        });

        if dropped > 0 {
            self.note_drops(now, dropped);
        }
        dropped
    }

    fn note_drops(&mut self, now: u64, dropped: u32) {
        self.dropped_since_warn += dropped;
        let due = match self.last_drop_warn_us {
            None => true,
            Some(last) => now.saturating_sub(last) >= DROP_WARN_INTERVAL_US,
        };
        if due {
            crate::rt_warn!(
                RT_LOG_STREAM,
                now,
                "scan: queue full, {} events dropped",
                self.dropped_since_warn
            );
            self.last_drop_warn_us = Some(now);
            self.dropped_since_warn = 0;
        }
    }
}

impl<M: MatrixScanner + 'static> Runnable for ScanWorker<M> {
    fn run(&mut self) -> ! {
        crate::rt_info!(RT_LOG_STREAM, sys::now_us(), "scan: running every {:?}", self.period);
        let mut ticker = Ticker::every(self.period);
        loop {
            let missed = ticker.wait();
            if missed > 0 {
                crate::rt_trace!(RT_LOG_STREAM, sys::now_us(), "scan: {} ticks late", missed);
            }
            self.scan_once();
        }
    }
}
