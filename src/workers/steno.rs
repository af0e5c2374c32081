//! Steno worker: consumes matrix events and drives the engine.
//!
//! Each pass:
//! 1. wait on the scan queue, at most `wait` long; a [`Timeout`] just
//!    means "nothing to translate right now"
//! 2. feed any bytes waiting on the inter-board link to the engine
//! 3. run engine housekeeping when its period has elapsed
//!
//! The worker owns the link. The engine reaches HID output, the link and
//! the LEDs only through [`Emit`].
//!
//! [`Timeout`]: crate::error::Timeout

use core::time::Duration;

use crate::critical::Shared;
use crate::diag::Diagnostics;
use crate::event::{HidReport, ScanEvent};
use crate::gate;
use crate::leds::RenderState;
use crate::link::{InterBoardLink, LinkWriter, UartPort};
use crate::sys;
use crate::thread::Runnable;
use crate::BG_LOG_STREAM;

use super::{ReportQueue, ScanQueue};

/// Bytes taken from the link per pass, so a chatty peer cannot starve the
/// scan queue.
const LINK_POLL_LIMIT: usize = 64;

/// Outputs available to the engine.
pub trait Emit {
    /// Queue a HID report. Dropped (and counted) if the report queue is full.
    fn report(&mut self, report: HidReport);

    /// Best-effort byte to the other half.
    fn link_send(&mut self, byte: u8);

    /// Replace what the LEDs show.
    fn set_leds(&mut self, state: RenderState);

    /// Whether a USB host has configured this half.
    fn host_attached(&self) -> bool;

    /// Whether this build has an inter-board link.
    fn link_present(&self) -> bool;
}

/// Key translation, supplied from outside the concurrency core.
pub trait StenoEngine: Send {
    fn on_event(&mut self, event: &ScanEvent, out: &mut dyn Emit);

    /// One raw byte from the other half. Framing is the engine's business.
    fn on_link_byte(&mut self, byte: u8, out: &mut dyn Emit);

    /// Periodic work between events (role negotiation, timeouts).
    fn housekeeping(&mut self, now_us: u64, out: &mut dyn Emit);
}

struct Outputs<'a, U: UartPort> {
    reports: &'static ReportQueue,
    link: &'a mut InterBoardLink<U>,
    leds: &'static Shared<RenderState>,
    diag: &'static Diagnostics,
}

impl<U: UartPort> Emit for Outputs<'_, U> {
    fn report(&mut self, report: HidReport) {
        match self.reports.push(report) {
            Ok(()) => Diagnostics::bump(&self.diag.reports_queued),
            Err(_) => {
                Diagnostics::bump(&self.diag.reports_dropped);
                crate::rt_warn!(BG_LOG_STREAM, sys::now_us(), "steno: report queue full");
            }
        }
    }

    fn link_send(&mut self, byte: u8) {
        self.link.send_byte_nonblocking(byte);
    }

    fn set_leds(&mut self, state: RenderState) {
        self.leds.set(state);
    }

    fn host_attached(&self) -> bool {
        gate::host_attached()
    }

    fn link_present(&self) -> bool {
        self.link.is_present()
    }
}

pub struct StenoWorker<E: StenoEngine, U: UartPort> {
    engine: E,
    link: InterBoardLink<U>,
    events: &'static ScanQueue,
    reports: &'static ReportQueue,
    leds: &'static Shared<RenderState>,
    diag: &'static Diagnostics,
    wait: Duration,
    housekeeping_us: u64,
    next_housekeeping_us: u64,
}

impl<E: StenoEngine, U: UartPort> StenoWorker<E, U> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: E,
        link: InterBoardLink<U>,
        events: &'static ScanQueue,
        reports: &'static ReportQueue,
        leds: &'static Shared<RenderState>,
        diag: &'static Diagnostics,
        wait: Duration,
        housekeeping: Duration,
    ) -> Self {
        Self {
            engine,
            link,
            events,
            reports,
            leds,
            diag,
            wait,
            housekeeping_us: housekeeping.as_micros() as u64,
            next_housekeeping_us: 0,
        }
    }

    /// One pass of the loop. Returns true if a scan event was handled.
    pub fn step(&mut self) -> bool {
        let Self {
            engine,
            link,
            events,
            reports,
            leds,
            diag,
            wait,
            ..
        } = self;
        let mut out = Outputs {
            reports: *reports,
            link,
            leds: *leds,
            diag: *diag,
        };

        let handled = match events.pop_blocking(*wait) {
            Ok(event) => {
                engine.on_event(&event, &mut out);
                true
            }
            Err(_) => false,
        };

        for _ in 0..LINK_POLL_LIMIT {
            let Some(byte) = out.link.poll_byte() else {
                break;
            };
            engine.on_link_byte(byte, &mut out);
        }

        let now = sys::now_us();
        if now >= self.next_housekeeping_us {
            self.next_housekeeping_us = now + self.housekeeping_us;
            let mut out = Outputs {
                reports: self.reports,
                link: &mut self.link,
                leds: self.leds,
                diag: self.diag,
            };
            self.engine.housekeeping(now, &mut out);
        }

        handled
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn link(&self) -> &InterBoardLink<U> {
        &self.link
    }
}

impl<E: StenoEngine + 'static, U: UartPort + 'static> Runnable for StenoWorker<E, U> {
    fn run(&mut self) -> ! {
        crate::rt_info!(
            BG_LOG_STREAM,
            sys::now_us(),
            "steno: running, link {}",
            if self.link.is_present() { "present" } else { "absent" }
        );
        loop {
            self.step();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leds::{OFF_INDICATOR, STENO_RAW_INDICATOR};
    use std::boxed::Box;
    use std::collections::VecDeque;
    use std::vec::Vec;

    fn leak<T>(value: T) -> &'static T {
        Box::leak(Box::new(value))
    }

    struct Fifo {
        rx: VecDeque<u8>,
        tx: Vec<u8>,
    }

    impl UartPort for Fifo {
        fn disable_interrupts(&mut self) {}

        fn read_byte(&mut self) -> Option<u8> {
            self.rx.pop_front()
        }

        fn write_byte(&mut self, byte: u8) -> bool {
            self.tx.push(byte);
            true
        }
    }

    /// Echoes every key event as a report and every link byte back.
    #[derive(Default)]
    struct Echo {
        housekeeping: u32,
    }

    impl StenoEngine for Echo {
        fn on_event(&mut self, event: &ScanEvent, out: &mut dyn Emit) {
            out.report(HidReport::key(0, event.col));
            out.set_leds(RenderState::all(&STENO_RAW_INDICATOR));
        }

        fn on_link_byte(&mut self, byte: u8, out: &mut dyn Emit) {
            out.link_send(byte.wrapping_add(1));
        }

        fn housekeeping(&mut self, _now_us: u64, _out: &mut dyn Emit) {
            self.housekeeping += 1;
        }
    }

    #[test]
    fn test_event_reaches_engine_and_outputs() {
        let events: &'static ScanQueue = leak(ScanQueue::new());
        let reports: &'static ReportQueue = leak(ReportQueue::new());
        let leds = leak(Shared::new(RenderState::all(&OFF_INDICATOR)));
        let diag = leak(Diagnostics::new());
        let link = InterBoardLink::present(
            Fifo {
                rx: [7u8, 9].into_iter().collect(),
                tx: Vec::new(),
            },
            diag,
        );

        let mut worker = StenoWorker::new(
            Echo::default(),
            link,
            events,
            reports,
            leds,
            diag,
            Duration::from_millis(1),
            Duration::from_secs(3600),
        );

        events.push(ScanEvent::new(0, 3, true, 0)).unwrap();
        assert!(worker.step());

        assert_eq!(reports.try_pop(), Some(HidReport::key(0, 3)));
        assert_eq!(leds.get(), RenderState::all(&STENO_RAW_INDICATOR));
        assert_eq!(worker.link().port().unwrap().tx, [8, 10]);
        assert_eq!(worker.engine().housekeeping, 1);

        // Idle pass: times out, housekeeping not yet due again.
        assert!(!worker.step());
        assert_eq!(worker.engine().housekeeping, 1);
    }

    #[test]
    fn test_full_report_queue_counts_drop() {
        let events: &'static ScanQueue = leak(ScanQueue::new());
        let reports: &'static ReportQueue = leak(ReportQueue::new());
        let leds = leak(Shared::new(RenderState::default()));
        let diag = leak(Diagnostics::new());
        let mut worker = StenoWorker::new(
            Echo::default(),
            InterBoardLink::<Fifo>::absent(diag),
            events,
            reports,
            leds,
            diag,
            Duration::ZERO,
            Duration::from_secs(3600),
        );

        for _ in 0..reports.capacity() + 3 {
            events.push(ScanEvent::new(0, 1, true, 0)).unwrap();
            worker.step();
        }

        let snap = diag.snapshot();
        assert_eq!(snap.reports_queued as usize, reports.capacity());
        assert_eq!(snap.reports_dropped, 3);
    }
}
