//! LED worker: renders the shared [`RenderState`] at a fixed frame rate.
//!
//! Runs in the cooperative class, so no other thread cuts into a frame.
//! Encoding the waveform additionally runs under [`sys::no_preempt`]; the
//! hand-off to the strip hardware runs after it, because that step may wait
//! for the previous frame.

use core::time::Duration;

use crate::critical::Shared;
use crate::diag::Diagnostics;
use crate::leds::{LedStrip, RenderState, Rgb8, MAX_LEDS};
use crate::sys::{self, Ticker};
use crate::thread::Runnable;
use crate::BG_LOG_STREAM;

/// Frames between forced rewrites of an unchanged image.
const REFRESH_FRAMES: u32 = 100;

pub struct LedWorker<L: LedStrip> {
    strip: L,
    state: &'static Shared<RenderState>,
    diag: &'static Diagnostics,
    frame_period: Duration,
    current: Option<RenderState>,
    frame: u32,
    last_pixels: [Rgb8; MAX_LEDS],
    since_write: u32,
}

impl<L: LedStrip> LedWorker<L> {
    pub fn new(
        strip: L,
        state: &'static Shared<RenderState>,
        diag: &'static Diagnostics,
        frame_period: Duration,
    ) -> Self {
        Self {
            strip,
            state,
            diag,
            frame_period,
            current: None,
            frame: 0,
            last_pixels: [Rgb8::default(); MAX_LEDS],
            since_write: 0,
        }
    }

    /// Render one frame. Returns true if the strip was written.
    pub fn frame(&mut self) -> bool {
        let wanted = self.state.get();
        if self.current != Some(wanted) {
            self.current = Some(wanted);
            self.frame = 0;
            self.since_write = REFRESH_FRAMES;
        }

        let pixels = wanted.render(self.frame);
        self.frame = self.frame.wrapping_add(1);

        let changed = pixels != self.last_pixels;
        if !changed && self.since_write < REFRESH_FRAMES {
            self.since_write += 1;
            return false;
        }

        let strip = &mut self.strip;
        match sys::no_preempt(|| strip.load(&pixels)).and_then(|()| strip.show()) {
            Ok(()) => {
                self.last_pixels = pixels;
                self.since_write = 0;
                Diagnostics::bump(&self.diag.led_frames);
                true
            }
            Err(code) => {
                crate::rt_warn!(BG_LOG_STREAM, sys::now_us(), "led: strip write failed ({})", code);
                false
            }
        }
    }

    pub fn strip(&self) -> &L {
        &self.strip
    }
}

impl<L: LedStrip + 'static> Runnable for LedWorker<L> {
    fn run(&mut self) -> ! {
        crate::rt_info!(BG_LOG_STREAM, sys::now_us(), "led: running every {:?}", self.frame_period);
        let mut ticker = Ticker::every(self.frame_period);
        loop {
            ticker.wait();
            self.frame();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leds::{OFF_INDICATOR, STENO_RAW_INDICATOR, USB_PRIMARY_INDICATOR};
    use std::boxed::Box;
    use std::vec::Vec;

    #[derive(Default)]
    struct Frames(Vec<[Rgb8; MAX_LEDS]>, Option<[Rgb8; MAX_LEDS]>);

    impl LedStrip for Frames {
        fn load(&mut self, pixels: &[Rgb8]) -> Result<(), i32> {
            let mut frame = [Rgb8::default(); MAX_LEDS];
            frame.copy_from_slice(pixels);
            self.1 = Some(frame);
            Ok(())
        }

        fn show(&mut self) -> Result<(), i32> {
            if let Some(frame) = self.1.take() {
                self.0.push(frame);
            }
            Ok(())
        }
    }

    /// Strip whose `show` waits on a transmit-done semaphore, like RMT.
    struct Transmitter {
        done: crate::sys::Semaphore,
        loaded_locked: Vec<bool>,
        shown_locked: Vec<bool>,
    }

    impl LedStrip for Transmitter {
        fn load(&mut self, _pixels: &[Rgb8]) -> Result<(), i32> {
            self.loaded_locked.push(sys::preempt_disabled());
            Ok(())
        }

        fn show(&mut self) -> Result<(), i32> {
            self.shown_locked.push(sys::preempt_disabled());
            if !self.done.take(Duration::from_millis(100)) {
                return Err(-1);
            }
            self.done.give();
            Ok(())
        }
    }

    fn leak<T>(value: T) -> &'static T {
        Box::leak(Box::new(value))
    }

    #[test]
    fn test_writes_on_change_only() {
        let state = leak(Shared::new(RenderState::all(&STENO_RAW_INDICATOR)));
        let diag = leak(Diagnostics::new());
        let mut worker = LedWorker::new(Frames::default(), state, diag, Duration::from_millis(10));

        assert!(worker.frame());
        for _ in 0..10 {
            assert!(!worker.frame());
        }

        state.set(RenderState::all(&OFF_INDICATOR));
        assert!(worker.frame());
        assert_eq!(worker.strip().0.len(), 2);
        assert_eq!(worker.strip().0[1], [Rgb8::default(); MAX_LEDS]);
        assert_eq!(diag.snapshot().led_frames, 2);
    }

    #[test]
    fn test_animation_restarts_on_new_state() {
        let state = leak(Shared::new(RenderState::all(&USB_PRIMARY_INDICATOR)));
        let diag = leak(Diagnostics::new());
        let mut worker = LedWorker::new(Frames::default(), state, diag, Duration::from_millis(10));

        // 30 frames lit, then the off phase.
        for _ in 0..31 {
            worker.frame();
        }
        let frames = &worker.strip().0;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], [Rgb8::default(); MAX_LEDS]);
    }

    #[test]
    fn test_show_may_block_outside_scheduler_lock() {
        let state = leak(Shared::new(RenderState::all(&STENO_RAW_INDICATOR)));
        let diag = leak(Diagnostics::new());
        let strip = Transmitter {
            done: crate::sys::Semaphore::new(1, 1).unwrap(),
            loaded_locked: Vec::new(),
            shown_locked: Vec::new(),
        };
        let mut worker = LedWorker::new(strip, state, diag, Duration::from_millis(10));

        assert!(worker.frame());
        state.set(RenderState::all(&OFF_INDICATOR));
        assert!(worker.frame());

        assert_eq!(worker.strip().loaded_locked, [true, true]);
        assert_eq!(worker.strip().shown_locked, [false, false]);
        assert_eq!(diag.snapshot().led_frames, 2);
    }

    #[test]
    fn test_periodic_refresh() {
        let state = leak(Shared::new(RenderState::all(&STENO_RAW_INDICATOR)));
        let diag = leak(Diagnostics::new());
        let mut worker = LedWorker::new(Frames::default(), state, diag, Duration::from_millis(10));

        for _ in 0..=REFRESH_FRAMES + 1 {
            worker.frame();
        }
        assert_eq!(worker.strip().0.len(), 2);
    }
}
