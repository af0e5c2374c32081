//! LED render state and indications.
//!
//! The steno worker decides *what* the LEDs show by storing a
//! [`RenderState`] in a critical-section cell. The LED worker owns the strip
//! and decides *when*: it animates the indications frame by frame.

use core::ptr;

/// LEDs on one half.
pub const MAX_LEDS: usize = 2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rgb8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb8 {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

pub const OFF: Rgb8 = Rgb8::new(0, 0, 0);

/// One step of an indication: a color held for a number of frames.
#[derive(Debug)]
pub struct Step {
    pub color: Rgb8,
    pub frames: u16,
}

/// A looping color sequence.
#[derive(Debug)]
pub struct Indication(pub &'static [Step]);

impl Indication {
    /// Color shown at `frame` frames after the indication started.
    pub fn color_at(&self, frame: u32) -> Rgb8 {
        let total: u32 = self.0.iter().map(|s| s.frames as u32).sum();
        if total == 0 {
            return OFF;
        }
        let mut pos = frame % total;
        for step in self.0 {
            if pos < step.frames as u32 {
                return step.color;
            }
            pos -= step.frames as u32;
        }
        OFF
    }
}

/// Waiting for USB or for the other half.
pub static INIT_INDICATOR: Indication = Indication(&[
    Step { color: Rgb8::new(8, 0, 0), frames: 10 },
    Step { color: Rgb8::new(0, 8, 0), frames: 10 },
    Step { color: Rgb8::new(0, 0, 8), frames: 10 },
    Step { color: OFF, frames: 30 },
]);

/// USB host attached, no other half heard from.
pub static USB_PRIMARY_INDICATOR: Indication = Indication(&[
    Step { color: Rgb8::new(8, 8, 0), frames: 30 },
    Step { color: OFF, frames: 30 },
]);

/// Forwarding keys to the primary half.
pub static SECONDARY_INDICATOR: Indication = Indication(&[Step {
    color: Rgb8::new(0, 6, 0),
    frames: 100,
}]);

/// Typing raw steno.
pub static STENO_RAW_INDICATOR: Indication = Indication(&[Step {
    color: Rgb8::new(16, 8, 0),
    frames: 100,
}]);

pub static OFF_INDICATOR: Indication = Indication(&[Step { color: OFF, frames: 100 }]);

/// What each LED should show. Small and `Copy` so it can live in a
/// [`crate::critical::Shared`] cell.
#[derive(Clone, Copy, Debug)]
pub struct RenderState {
    pub leds: [&'static Indication; MAX_LEDS],
}

impl RenderState {
    pub const fn all(indication: &'static Indication) -> Self {
        Self {
            leds: [indication; MAX_LEDS],
        }
    }

    /// Pixel colors for `frame`.
    pub fn render(&self, frame: u32) -> [Rgb8; MAX_LEDS] {
        let mut pixels = [OFF; MAX_LEDS];
        for (pixel, indication) in pixels.iter_mut().zip(self.leds.iter()) {
            *pixel = indication.color_at(frame);
        }
        pixels
    }
}

impl PartialEq for RenderState {
    fn eq(&self, other: &Self) -> bool {
        self.leds
            .iter()
            .zip(other.leds.iter())
            .all(|(a, b)| ptr::eq(*a, *b))
    }
}

impl Eq for RenderState {}

impl Default for RenderState {
    fn default() -> Self {
        Self::all(&INIT_INDICATOR)
    }
}

/// A strip of addressable LEDs.
///
/// A frame goes out in two steps. `load` encodes the pixels into the
/// timing-exact line waveform; the caller runs it with the scheduler
/// suspended, so it must not block. `show` hands the loaded waveform to the
/// hardware and may wait for the previous frame to finish.
pub trait LedStrip: Send {
    fn load(&mut self, pixels: &[Rgb8]) -> Result<(), i32>;
    fn show(&mut self) -> Result<(), i32>;
}
