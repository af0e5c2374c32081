//! WS2812 strip over RMT.

use core::time::Duration;

use esp_idf_svc::hal::gpio::AnyOutputPin;
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::rmt::config::TransmitConfig;
use esp_idf_svc::hal::rmt::{FixedLengthSignal, PinState, Pulse, RmtChannel, TxRmtDriver};
use esp_idf_svc::sys::EspError;

use crate::leds::{LedStrip, Rgb8, MAX_LEDS};

const BITS: usize = MAX_LEDS * 24;

pub struct StripLeds {
    tx: TxRmtDriver<'static>,
    zero: (Pulse, Pulse),
    one: (Pulse, Pulse),
    loaded: Option<FixedLengthSignal<BITS>>,
}

impl StripLeds {
    pub fn new<C: RmtChannel>(
        channel: impl Peripheral<P = C> + 'static,
        pin: u8,
    ) -> Result<Self, EspError> {
        let config = TransmitConfig::new().clock_divider(1);
        // SAFETY: the LED pin comes from the board topology.
        let pin = unsafe { AnyOutputPin::new(pin as i32) };
        let tx = TxRmtDriver::new(channel, pin, &config)?;

        let hz = tx.counter_clock()?;
        let pulse = |state, ns| Pulse::new_with_duration(hz, state, &Duration::from_nanos(ns));
        let zero = (pulse(PinState::High, 350)?, pulse(PinState::Low, 800)?);
        let one = (pulse(PinState::High, 700)?, pulse(PinState::Low, 600)?);

        Ok(Self {
            tx,
            zero,
            one,
            loaded: None,
        })
    }

    fn encode(&self, pixels: &[Rgb8]) -> Result<FixedLengthSignal<BITS>, EspError> {
        let mut signal = FixedLengthSignal::<BITS>::new();
        let mut i = 0;
        for px in pixels.iter().take(MAX_LEDS) {
            let grb = (px.g as u32) << 16 | (px.r as u32) << 8 | px.b as u32;
            for bit in (0..24).rev() {
                let level = if grb & (1 << bit) != 0 { &self.one } else { &self.zero };
                signal.set(i, level)?;
                i += 1;
            }
        }
        Ok(signal)
    }
}

impl LedStrip for StripLeds {
    fn load(&mut self, pixels: &[Rgb8]) -> Result<(), i32> {
        self.loaded = Some(self.encode(pixels).map_err(|e| e.code())?);
        Ok(())
    }

    /// `start` waits on the driver's transmit-done semaphore for the
    /// previous frame, so this runs with the scheduler live. RMT clocks
    /// the waveform out in hardware.
    fn show(&mut self) -> Result<(), i32> {
        match self.loaded.take() {
            Some(signal) => self.tx.start(signal).map_err(|e| e.code()),
            None => Ok(()),
        }
    }
}
