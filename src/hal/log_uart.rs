//! TX-only log UART.
//!
//! ```text
//! ESP32-S3 GPIO8 (TX) ──────▶ USB-UART RX
//!                              └─▶ PC Serial Monitor
//! ```

use esp_idf_svc::hal::gpio::AnyIOPin;
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::uart::{self, Uart, UartTxDriver};
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::sys::EspError;

use crate::log_drain::LogSink;

pub struct UartLog {
    uart: UartTxDriver<'static>,
}

impl UartLog {
    pub fn new<U: Uart>(
        uart: impl Peripheral<P = U> + 'static,
        tx_pin: u8,
        baud_rate: u32,
    ) -> Result<Self, EspError> {
        let config = uart::config::Config::default().baudrate(Hertz(baud_rate));
        // SAFETY: the log pin comes from the board topology.
        let tx = unsafe { AnyIOPin::new(tx_pin as i32) };
        let uart = UartTxDriver::new(
            uart,
            tx,
            Option::<AnyIOPin>::None, // CTS
            Option::<AnyIOPin>::None, // RTS
            &config,
        )?;
        Ok(Self { uart })
    }
}

impl LogSink for UartLog {
    fn write_line(&mut self, line: &[u8]) {
        let _ = self.uart.write(line);
    }
}
