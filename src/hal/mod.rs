//! Device adapters (ESP-IDF).
//!
//! Thin wrappers around ESP-IDF peripherals, each implementing one of the
//! collaborator traits. Logic stays in the core modules; this is just I/O.

pub mod leds;
pub mod log_uart;
pub mod matrix;
pub mod uart;
pub mod usb;

pub use leds::StripLeds;
pub use log_uart::UartLog;
pub use matrix::GpioLines;
pub use uart::LinkUart;
pub use usb::UsbHid;
