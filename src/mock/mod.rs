//! Host stand-ins for the device adapters.
//!
//! Used by the host build of the firmware binary and by the integration
//! tests. Each one records what the core did to it so tests can assert on
//! it afterwards, through a shared handle where the adapter itself moves
//! into a worker.

mod hid;
mod leds;
mod log;
mod matrix;
mod uart;

pub use hid::{Completion, MockHid};
pub use leds::RecordingStrip;
pub use log::StdoutSink;
pub use matrix::ScriptedMatrix;
pub use uart::MockUart;
