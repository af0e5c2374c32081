//! GPIO key matrix lines.
//!
//! Rows are driven low one at a time; columns have pull-ups and read low
//! when the key at the crossing is down. Scanning itself is
//! [`KeyMatrix`](crate::workers::scan::KeyMatrix).

use esp_idf_svc::hal::gpio::{AnyInputPin, AnyOutputPin, Input, Output, PinDriver, Pull};
use esp_idf_svc::sys::{esp_rom_delay_us, EspError};

use crate::config::BoardTopology;
use crate::workers::scan::MatrixLines;

/// Settling time after selecting a row.
const ROW_SETTLE_US: u32 = 3;

type RowPin = PinDriver<'static, AnyOutputPin, Output>;
type ColPin = PinDriver<'static, AnyInputPin, Input>;

pub struct GpioLines {
    rows: [RowPin; 3],
    cols: [ColPin; 5],
}

fn row_pin(pin: u8) -> Result<RowPin, EspError> {
    // SAFETY: pin numbers come from the board topology.
    let mut driver = PinDriver::output(unsafe { AnyOutputPin::new(pin as i32) })?;
    driver.set_high()?;
    Ok(driver)
}

fn col_pin(pin: u8) -> Result<ColPin, EspError> {
    // SAFETY: pin numbers come from the board topology.
    let mut driver = PinDriver::input(unsafe { AnyInputPin::new(pin as i32) })?;
    driver.set_pull(Pull::Up)?;
    Ok(driver)
}

impl GpioLines {
    pub fn new(board: &BoardTopology) -> Result<Self, EspError> {
        let r = board.row_pins;
        let c = board.col_pins;
        Ok(Self {
            rows: [row_pin(r[0])?, row_pin(r[1])?, row_pin(r[2])?],
            cols: [
                col_pin(c[0])?,
                col_pin(c[1])?,
                col_pin(c[2])?,
                col_pin(c[3])?,
                col_pin(c[4])?,
            ],
        })
    }
}

impl MatrixLines for GpioLines {
    fn rows(&self) -> u8 {
        self.rows.len() as u8
    }

    fn cols(&self) -> u8 {
        self.cols.len() as u8
    }

    fn select(&mut self, row: u8) -> bool {
        let Some(pin) = self.rows.get_mut(row as usize) else {
            return false;
        };
        if pin.set_low().is_err() {
            return false;
        }
        // SAFETY: ROM busy-wait, no side effects.
        unsafe { esp_rom_delay_us(ROW_SETTLE_US) };
        true
    }

    fn deselect(&mut self, row: u8) -> bool {
        self.rows
            .get_mut(row as usize)
            .is_some_and(|pin| pin.set_high().is_ok())
    }

    fn is_down(&mut self, col: u8) -> bool {
        self.cols.get(col as usize).is_some_and(|pin| pin.is_low())
    }
}
