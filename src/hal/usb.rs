//! USB HID keyboard endpoint.
//!
//! The USB stack itself lives in the platform C glue. This module sends
//! reports through it and receives its callbacks:
//!
//! - `kbd_hid_report_complete()` from the USB interrupt once the host has
//!   read the report in flight.
//! - `kbd_usb_status(configured)` on mount, unmount and suspend.

use crate::error::SinkError;
use crate::event::HidReport;
use crate::gate::{self, ReportSink};

extern "C" {
    fn kbd_usb_init() -> i32;
    fn kbd_hid_write_report(report: *const u8, len: usize) -> i32;
}

/// Completion callback, interrupt context.
#[no_mangle]
pub extern "C" fn kbd_hid_report_complete() {
    gate::on_report_complete();
}

/// Host connection callback, interrupt context.
#[no_mangle]
pub extern "C" fn kbd_usb_status(configured: bool) {
    gate::on_host_status(configured);
}

pub struct UsbHid {
    _private: (),
}

impl UsbHid {
    pub fn init() -> Result<Self, SinkError> {
        // SAFETY: called once during startup, before any report is sent.
        let rc = unsafe { kbd_usb_init() };
        if rc != 0 {
            return Err(SinkError::Device(rc));
        }
        Ok(Self { _private: () })
    }
}

impl ReportSink for UsbHid {
    fn write_report(&mut self, report: &HidReport) -> Result<(), SinkError> {
        if !gate::host_attached() {
            return Err(SinkError::NotConfigured);
        }
        let bytes = report.as_bytes();
        // SAFETY: the glue copies the report before returning.
        let rc = unsafe { kbd_hid_write_report(bytes.as_ptr(), bytes.len()) };
        match rc {
            0 => Ok(()),
            code => Err(SinkError::Device(code)),
        }
    }
}
