use std::sync::{Arc, Mutex};
use std::vec::Vec;

use crate::error::SinkError;
use crate::event::HidReport;
use crate::gate::{self, ReportSink};
use crate::sys;

/// When the simulated host reads a report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// Completion interrupt fires before `write_report` returns.
    Immediate,
    /// The test fires it with [`MockHid::complete`].
    Manual,
}

/// HID endpoint that records reports.
#[derive(Clone)]
pub struct MockHid {
    sent: Arc<Mutex<Vec<HidReport>>>,
    completion: Completion,
}

impl MockHid {
    pub fn new(completion: Completion) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            completion,
        }
    }

    /// Fire the completion interrupt for the report in flight.
    pub fn complete(&self) {
        sys::simulate_isr(gate::on_report_complete);
    }

    pub fn sent(&self) -> Vec<HidReport> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ReportSink for MockHid {
    fn write_report(&mut self, report: &HidReport) -> Result<(), SinkError> {
        if !gate::host_attached() {
            return Err(SinkError::NotConfigured);
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(*report);
        if self.completion == Completion::Immediate {
            self.complete();
        }
        Ok(())
    }
}
