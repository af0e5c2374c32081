//! Output stage: the only caller of [`OutputChannel::send_blocking`].
//!
//! Runs on the main/idle path. Each call to [`OutputStage::service`] either
//! sends one queued report, which may block until the previous one has
//! completed, or times out so the caller can drain logs.

use core::time::Duration;

use crate::diag::Diagnostics;
use crate::gate::{OutputChannel, ReportSink};
use crate::sys;
use crate::BG_LOG_STREAM;

use super::ReportQueue;

/// Outcome of one service pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Serviced {
    Sent,
    /// The sink rejected the report. It is not retried.
    Refused,
    Idle,
}

pub struct OutputStage<S: ReportSink> {
    channel: OutputChannel<S>,
    reports: &'static ReportQueue,
    diag: &'static Diagnostics,
}

impl<S: ReportSink> OutputStage<S> {
    pub fn new(
        channel: OutputChannel<S>,
        reports: &'static ReportQueue,
        diag: &'static Diagnostics,
    ) -> Self {
        Self {
            channel,
            reports,
            diag,
        }
    }

    pub fn service(&mut self, wait: Duration) -> Serviced {
        let Ok(report) = self.reports.pop_blocking(wait) else {
            return Serviced::Idle;
        };

        match self.channel.send_blocking(&report) {
            Ok(()) => {
                Diagnostics::bump(&self.diag.reports_sent);
                Serviced::Sent
            }
            Err(e) => {
                Diagnostics::bump(&self.diag.reports_refused);
                crate::rt_warn!(BG_LOG_STREAM, sys::now_us(), "output: report refused: {}", e);
                Serviced::Refused
            }
        }
    }

    pub fn channel(&self) -> &OutputChannel<S> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut OutputChannel<S> {
        &mut self.channel
    }
}
