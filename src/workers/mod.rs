//! Worker threads.
//!
//! | Worker | Class | Waits on |
//! |--------|-------|----------|
//! | [`scan::ScanWorker`] | preemptible, highest | fixed scan cadence |
//! | [`steno::StenoWorker`] | preemptible, below scan | scan queue (with timeout) |
//! | [`led::LedWorker`] | cooperative | fixed frame cadence |
//! | [`output::OutputStage`] | main/idle path | report queue, output gate |
//!
//! Each worker owns its collaborators outright and only shares data
//! through the bounded queues, the output gate and critical-section cells.

pub mod led;
pub mod output;
pub mod scan;
pub mod steno;

use crate::event::{HidReport, ScanEvent};
use crate::queue::{BoundedQueue, REPORT_QUEUE_DEPTH, SCAN_QUEUE_DEPTH};

/// Matrix events, scan worker → steno worker.
pub type ScanQueue = BoundedQueue<ScanEvent, SCAN_QUEUE_DEPTH>;

/// HID reports, steno worker → output stage.
pub type ReportQueue = BoundedQueue<HidReport, REPORT_QUEUE_DEPTH>;
