use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::workers::scan::MatrixScanner;

/// Matrix that replays queued transitions, a batch per scan.
#[derive(Clone, Default)]
pub struct ScriptedMatrix {
    batches: Arc<Mutex<VecDeque<std::vec::Vec<(u8, u8, bool)>>>>,
}

impl ScriptedMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transitions seen together by the next scan that finds this batch.
    pub fn push_batch(&self, batch: &[(u8, u8, bool)]) {
        self.lock().push_back(batch.to_vec());
    }

    /// Press then release each key, one transition per scan.
    pub fn chord(&self, keys: &[(u8, u8)]) {
        for &(row, col) in keys {
            self.push_batch(&[(row, col, true)]);
        }
        for &(row, col) in keys {
            self.push_batch(&[(row, col, false)]);
        }
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<std::vec::Vec<(u8, u8, bool)>>> {
        self.batches.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MatrixScanner for ScriptedMatrix {
    fn scan(&mut self, report: &mut dyn FnMut(u8, u8, bool)) {
        let batch = self.lock().pop_front();
        for (row, col, pressed) in batch.into_iter().flatten() {
            report(row, col, pressed);
        }
    }
}
