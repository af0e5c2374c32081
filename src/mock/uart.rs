use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::vec::Vec;

use crate::link::UartPort;

#[derive(Default)]
struct Wire {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    irq_enabled: bool,
}

/// UART with injectable RX bytes and a bounded TX FIFO.
///
/// Clones share the same wire, so a test can keep one while the link owns
/// the other.
#[derive(Clone)]
pub struct MockUart {
    wire: Arc<Mutex<Wire>>,
    tx_capacity: usize,
}

impl MockUart {
    pub fn new(tx_capacity: usize) -> Self {
        Self {
            wire: Arc::new(Mutex::new(Wire {
                irq_enabled: true,
                ..Wire::default()
            })),
            tx_capacity,
        }
    }

    /// Bytes already sitting in RX before anyone reads, e.g. boot noise.
    pub fn with_rx(self, bytes: &[u8]) -> Self {
        self.inject(bytes);
        self
    }

    pub fn inject(&self, bytes: &[u8]) {
        self.lock().rx.extend(bytes.iter().copied());
    }

    /// Everything sent so far. Taking it frees the TX FIFO.
    pub fn take_tx(&self) -> Vec<u8> {
        std::mem::take(&mut self.lock().tx)
    }

    pub fn rx_pending(&self) -> usize {
        self.lock().rx.len()
    }

    pub fn irq_enabled(&self) -> bool {
        self.lock().irq_enabled
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Wire> {
        self.wire.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl UartPort for MockUart {
    fn disable_interrupts(&mut self) {
        self.lock().irq_enabled = false;
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.lock().rx.pop_front()
    }

    fn write_byte(&mut self, byte: u8) -> bool {
        let mut wire = self.lock();
        if wire.tx.len() >= self.tx_capacity {
            return false;
        }
        wire.tx.push(byte);
        true
    }
}
