//! Inter-board link.
//!
//! Raw, unframed, best-effort byte transport over the UART between the two
//! halves. Polled only: [`InterBoardLink::setup`] masks the UART interrupt
//! sources so nothing on this path runs in interrupt context.
//!
//! - Sends never block. A full TX FIFO drops the byte.
//! - Setup drains boot-time noise from the RX path.
//! - A single-board build has no link. Every operation is then a no-op
//!   ([`InterBoardLink::absent`]); this is configuration, not an error.

use crate::diag::Diagnostics;
use crate::sys;
use crate::BG_LOG_STREAM;

/// Upper bound on bytes discarded during setup. A peer that is already
/// transmitting would otherwise keep the drain going forever.
pub const DRAIN_LIMIT: usize = 4096;

/// Byte-level access to a UART, non-blocking in both directions.
pub trait UartPort: Send {
    /// Mask RX/TX interrupt sources.
    fn disable_interrupts(&mut self);

    /// Next received byte, `None` if the RX FIFO is empty.
    fn read_byte(&mut self) -> Option<u8>;

    /// Queue a byte for transmission. Returns false if the TX FIFO is full.
    fn write_byte(&mut self, byte: u8) -> bool;
}

/// Outgoing best-effort byte channel.
pub trait LinkWriter {
    fn send_byte_nonblocking(&mut self, byte: u8);
}

/// Link to the other half, or nothing.
pub struct InterBoardLink<U: UartPort> {
    port: Option<U>,
    diag: &'static Diagnostics,
}

impl<U: UartPort> InterBoardLink<U> {
    /// Link over `port`.
    pub fn present(port: U, diag: &'static Diagnostics) -> Self {
        Self {
            port: Some(port),
            diag,
        }
    }

    /// Single-board variant.
    pub fn absent(diag: &'static Diagnostics) -> Self {
        Self { port: None, diag }
    }

    pub fn is_present(&self) -> bool {
        self.port.is_some()
    }

    /// Disable interrupts and discard whatever is already in the RX path.
    ///
    /// Returns the number of bytes discarded.
    pub fn setup(&mut self) -> usize {
        let Some(port) = self.port.as_mut() else {
            return 0;
        };

        port.disable_interrupts();

        let mut drained = 0;
        while drained < DRAIN_LIMIT {
            if port.read_byte().is_none() {
                break;
            }
            drained += 1;
        }

        Diagnostics::add(&self.diag.link_noise, drained as u32);
        if drained == DRAIN_LIMIT {
            crate::rt_warn!(
                BG_LOG_STREAM,
                sys::now_us(),
                "link: RX still busy after discarding {} bytes",
                drained
            );
        } else if drained > 0 {
            crate::rt_debug!(BG_LOG_STREAM, sys::now_us(), "link: discarded {} boot bytes", drained);
        }
        drained
    }

    /// Next received byte, if any.
    pub fn poll_byte(&mut self) -> Option<u8> {
        let byte = self.port.as_mut()?.read_byte()?;
        Diagnostics::bump(&self.diag.link_rx);
        Some(byte)
    }

    /// Send a byte if the TX FIFO has room; otherwise drop it.
    pub fn send_byte_nonblocking(&mut self, byte: u8) {
        let Some(port) = self.port.as_mut() else {
            return;
        };
        if port.write_byte(byte) {
            Diagnostics::bump(&self.diag.link_tx);
        } else {
            Diagnostics::bump(&self.diag.link_tx_dropped);
        }
    }

    pub fn port(&self) -> Option<&U> {
        self.port.as_ref()
    }
}

impl<U: UartPort> LinkWriter for InterBoardLink<U> {
    fn send_byte_nonblocking(&mut self, byte: u8) {
        InterBoardLink::send_byte_nonblocking(self, byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Loopback {
        rx: VecDeque<u8>,
        tx: VecDeque<u8>,
        tx_room: usize,
        irq_enabled: bool,
    }

    impl Loopback {
        fn with_noise(noise: &[u8]) -> Self {
            Self {
                rx: noise.iter().copied().collect(),
                tx: VecDeque::new(),
                tx_room: 2,
                irq_enabled: true,
            }
        }
    }

    impl UartPort for Loopback {
        fn disable_interrupts(&mut self) {
            self.irq_enabled = false;
        }

        fn read_byte(&mut self) -> Option<u8> {
            self.rx.pop_front()
        }

        fn write_byte(&mut self, byte: u8) -> bool {
            if self.tx.len() >= self.tx_room {
                return false;
            }
            self.tx.push_back(byte);
            true
        }
    }

    #[test]
    fn test_setup_drains_and_masks() {
        static DIAG: Diagnostics = Diagnostics::new();
        let mut link = InterBoardLink::present(Loopback::with_noise(&[0xff, 0x00, 0x55]), &DIAG);

        assert_eq!(link.setup(), 3);
        assert_eq!(link.poll_byte(), None);
        assert!(!link.port().unwrap().irq_enabled);
        assert_eq!(DIAG.snapshot().link_noise, 3);
    }

    #[test]
    fn test_drain_is_bounded() {
        static DIAG: Diagnostics = Diagnostics::new();
        let noise = std::vec![0xaa; DRAIN_LIMIT + 10];
        let mut link = InterBoardLink::present(Loopback::with_noise(&noise), &DIAG);

        assert_eq!(link.setup(), DRAIN_LIMIT);
        assert_eq!(link.poll_byte(), Some(0xaa));
    }

    #[test]
    fn test_full_fifo_drops() {
        static DIAG: Diagnostics = Diagnostics::new();
        let mut link = InterBoardLink::present(Loopback::with_noise(&[]), &DIAG);

        for b in 1..=4 {
            link.send_byte_nonblocking(b);
        }
        let port = link.port().unwrap();
        assert_eq!(port.tx.iter().copied().collect::<std::vec::Vec<_>>(), [1, 2]);
        let snap = DIAG.snapshot();
        assert_eq!(snap.link_tx, 2);
        assert_eq!(snap.link_tx_dropped, 2);
    }

    #[test]
    fn test_absent_is_inert() {
        static DIAG: Diagnostics = Diagnostics::new();
        let mut link: InterBoardLink<Loopback> = InterBoardLink::absent(&DIAG);

        assert!(!link.is_present());
        assert_eq!(link.setup(), 0);
        assert_eq!(link.poll_byte(), None);
        link.send_byte_nonblocking(0x42);
        assert_eq!(DIAG.snapshot(), Default::default());
    }
}
