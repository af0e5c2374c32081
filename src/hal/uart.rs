//! Inter-board UART, polled at the hardware FIFO.
//!
//! No IDF UART driver is installed on this port, so no driver interrupt
//! handler exists for it. The port is configured with `uart_param_config`
//! and `uart_set_pin` only; [`UartPort::disable_interrupts`] masks the RX
//! and TX interrupt sources, and bytes move through the FIFO registers via
//! the IDF UART HAL.

use core::ffi::c_void;
use core::ptr;

use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::uart::config::SourceClock;
use esp_idf_svc::hal::uart::Uart;
use esp_idf_svc::sys::{self, esp, uart_port_t, EspError};

use crate::config::LinkConfig;
use crate::link::UartPort;
use crate::sys as kernel;
use crate::BG_LOG_STREAM;

/// Hardware RX FIFO depth.
const RX_FIFO_LEN: usize = 128;

/// `UART_PIN_NO_CHANGE`.
const NO_PIN: i32 = -1;

/// `uart_hal_context_t`.
#[repr(C)]
struct HalContext {
    dev: *mut c_void,
}

// The HAL FIFO accessors live in the IDF `hal` component; they are not in
// the generated bindings. The register blocks are linker symbols.
extern "C" {
    static mut UART0: u8;
    static mut UART1: u8;
    static mut UART2: u8;

    fn uart_hal_read_rxfifo(hal: *mut HalContext, buf: *mut u8, inout_rd_len: *mut i32);
    fn uart_hal_write_txfifo(
        hal: *mut HalContext,
        buf: *const u8,
        data_size: u32,
        write_size: *mut u32,
    );
}

fn register_block(port: uart_port_t) -> Option<*mut c_void> {
    // SAFETY: only the address of the register block is taken.
    let dev = unsafe {
        match port {
            0 => ptr::addr_of_mut!(UART0),
            1 => ptr::addr_of_mut!(UART1),
            2 => ptr::addr_of_mut!(UART2),
            _ => return None,
        }
    };
    Some(dev.cast())
}

pub struct LinkUart {
    port: uart_port_t,
    hal: HalContext,
    /// Bytes already pulled out of the RX FIFO.
    rx: [u8; RX_FIFO_LEN],
    rx_len: usize,
    rx_pos: usize,
}

// SAFETY: `hal.dev` points at this port's memory-mapped registers, which
// nothing else touches once the peripheral has been consumed here.
unsafe impl Send for LinkUart {}

impl LinkUart {
    pub fn new<U: Uart>(
        _uart: impl Peripheral<P = U> + 'static,
        cfg: &LinkConfig,
    ) -> Result<Self, EspError> {
        let port = U::port();
        let Some(dev) = register_block(port) else {
            return Err(EspError::from_infallible::<{ sys::ESP_ERR_INVALID_ARG as i32 }>());
        };

        let config = sys::uart_config_t {
            baud_rate: cfg.baud_rate as i32,
            data_bits: sys::uart_word_length_t_UART_DATA_8_BITS,
            parity: sys::uart_parity_t_UART_PARITY_DISABLE,
            stop_bits: sys::uart_stop_bits_t_UART_STOP_BITS_1,
            flow_ctrl: sys::uart_hw_flowcontrol_t_UART_HW_FLOWCTRL_DISABLE,
            source_clk: SourceClock::default().into(),
            ..Default::default()
        };
        // SAFETY: the port is owned through `_uart`; no driver is installed.
        unsafe {
            esp!(sys::uart_param_config(port, &config))?;
            esp!(sys::uart_set_pin(port, cfg.tx_pin as i32, cfg.rx_pin as i32, NO_PIN, NO_PIN))?;
        }

        Ok(Self {
            port,
            hal: HalContext { dev },
            rx: [0; RX_FIFO_LEN],
            rx_len: 0,
            rx_pos: 0,
        })
    }

    fn refill(&mut self) {
        // Zero asks the HAL to read everything the FIFO holds.
        let mut len: i32 = 0;
        // SAFETY: `rx` holds a full FIFO; `hal` addresses this port.
        unsafe { uart_hal_read_rxfifo(&mut self.hal, self.rx.as_mut_ptr(), &mut len) };
        self.rx_len = (len.max(0) as usize).min(RX_FIFO_LEN);
        self.rx_pos = 0;
    }
}

impl UartPort for LinkUart {
    fn disable_interrupts(&mut self) {
        // SAFETY: the port is owned by this adapter.
        let rx = unsafe { esp!(sys::uart_disable_rx_intr(self.port)) };
        let tx = unsafe { esp!(sys::uart_disable_tx_intr(self.port)) };
        if let Err(e) = rx.and(tx) {
            crate::rt_warn!(
                BG_LOG_STREAM,
                kernel::now_us(),
                "link: masking uart{} interrupts failed ({})",
                self.port,
                e.code()
            );
        }
    }

    fn read_byte(&mut self) -> Option<u8> {
        if self.rx_pos == self.rx_len {
            self.refill();
        }
        if self.rx_pos == self.rx_len {
            return None;
        }
        let byte = self.rx[self.rx_pos];
        self.rx_pos += 1;
        Some(byte)
    }

    fn write_byte(&mut self, byte: u8) -> bool {
        let mut written: u32 = 0;
        // SAFETY: one byte from the stack; the HAL writes only what fits.
        unsafe { uart_hal_write_txfifo(&mut self.hal, &byte, 1, &mut written) };
        written == 1
    }
}
