//! Module: config
//!
//! Purpose: Firmware configuration, built once at startup.
//!
//! Architecture:
//! - [`FirmwareConfig`] is a plain `const` value; [`CONFIG`] is the board
//!   default. Startup passes `&'static FirmwareConfig` to whatever needs it.
//! - Timing, thread descriptors and board topology live here. Queue depths
//!   are compile-time constants in [`crate::queue`] because they size
//!   static storage.
//! - Nothing is mutable after boot. Per-build choices (single board vs
//!   split) come from Cargo features.

use core::time::Duration;

use crate::engine::Side;
use crate::sys::SchedClass;
use crate::thread::ThreadDesc;

/// Timing for every periodic activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    /// Matrix sampling cadence.
    pub scan_period: Duration,
    pub heartbeat_period: Duration,
    pub led_frame_period: Duration,
    /// Longest wait on the scan queue before the steno worker polls the
    /// link anyway.
    pub steno_wait: Duration,
    /// Role negotiation and announce cadence.
    pub housekeeping_period: Duration,
    /// Longest wait on the report queue before the idle path drains logs.
    pub idle_wait: Duration,
}

/// Descriptors for the three worker threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Threads {
    pub scan: ThreadDesc,
    pub steno: ThreadDesc,
    pub led: ThreadDesc,
}

/// Inter-board UART.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkConfig {
    pub baud_rate: u32,
    pub tx_pin: u8,
    pub rx_pin: u8,
}

/// Physical description of this half.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoardTopology {
    pub side: Side,
    pub rows: u8,
    pub cols: u8,
    pub row_pins: [u8; 3],
    pub col_pins: [u8; 5],
    /// `None` on a single-board build.
    pub link: Option<LinkConfig>,
    pub led_pin: u8,
    /// TX-only UART for the log drain.
    pub log_tx_pin: u8,
    pub log_baud_rate: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FirmwareConfig {
    pub timing: Timing,
    pub threads: Threads,
    pub board: BoardTopology,
}

/// Stack sizes. These size the static thread slots, so they are constants
/// rather than config fields.
pub const SCAN_STACK_SIZE: usize = 2048;
pub const STENO_STACK_SIZE: usize = 4096;
pub const LED_STACK_SIZE: usize = 2048;

/// Workers are pinned away from the USB and Wi-Fi stacks on core 0.
const WORKER_CORE: Option<u8> = Some(1);

const LINK: Option<LinkConfig> = if cfg!(feature = "inter-board-link") {
    Some(LinkConfig {
        baud_rate: 460_800,
        tx_pin: 1,
        rx_pin: 2,
    })
} else {
    None
};

impl FirmwareConfig {
    pub const fn default_for(side: Side) -> Self {
        Self {
            timing: Timing {
                scan_period: Duration::from_millis(1),
                heartbeat_period: Duration::from_millis(1),
                led_frame_period: Duration::from_millis(10),
                steno_wait: Duration::from_millis(5),
                housekeeping_period: Duration::from_millis(100),
                idle_wait: Duration::from_millis(50),
            },
            threads: Threads {
                scan: ThreadDesc {
                    name: c"scan",
                    class: SchedClass::Preemptible(20),
                    core: WORKER_CORE,
                },
                steno: ThreadDesc {
                    name: c"steno",
                    class: SchedClass::Preemptible(10),
                    core: WORKER_CORE,
                },
                led: ThreadDesc {
                    name: c"led",
                    class: SchedClass::Cooperative,
                    core: WORKER_CORE,
                },
            },
            board: BoardTopology {
                side,
                rows: 3,
                cols: 5,
                row_pins: [4, 5, 6],
                col_pins: [7, 15, 16, 17, 18],
                link: LINK,
                led_pin: 48,
                log_tx_pin: 8,
                log_baud_rate: 115_200,
            },
        }
    }

    /// Check relations the rest of the firmware relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timing;
        if t.scan_period.is_zero() || t.led_frame_period.is_zero() {
            return Err(ConfigError::ZeroPeriod);
        }
        if t.heartbeat_period < crate::heartbeat::MIN_PERIOD {
            return Err(ConfigError::HeartbeatTooFast);
        }
        let b = &self.board;
        if b.rows as usize * b.cols as usize > crate::engine::KEYS_PER_SIDE {
            return Err(ConfigError::MatrixTooLarge);
        }
        let th = &self.threads;
        if !th.steno.class.preemptible_by(th.scan.class) {
            return Err(ConfigError::StenoAboveScan);
        }
        if th.led.class != SchedClass::Cooperative {
            return Err(ConfigError::LedPreemptible);
        }
        Ok(())
    }
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        CONFIG
    }
}

/// Board default: a left half.
pub const CONFIG: FirmwareConfig = FirmwareConfig::default_for(Side::Left);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    ZeroPeriod,
    HeartbeatTooFast,
    MatrixTooLarge,
    StenoAboveScan,
    LedPreemptible,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            ConfigError::ZeroPeriod => "K01: zero scan or frame period",
            ConfigError::HeartbeatTooFast => "K02: heartbeat below one tick",
            ConfigError::MatrixTooLarge => "K03: matrix larger than the keymap",
            ConfigError::StenoAboveScan => "K04: steno worker would preempt scan",
            ConfigError::LedPreemptible => "K05: LED worker must be cooperative",
        };
        f.write_str(msg)
    }
}
