//! Startup sequence.
//!
//! The order is fixed and enforced by types: each stage consumes the
//! previous one.
//!
//! ```text
//! Boot::new(cfg)
//!   └─ init_primitives(cells)   queues, output gate, render state,
//!        │                      completion routing
//!        └─ init_devices(link, hid)   link drain, HID channel
//!             └─ spawn_workers(...)   scan, steno, LED, heartbeat
//!                  └─ Running::idle()  output stage + log drain, forever
//! ```
//!
//! Storage for every primitive and worker lives in a caller-provided
//! `static` [`FirmwareCells`], so nothing is allocated.

use core::fmt;

use static_cell::StaticCell;

use crate::config::{
    ConfigError, FirmwareConfig, LED_STACK_SIZE, SCAN_STACK_SIZE, STENO_STACK_SIZE,
};
use crate::critical::Shared;
use crate::diag::Diagnostics;
use crate::error::SysError;
use crate::gate::{self, OutputChannel, OutputGate, ReportSink};
use crate::heartbeat::Heartbeat;
use crate::leds::{LedStrip, RenderState};
use crate::link::{InterBoardLink, UartPort};
use crate::log_drain::{LogDrain, LogSink};
use crate::sys;
use crate::thread::{self, ThreadHandle, ThreadSlot};
use crate::workers::led::LedWorker;
use crate::workers::output::{OutputStage, Serviced};
use crate::workers::scan::{MatrixScanner, ScanWorker};
use crate::workers::steno::{StenoEngine, StenoWorker};
use crate::workers::{ReportQueue, ScanQueue};
use crate::BG_LOG_STREAM;

/// Polls allowed for each worker to reach `Running`.
const START_ATTEMPTS: u32 = 100;

/// Startup failure. Any of these leaves the device without workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FirmwareError {
    Config(ConfigError),
    Sys(SysError),
    /// A [`FirmwareCells`] was used for a second boot.
    AlreadyInitialized,
    /// Completion interrupts are already routed to another gate.
    CompletionRouted,
}

impl From<ConfigError> for FirmwareError {
    fn from(e: ConfigError) -> Self {
        FirmwareError::Config(e)
    }
}

impl From<SysError> for FirmwareError {
    fn from(e: SysError) -> Self {
        FirmwareError::Sys(e)
    }
}

impl fmt::Display for FirmwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirmwareError::Config(e) => write!(f, "{}", e),
            FirmwareError::Sys(e) => write!(f, "{}", e),
            FirmwareError::AlreadyInitialized => f.write_str("F01: firmware cells already used"),
            FirmwareError::CompletionRouted => f.write_str("F02: completion already routed"),
        }
    }
}

/// Static storage for one firmware instance.
///
/// Declare it as a `static` with the concrete collaborator types:
///
/// ```ignore
/// static CELLS: FirmwareCells<KeyMatrix<GpioLines>, RawStenoEngine, LinkUart, StripLeds> =
///     FirmwareCells::new();
/// ```
pub struct FirmwareCells<M: MatrixScanner, E: StenoEngine, U: UartPort, L: LedStrip> {
    diag: Diagnostics,
    scan_queue: StaticCell<ScanQueue>,
    report_queue: StaticCell<ReportQueue>,
    gate: StaticCell<OutputGate>,
    render: StaticCell<Shared<RenderState>>,
    scan_slot: ThreadSlot<SCAN_STACK_SIZE>,
    steno_slot: ThreadSlot<STENO_STACK_SIZE>,
    led_slot: ThreadSlot<LED_STACK_SIZE>,
    scan_worker: StaticCell<ScanWorker<M>>,
    steno_worker: StaticCell<StenoWorker<E, U>>,
    led_worker: StaticCell<LedWorker<L>>,
}

impl<M: MatrixScanner, E: StenoEngine, U: UartPort, L: LedStrip> FirmwareCells<M, E, U, L> {
    pub const fn new() -> Self {
        Self {
            diag: Diagnostics::new(),
            scan_queue: StaticCell::new(),
            report_queue: StaticCell::new(),
            gate: StaticCell::new(),
            render: StaticCell::new(),
            scan_slot: ThreadSlot::new(),
            steno_slot: ThreadSlot::new(),
            led_slot: ThreadSlot::new(),
            scan_worker: StaticCell::new(),
            steno_worker: StaticCell::new(),
            led_worker: StaticCell::new(),
        }
    }

    pub fn diag(&'static self) -> &'static Diagnostics {
        &self.diag
    }
}

impl<M: MatrixScanner, E: StenoEngine, U: UartPort, L: LedStrip> Default
    for FirmwareCells<M, E, U, L>
{
    fn default() -> Self {
        Self::new()
    }
}

fn init_cell<T>(cell: &'static StaticCell<T>, value: T) -> Result<&'static mut T, FirmwareError> {
    cell.try_init(value).ok_or(FirmwareError::AlreadyInitialized)
}

/// Stage 0: configuration checked, nothing created yet.
pub struct Boot {
    cfg: &'static FirmwareConfig,
}

impl Boot {
    pub fn new(cfg: &'static FirmwareConfig) -> Result<Self, FirmwareError> {
        cfg.validate()?;
        crate::rt_info!(
            BG_LOG_STREAM,
            sys::now_us(),
            "boot: {} half, {}x{} matrix, link {}",
            cfg.board.side.as_str(),
            cfg.board.rows,
            cfg.board.cols,
            if cfg.board.link.is_some() { "present" } else { "absent" }
        );
        Ok(Self { cfg })
    }

    /// Create queues, the output gate and the render state, and route
    /// completion interrupts to the gate.
    pub fn init_primitives<M, E, U, L>(
        self,
        cells: &'static FirmwareCells<M, E, U, L>,
    ) -> Result<Primitives<M, E, U, L>, FirmwareError>
    where
        M: MatrixScanner + 'static,
        E: StenoEngine + 'static,
        U: UartPort + 'static,
        L: LedStrip + 'static,
    {
        let events: &'static ScanQueue = init_cell(&cells.scan_queue, ScanQueue::new())?;
        let reports: &'static ReportQueue = init_cell(&cells.report_queue, ReportQueue::new())?;
        let gate: &'static OutputGate = init_cell(&cells.gate, OutputGate::new()?)?;
        let render: &'static Shared<RenderState> =
            init_cell(&cells.render, Shared::new(RenderState::default()))?;

        if !gate::register_completion(gate) {
            return Err(FirmwareError::CompletionRouted);
        }

        crate::rt_debug!(
            BG_LOG_STREAM,
            sys::now_us(),
            "boot: queues {}/{}",
            events.capacity(),
            reports.capacity()
        );

        Ok(Primitives {
            cfg: self.cfg,
            cells,
            events,
            reports,
            gate,
            render,
        })
    }
}

/// Stage 1: primitives exist, no devices touched.
pub struct Primitives<M: MatrixScanner + 'static, E: StenoEngine + 'static, U: UartPort + 'static, L: LedStrip + 'static> {
    cfg: &'static FirmwareConfig,
    cells: &'static FirmwareCells<M, E, U, L>,
    events: &'static ScanQueue,
    reports: &'static ReportQueue,
    gate: &'static OutputGate,
    render: &'static Shared<RenderState>,
}

impl<M, E, U, L> Primitives<M, E, U, L>
where
    M: MatrixScanner + 'static,
    E: StenoEngine + 'static,
    U: UartPort + 'static,
    L: LedStrip + 'static,
{
    /// Bring up the output devices: drain the link and attach the HID sink
    /// to the gate.
    pub fn init_devices<S: ReportSink>(
        self,
        mut link: InterBoardLink<U>,
        hid: S,
    ) -> Devices<M, E, U, L, S> {
        let drained = link.setup();
        crate::rt_info!(
            BG_LOG_STREAM,
            sys::now_us(),
            "boot: link {}, {} bytes drained",
            if link.is_present() { "up" } else { "absent" },
            drained
        );

        let channel = OutputChannel::new(self.gate, hid);
        Devices {
            prims: self,
            link,
            channel,
        }
    }

    pub fn render(&self) -> &'static Shared<RenderState> {
        self.render
    }
}

/// Stage 2: devices ready, no threads yet.
pub struct Devices<M, E, U, L, S>
where
    M: MatrixScanner + 'static,
    E: StenoEngine + 'static,
    U: UartPort + 'static,
    L: LedStrip + 'static,
    S: ReportSink,
{
    prims: Primitives<M, E, U, L>,
    link: InterBoardLink<U>,
    channel: OutputChannel<S>,
}

impl<M, E, U, L, S> Devices<M, E, U, L, S>
where
    M: MatrixScanner + 'static,
    E: StenoEngine + 'static,
    U: UartPort + 'static,
    L: LedStrip + 'static,
    S: ReportSink,
{
    /// Start the three workers and the heartbeat.
    pub fn spawn_workers<K: LogSink>(
        self,
        matrix: M,
        engine: E,
        strip: L,
        log: LogDrain<K>,
        heartbeat: fn(),
    ) -> Result<Running<S, K>, FirmwareError> {
        let Devices {
            prims,
            link,
            channel,
        } = self;
        let Primitives {
            cfg,
            cells,
            events,
            reports,
            render,
            ..
        } = prims;
        let diag = &cells.diag;
        let timing = &cfg.timing;

        let scan = init_cell(
            &cells.scan_worker,
            ScanWorker::new(matrix, events, diag, timing.scan_period),
        )?;
        let steno = init_cell(
            &cells.steno_worker,
            StenoWorker::new(
                engine,
                link,
                events,
                reports,
                render,
                diag,
                timing.steno_wait,
                timing.housekeeping_period,
            ),
        )?;
        let led = init_cell(
            &cells.led_worker,
            LedWorker::new(strip, render, diag, timing.led_frame_period),
        )?;

        // Consumers first, so nothing produced is left waiting.
        let handles = [
            thread::spawn(&cfg.threads.led, &cells.led_slot, led)?,
            thread::spawn(&cfg.threads.steno, &cells.steno_slot, steno)?,
            thread::spawn(&cfg.threads.scan, &cells.scan_slot, scan)?,
        ];
        for handle in &handles {
            if !handle.wait_running(START_ATTEMPTS) {
                crate::rt_warn!(
                    BG_LOG_STREAM,
                    sys::now_us(),
                    "boot: {:?} not running yet",
                    handle.name()
                );
            }
        }

        let heartbeat = Heartbeat::start(timing.heartbeat_period, heartbeat)?;
        crate::rt_info!(BG_LOG_STREAM, sys::now_us(), "boot: workers running");

        Ok(Running {
            cfg,
            output: OutputStage::new(channel, reports, diag),
            reports,
            log,
            diag,
            handles,
            _heartbeat: heartbeat,
        })
    }
}

/// Stage 3: everything runs; the caller's thread becomes the idle path.
pub struct Running<S: ReportSink, K: LogSink> {
    cfg: &'static FirmwareConfig,
    output: OutputStage<S>,
    reports: &'static ReportQueue,
    log: LogDrain<K>,
    diag: &'static Diagnostics,
    handles: [ThreadHandle; 3],
    _heartbeat: Heartbeat,
}

impl<S: ReportSink, K: LogSink> Running<S, K> {
    /// One idle-path step: send a report if one is queued, drain logs when
    /// the report queue is empty.
    pub fn service(&mut self) -> Serviced {
        let served = self.output.service(self.cfg.timing.idle_wait);
        if served == Serviced::Idle || self.reports.is_empty() {
            self.log.drain(sys::now_us());
        }
        served
    }

    /// Never returns.
    pub fn idle(mut self) -> ! {
        loop {
            self.service();
        }
    }

    pub fn diag(&self) -> &'static Diagnostics {
        self.diag
    }

    /// Worker handles: LED, steno, scan.
    pub fn handles(&self) -> &[ThreadHandle; 3] {
        &self.handles
    }

    pub fn output(&self) -> &OutputStage<S> {
        &self.output
    }

    pub fn log(&self) -> &LogDrain<K> {
        &self.log
    }
}
