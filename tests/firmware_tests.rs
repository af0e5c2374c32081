//! Full pipeline on the host backend: startup, scan to USB, link
//! forwarding, LEDs, heartbeat.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rust_split_steno::config::{FirmwareConfig, CONFIG};
use rust_split_steno::engine::RawStenoEngine;
use rust_split_steno::event::{HidReport, MOD_LEFT_SHIFT};
use rust_split_steno::firmware::{Boot, FirmwareCells, FirmwareError, Running};
use rust_split_steno::gate;
use rust_split_steno::heartbeat::{self, Heartbeat};
use rust_split_steno::link::InterBoardLink;
use rust_split_steno::log_drain::{LogDrain, LogSink};
use rust_split_steno::mock::{Completion, MockHid, MockUart, RecordingStrip, ScriptedMatrix};
use rust_split_steno::sys;
use rust_split_steno::thread::ThreadState;

static CFG: FirmwareConfig = CONFIG;
static CELLS: FirmwareCells<ScriptedMatrix, RawStenoEngine, MockUart, RecordingStrip> =
    FirmwareCells::new();

#[derive(Clone, Default)]
struct Lines(Arc<Mutex<Vec<String>>>);

impl LogSink for Lines {
    fn write_line(&mut self, line: &[u8]) {
        self.0
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(line).into_owned());
    }
}

fn service_until(
    running: &mut Running<MockHid, Lines>,
    timeout: Duration,
    mut done: impl FnMut() -> bool,
) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if done() {
            return true;
        }
        running.service();
    }
    done()
}

fn shifted(letter: u8) -> HidReport {
    HidReport::key(MOD_LEFT_SHIFT, 0x04 + (letter - b'A'))
}

#[test]
fn test_firmware_pipeline() {
    let prims = Boot::new(&CFG).unwrap().init_primitives(&CELLS).unwrap();

    let uart = MockUart::new(256).with_rx(&[0xff, 0xfe, 0x00]);
    let hid = MockHid::new(Completion::Immediate);
    let devices = prims.init_devices(InterBoardLink::present(uart.clone(), CELLS.diag()), hid.clone());
    assert_eq!(uart.rx_pending(), 0);

    let matrix = ScriptedMatrix::new();
    let strip = RecordingStrip::new();
    let lines = Lines::default();
    let mut running = devices
        .spawn_workers(
            matrix.clone(),
            RawStenoEngine::new(CFG.board.side, CFG.board.cols),
            strip.clone(),
            LogDrain::new(lines.clone()),
            heartbeat::liveness,
        )
        .unwrap();

    for handle in running.handles() {
        assert_eq!(handle.state(), ThreadState::Running);
    }

    // Host attaches; the left half announces itself primary.
    sys::simulate_isr(|| gate::on_host_status(true));
    let mut link_tx = Vec::new();
    assert!(service_until(&mut running, Duration::from_secs(3), || {
        link_tx.extend(uart.take_tx());
        link_tx.contains(&0x90)
    }));

    // S + T on this half: "ST ".
    matrix.chord(&[(2, 2), (1, 4)]);
    assert!(service_until(&mut running, Duration::from_secs(3), || hid.sent().len() >= 4));
    assert_eq!(
        hid.sent(),
        [shifted(b'S'), shifted(b'T'), HidReport::key(0, 0x2c), HidReport::RELEASE]
    );

    // -Z pressed and released on the other half: "-Z ".
    uart.inject(&[0x20 | 14, 14]);
    assert!(service_until(&mut running, Duration::from_secs(3), || hid.sent().len() >= 8));
    assert_eq!(
        hid.sent()[4..],
        [
            HidReport::key(0, 0x2d),
            shifted(b'Z'),
            HidReport::key(0, 0x2c),
            HidReport::RELEASE
        ]
    );
    assert!(running.output().channel().try_is_ready());

    let snap = running.diag().snapshot();
    assert_eq!(snap.scan_queued, 4);
    assert_eq!(snap.scan_dropped, 0);
    assert_eq!(snap.reports_sent, 8);
    assert_eq!(snap.link_noise, 3);

    assert!(!strip.frames().is_empty());
    assert!(Heartbeat::fired() > 0);

    // Logs reach the sink on the idle path.
    assert!(service_until(&mut running, Duration::from_secs(1), || {
        lines.0.lock().unwrap().iter().any(|l| l.contains("boot:"))
    }));

    // Storage backs exactly one firmware instance.
    let again = Boot::new(&CFG).unwrap().init_primitives(&CELLS).err();
    assert_eq!(again, Some(FirmwareError::AlreadyInitialized));
}
