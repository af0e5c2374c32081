//! RustSplitSteno - Main entry point
//!
//! On the device: bring up one keyboard half and turn the main task into
//! the idle path. On a host: run the same startup against mock devices,
//! type one scripted stroke and print what reached the USB endpoint.

#![cfg_attr(target_os = "espidf", no_std)]
#![cfg_attr(target_os = "espidf", no_main)]

#[cfg(target_os = "espidf")]
mod device {
    use core::fmt;

    use esp_idf_svc::hal::peripherals::Peripherals;
    use esp_idf_svc::sys::{self as esp_idf_sys, EspError};

    use rust_split_steno::config::{FirmwareConfig, CONFIG};
    use rust_split_steno::engine::RawStenoEngine;
    use rust_split_steno::error::SinkError;
    use rust_split_steno::firmware::{Boot, FirmwareCells, FirmwareError};
    use rust_split_steno::hal::{GpioLines, LinkUart, StripLeds, UartLog, UsbHid};
    use rust_split_steno::heartbeat;
    use rust_split_steno::link::InterBoardLink;
    use rust_split_steno::log_drain::LogDrain;
    use rust_split_steno::sys;
    use rust_split_steno::workers::scan::KeyMatrix;

    static FIRMWARE_CONFIG: FirmwareConfig = CONFIG;

    static CELLS: FirmwareCells<KeyMatrix<GpioLines>, RawStenoEngine, LinkUart, StripLeds> =
        FirmwareCells::new();

    enum BootError {
        Firmware(FirmwareError),
        Esp(EspError),
        Usb(SinkError),
    }

    impl From<FirmwareError> for BootError {
        fn from(e: FirmwareError) -> Self {
            BootError::Firmware(e)
        }
    }

    impl From<EspError> for BootError {
        fn from(e: EspError) -> Self {
            BootError::Esp(e)
        }
    }

    impl From<SinkError> for BootError {
        fn from(e: SinkError) -> Self {
            BootError::Usb(e)
        }
    }

    impl fmt::Display for BootError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                BootError::Firmware(e) => write!(f, "boot: {}", e),
                BootError::Esp(e) => write!(f, "boot: esp error {}", e.code()),
                BootError::Usb(e) => write!(f, "boot: usb {}", e),
            }
        }
    }

    fn run() -> Result<core::convert::Infallible, BootError> {
        let cfg = &FIRMWARE_CONFIG;
        let board = &cfg.board;

        let prims = Boot::new(cfg)?.init_primitives(&CELLS)?;

        let p = Peripherals::take()?;
        let usb = UsbHid::init()?;
        let link = match &board.link {
            Some(link) => InterBoardLink::present(LinkUart::new(p.uart1, link)?, CELLS.diag()),
            None => InterBoardLink::absent(CELLS.diag()),
        };
        let devices = prims.init_devices(link, usb);

        let matrix = KeyMatrix::new(GpioLines::new(board)?);
        let strip = StripLeds::new(p.rmt.channel0, board.led_pin)?;
        let log = LogDrain::new(UartLog::new(p.uart2, board.log_tx_pin, board.log_baud_rate)?);
        let engine = RawStenoEngine::new(board.side, board.cols);

        let running = devices.spawn_workers(matrix, engine, strip, log, heartbeat::liveness)?;
        running.idle()
    }

    #[no_mangle]
    fn main() {
        // Initialize ESP-IDF
        esp_idf_sys::link_patches();

        if let Err(e) = run() {
            sys::halt(&e);
        }
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    use rust_split_steno::config::{FirmwareConfig, CONFIG};
    use rust_split_steno::engine::RawStenoEngine;
    use rust_split_steno::firmware::{Boot, FirmwareCells};
    use rust_split_steno::gate;
    use rust_split_steno::heartbeat::{self, Heartbeat};
    use rust_split_steno::link::InterBoardLink;
    use rust_split_steno::log_drain::LogDrain;
    use rust_split_steno::mock::{
        Completion, MockHid, MockUart, RecordingStrip, ScriptedMatrix, StdoutSink,
    };
    use rust_split_steno::sys;

    static FIRMWARE_CONFIG: FirmwareConfig = CONFIG;
    static CELLS: FirmwareCells<ScriptedMatrix, RawStenoEngine, MockUart, RecordingStrip> =
        FirmwareCells::new();

    println!("{}", env!("VERSION_STRING"));

    let result = (|| {
        let prims = Boot::new(&FIRMWARE_CONFIG)?.init_primitives(&CELLS)?;

        let uart = MockUart::new(64).with_rx(&[0xff, 0x00, 0x55]);
        let hid = MockHid::new(Completion::Immediate);
        let link = InterBoardLink::present(uart, CELLS.diag());
        let devices = prims.init_devices(link, hid.clone());

        let matrix = ScriptedMatrix::new();
        let strip = RecordingStrip::new();
        let engine = RawStenoEngine::new(FIRMWARE_CONFIG.board.side, FIRMWARE_CONFIG.board.cols);
        let mut running = devices.spawn_workers(
            matrix.clone(),
            engine,
            strip.clone(),
            LogDrain::new(StdoutSink),
            heartbeat::liveness,
        )?;

        // Host plugs in; wait for the steno worker to become primary.
        sys::simulate_isr(|| gate::on_host_status(true));
        sys::sleep_ms(250);

        // S, T, K, P: "STKP".
        matrix.chord(&[(2, 2), (1, 4), (2, 0), (1, 3)]);
        for _ in 0..40 {
            running.service();
        }

        println!("sent {} reports", hid.sent().len());
        println!("led frames {}", strip.frames().len());
        println!("heartbeats {}", Heartbeat::fired());
        println!("{}", running.diag().snapshot());
        Ok::<(), rust_split_steno::firmware::FirmwareError>(())
    })();

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
