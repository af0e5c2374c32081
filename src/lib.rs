//! # RustSplitSteno
//!
//! Concurrency core of a split steno keyboard firmware.
//!
//! ## Architecture
//!
//! ```text
//! ScanWorker ──ScanQueue──▶ StenoWorker ──ReportQueue──▶ OutputStage ──OutputGate──▶ USB HID
//!                               │   ▲                                       ▲
//!                               ▼   │                                       │
//!                          InterBoardLink                      completion interrupt
//!                               │
//!                        Shared<RenderState> ──▶ LedWorker (cooperative)
//! ```
//!
//! - Larger payloads cross threads only through [`queue::BoundedQueue`].
//! - Scalars shared with interrupt context go through [`critical`].
//! - The single USB endpoint is arbitrated by [`gate::OutputGate`].
//! - Context misuse halts via [`fault::halt`].
//!
//! The library is `no_std` on the device. On a host the [`sys`] backend is
//! built on `std`, so every primitive and the whole pipeline run under
//! `cargo test`.

#![cfg_attr(all(not(test), target_os = "espidf"), no_std)]

pub mod config;
pub mod critical;
pub mod diag;
pub mod engine;
pub mod error;
pub mod event;
pub mod fault;
pub mod firmware;
pub mod gate;
pub mod heartbeat;
pub mod leds;
pub mod link;
pub mod log_drain;
pub mod log_globals;
pub mod logging;
pub mod queue;
pub mod sys;
pub mod thread;
pub mod workers;

#[cfg(target_os = "espidf")]
pub mod hal;

#[cfg(not(target_os = "espidf"))]
pub mod mock;

pub use config::{FirmwareConfig, CONFIG};
pub use error::{ContextViolation, Full, Timeout};
pub use event::{HidReport, ScanEvent};
pub use fault::{FaultState, FAULT};
pub use log_globals::{BG_LOG_STREAM, RT_LOG_STREAM};
pub use queue::BoundedQueue;
