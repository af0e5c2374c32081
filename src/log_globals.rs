//! Global log stream instances.

use crate::logging::LogStream;

/// Time-critical stream: scan thread and interrupt callbacks.
pub static RT_LOG_STREAM: LogStream = LogStream::new();

/// Best-effort stream: steno worker, LED worker, startup and idle path.
pub static BG_LOG_STREAM: LogStream = LogStream::new();
