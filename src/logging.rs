//! RT-safe logging.
//!
//! # Architecture
//!
//! ```text
//! Worker / ISR           LogStream              Idle path
//! ────────────           ─────────              ─────────
//!
//! rt_log!() ──────────▶ [L0][L1][L2] ──────▶ LogSink (UART / stdout)
//! format on stack        bounded ring           blocking ok
//! non-blocking           critical section
//! ```
//!
//! # Rules
//!
//! - Workers and interrupt callbacks never write to a sink directly; they use
//!   the `rt_*!` macros.
//! - Push never blocks. If the ring is full the message is dropped and
//!   counted; the drain reports drop counts.
//! - The ring lock is the raw `critical_section` (re-entrant), not
//!   [`crate::critical`], so a fault can still be logged from inside a
//!   held critical section.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;

/// Maximum message length.
pub const MAX_MSG_LEN: usize = 96;

/// Log buffer size (number of entries).
pub const LOG_BUFFER_SIZE: usize = 64;

/// Log level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    /// Convert to string for output.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

/// A single log entry.
#[derive(Clone, Copy)]
pub struct LogEntry {
    /// Timestamp in microseconds since boot.
    pub timestamp_us: u64,
    pub level: LogLevel,
    /// Message length.
    pub len: u8,
    /// Message bytes (not null-terminated).
    pub msg: [u8; MAX_MSG_LEN],
}

impl LogEntry {
    const EMPTY: LogEntry = LogEntry {
        timestamp_us: 0,
        level: LogLevel::Info,
        len: 0,
        msg: [0; MAX_MSG_LEN],
    };

    /// Message text, lossy on invalid UTF-8 (truncation may split a char).
    pub fn text(&self) -> &str {
        let bytes = &self.msg[..self.len as usize];
        match core::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
        }
    }
}

impl Default for LogEntry {
    fn default() -> Self {
        Self::EMPTY
    }
}

struct Ring<const N: usize> {
    entries: [LogEntry; N],
    head: usize,
    len: usize,
}

/// Bounded log stream, any number of producers, one drain.
pub struct LogStream<const N: usize = LOG_BUFFER_SIZE> {
    ring: Mutex<RefCell<Ring<N>>>,
    dropped: AtomicU32,
}

impl<const N: usize> LogStream<N> {
    /// Create a new empty log stream.
    pub const fn new() -> Self {
        assert!(N > 0, "Log buffer must hold at least one entry");

        Self {
            ring: Mutex::new(RefCell::new(Ring {
                entries: [LogEntry::EMPTY; N],
                head: 0,
                len: 0,
            })),
            dropped: AtomicU32::new(0),
        }
    }

    /// Push a log entry (never blocks).
    ///
    /// Returns `true` if message was queued, `false` if dropped (ring full).
    pub fn push(&self, timestamp_us: u64, level: LogLevel, msg: &[u8]) -> bool {
        let queued = critical_section::with(|cs| {
            let mut ring = self.ring.borrow_ref_mut(cs);
            if ring.len == N {
                return false;
            }
            let idx = (ring.head + ring.len) % N;
            let len = msg.len().min(MAX_MSG_LEN);
            let entry = &mut ring.entries[idx];
            entry.timestamp_us = timestamp_us;
            entry.level = level;
            entry.len = len as u8;
            entry.msg[..len].copy_from_slice(&msg[..len]);
            ring.len += 1;
            true
        });

        if !queued {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queued
    }

    /// Take the oldest entry, `None` if empty.
    pub fn drain(&self) -> Option<LogEntry> {
        critical_section::with(|cs| {
            let mut ring = self.ring.borrow_ref_mut(cs);
            if ring.len == 0 {
                return None;
            }
            let entry = ring.entries[ring.head];
            ring.head = (ring.head + 1) % N;
            ring.len -= 1;
            Some(entry)
        })
    }

    /// Get count of dropped messages.
    #[inline]
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Read and clear the dropped counter (e.g., when reporting).
    #[inline]
    pub fn take_dropped(&self) -> u32 {
        self.dropped.swap(0, Ordering::Relaxed)
    }

    #[inline]
    pub fn has_entries(&self) -> bool {
        self.pending() > 0
    }

    /// Get number of entries waiting to be drained.
    pub fn pending(&self) -> usize {
        critical_section::with(|cs| self.ring.borrow_ref(cs).len)
    }
}

impl<const N: usize> Default for LogStream<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a message into a buffer, truncating at the end.
///
/// Returns the number of bytes written.
#[inline]
pub fn format_to_buffer(buf: &mut [u8], args: core::fmt::Arguments<'_>) -> usize {
    use core::fmt::Write;

    struct BufWriter<'a> {
        buf: &'a mut [u8],
        pos: usize,
    }

    impl<'a> Write for BufWriter<'a> {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            let bytes = s.as_bytes();
            let remaining = self.buf.len() - self.pos;
            let to_write = bytes.len().min(remaining);
            self.buf[self.pos..self.pos + to_write].copy_from_slice(&bytes[..to_write]);
            self.pos += to_write;
            Ok(())
        }
    }

    let mut writer = BufWriter { buf, pos: 0 };
    let _ = core::fmt::write(&mut writer, args);
    writer.pos
}

/// RT-safe log macro.
///
/// # Example
///
/// ```ignore
/// rt_log!(LogLevel::Info, RT_LOG_STREAM, sys::now_us(), "key {} {}", row, col);
/// ```
#[macro_export]
macro_rules! rt_log {
    ($level:expr, $stream:expr, $timestamp:expr, $($arg:tt)*) => {{
        let mut buf = [0u8; $crate::logging::MAX_MSG_LEN];
        let len = $crate::logging::format_to_buffer(&mut buf, format_args!($($arg)*));
        $stream.push($timestamp, $level, &buf[..len]);
    }};
}

/// RT-safe info log.
#[macro_export]
macro_rules! rt_info {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Info, $stream, $timestamp, $($arg)*)
    };
}

/// RT-safe warning log.
#[macro_export]
macro_rules! rt_warn {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Warn, $stream, $timestamp, $($arg)*)
    };
}

/// RT-safe error log.
#[macro_export]
macro_rules! rt_error {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Error, $stream, $timestamp, $($arg)*)
    };
}

/// RT-safe debug log.
#[macro_export]
macro_rules! rt_debug {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Debug, $stream, $timestamp, $($arg)*)
    };
}

/// RT-safe trace log (maximum verbosity).
#[macro_export]
macro_rules! rt_trace {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Trace, $stream, $timestamp, $($arg)*)
    };
}

/// Log stream for the calling context.
///
/// - Interrupt context → RT_LOG_STREAM
/// - Threads → BG_LOG_STREAM
#[inline]
pub fn current_log_stream() -> &'static LogStream {
    if crate::sys::in_isr() {
        &crate::RT_LOG_STREAM
    } else {
        &crate::BG_LOG_STREAM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_stream_basic() {
        let stream = LogStream::<16>::new();

        assert!(stream.push(1000, LogLevel::Info, b"test message"));
        assert!(stream.has_entries());
        assert_eq!(stream.pending(), 1);

        let entry = stream.drain().unwrap();
        assert_eq!(entry.timestamp_us, 1000);
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.text(), "test message");

        assert!(!stream.has_entries());
    }

    #[test]
    fn test_log_stream_full() {
        let stream = LogStream::<4>::new();

        for i in 0..4 {
            assert!(stream.push(i, LogLevel::Info, b"x"));
        }

        // Should drop
        assert!(!stream.push(5, LogLevel::Info, b"5"));
        assert_eq!(stream.dropped(), 1);

        // Drain one, should be able to push again
        assert_eq!(stream.drain().map(|e| e.timestamp_us), Some(0));
        assert!(stream.push(6, LogLevel::Info, b"6"));
        assert_eq!(stream.take_dropped(), 1);
        assert_eq!(stream.dropped(), 0);
    }

    #[test]
    fn test_long_message_truncated() {
        let stream = LogStream::<2>::new();
        let long = [b'a'; MAX_MSG_LEN + 10];
        assert!(stream.push(0, LogLevel::Debug, &long));
        assert_eq!(stream.drain().unwrap().len as usize, MAX_MSG_LEN);
    }

    #[test]
    fn test_format_to_buffer() {
        let mut buf = [0u8; 32];
        let len = format_to_buffer(&mut buf, format_args!("Hello {}", 42));
        assert_eq!(&buf[..len], b"Hello 42");
    }

    #[test]
    fn test_format_to_buffer_truncates() {
        let mut buf = [0u8; 4];
        let len = format_to_buffer(&mut buf, format_args!("{}", 123456));
        assert_eq!(&buf[..len], b"1234");
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_multiple_producers() {
        use std::sync::Arc;
        use std::thread;

        let stream = Arc::new(LogStream::<64>::new());
        let mut handles = vec![];

        for i in 0..4 {
            let stream = Arc::clone(&stream);
            handles.push(thread::spawn(move || {
                for j in 0..10 {
                    let msg = format!("Thread {} msg {}", i, j);
                    stream.push(j, LogLevel::Info, msg.as_bytes());
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let mut count = 0;
        while stream.drain().is_some() {
            count += 1;
        }
        assert_eq!(count, 40, "All messages should be present");
        assert_eq!(stream.dropped(), 0);
    }

    #[test]
    fn test_overload_counts_every_drop() {
        use std::sync::Arc;
        use std::thread;

        let stream = Arc::new(LogStream::<32>::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let stream = Arc::clone(&stream);
                thread::spawn(move || {
                    for j in 0..50u64 {
                        stream.push(i * 100 + j, LogLevel::Info, b"spam");
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let mut count = 0;
        while stream.drain().is_some() {
            count += 1;
        }
        assert_eq!(count, 32);
        assert_eq!(stream.dropped(), 400 - 32);
    }
}
