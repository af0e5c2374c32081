//! Log drain.
//!
//! Moves entries from the two log streams to a byte sink. Runs only on the
//! main/idle path, where a slow sink (UART at 115200 baud) may block
//! without delaying any worker.
//!
//! ```text
//! RT_LOG_STREAM ──┐
//!                 ├──▶ format_log_entry ──▶ LogSink (UART / stdout)
//! BG_LOG_STREAM ──┘
//! ```
//!
//! The RT stream is drained first. Drop counts are reported at most every
//! [`DROPPED_REPORT_INTERVAL_US`].

use crate::logging::{format_to_buffer, LogEntry, LogStream};
use crate::{BG_LOG_STREAM, RT_LOG_STREAM};

/// Formatted line buffer size.
pub const LINE_BUF_SIZE: usize = 160;

pub const DROPPED_REPORT_INTERVAL_US: u64 = 10_000_000;

/// Destination for formatted log lines.
pub trait LogSink {
    fn write_line(&mut self, line: &[u8]);
}

/// Format: `[timestamp_us] LEVEL: message\n`
pub fn format_log_entry(entry: &LogEntry, buf: &mut [u8]) -> usize {
    format_to_buffer(
        buf,
        format_args!(
            "[{:10}] {}: {}\n",
            entry.timestamp_us,
            entry.level.as_str(),
            entry.text()
        ),
    )
}

pub struct LogDrain<K: LogSink> {
    sink: K,
    rt: &'static LogStream,
    bg: &'static LogStream,
    last_dropped_report_us: u64,
}

impl<K: LogSink> LogDrain<K> {
    /// Drain the global streams into `sink`.
    pub fn new(sink: K) -> Self {
        Self::with_streams(sink, &RT_LOG_STREAM, &BG_LOG_STREAM)
    }

    pub fn with_streams(sink: K, rt: &'static LogStream, bg: &'static LogStream) -> Self {
        Self {
            sink,
            rt,
            bg,
            last_dropped_report_us: 0,
        }
    }

    /// Write out everything pending. Returns the number of entries written.
    pub fn drain(&mut self, now_us: u64) -> usize {
        let mut buf = [0u8; LINE_BUF_SIZE];
        let mut written = 0;

        for stream in [self.rt, self.bg] {
            while let Some(entry) = stream.drain() {
                let len = format_log_entry(&entry, &mut buf);
                self.sink.write_line(&buf[..len]);
                written += 1;
            }
        }

        if now_us.saturating_sub(self.last_dropped_report_us) >= DROPPED_REPORT_INTERVAL_US {
            self.last_dropped_report_us = now_us;
            let rt_dropped = self.rt.take_dropped();
            let bg_dropped = self.bg.take_dropped();
            if rt_dropped > 0 || bg_dropped > 0 {
                let len = format_to_buffer(
                    &mut buf,
                    format_args!("[WARN] Dropped: RT={}, BG={}\n", rt_dropped, bg_dropped),
                );
                self.sink.write_line(&buf[..len]);
            }
        }

        written
    }

    pub fn has_pending(&self) -> bool {
        self.rt.has_entries() || self.bg.has_entries()
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;
    use std::boxed::Box;
    use std::string::String;
    use std::vec::Vec;

    #[derive(Default)]
    struct Lines(Vec<String>);

    impl LogSink for Lines {
        fn write_line(&mut self, line: &[u8]) {
            self.0.push(String::from_utf8_lossy(line).into_owned());
        }
    }

    fn streams() -> (&'static LogStream, &'static LogStream) {
        (Box::leak(Box::new(LogStream::new())), Box::leak(Box::new(LogStream::new())))
    }

    #[test]
    fn test_format_log_entry() {
        let mut entry = LogEntry::default();
        entry.timestamp_us = 1234567;
        entry.level = LogLevel::Info;
        entry.msg[..11].copy_from_slice(b"Hello world");
        entry.len = 11;

        let mut buf = [0u8; LINE_BUF_SIZE];
        let len = format_log_entry(&entry, &mut buf);
        let formatted = core::str::from_utf8(&buf[..len]).unwrap();
        assert_eq!(formatted, "[   1234567] INFO: Hello world\n");
    }

    #[test]
    fn test_rt_stream_first() {
        let (rt, bg) = streams();
        bg.push(1, LogLevel::Info, b"background");
        rt.push(2, LogLevel::Error, b"realtime");

        let mut drain = LogDrain::with_streams(Lines::default(), rt, bg);
        assert!(drain.has_pending());
        assert_eq!(drain.drain(0), 2);
        assert!(drain.sink().0[0].contains("realtime"));
        assert!(drain.sink().0[1].contains("background"));
        assert!(!drain.has_pending());
    }

    #[test]
    fn test_reports_drops_periodically() {
        let (rt, bg) = streams();
        for _ in 0..LOG_CAPACITY + 2 {
            bg.push(0, LogLevel::Debug, b"spam");
        }

        let mut drain = LogDrain::with_streams(Lines::default(), rt, bg);
        drain.drain(1);
        assert_eq!(drain.sink().0.len(), LOG_CAPACITY);

        drain.drain(DROPPED_REPORT_INTERVAL_US);
        let last = drain.sink().0.last().unwrap();
        assert_eq!(last, "[WARN] Dropped: RT=0, BG=2\n");
        assert_eq!(bg.dropped(), 0);
    }

    const LOG_CAPACITY: usize = crate::logging::LOG_BUFFER_SIZE;
}
