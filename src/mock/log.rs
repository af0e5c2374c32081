use std::io::Write;

use crate::log_drain::LogSink;

/// Log lines to stdout.
#[derive(Default)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn write_line(&mut self, line: &[u8]) {
        let _ = std::io::stdout().write_all(line);
    }
}
