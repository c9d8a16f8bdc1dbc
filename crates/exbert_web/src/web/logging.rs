use std::io;

use tracing_subscriber::fmt::MakeWriter;

/// Line-buffered writer that forwards each formatted event to `console.log`.
pub(super) struct ConsoleWriter {
    buf: Vec<u8>,
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            let line = String::from_utf8_lossy(&self.buf);
            web_sys::console::log_1(&line.trim_end().into());
            self.buf.clear();
        }
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        let _ = io::Write::flush(self);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(super) struct Console;

impl<'a> MakeWriter<'a> for Console {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter { buf: Vec::new() }
    }
}

/// Installs the global subscriber. The wasm target has no clock, so no timestamps.
pub(super) fn init() {
    let _ = tracing_subscriber::fmt()
        .with_writer(Console)
        .without_time()
        .with_ansi(false)
        .try_init();
}
