//! JSON line framing for responses sent to clients.

use std::io::{self, Write};

use serde::Serialize;

/// Writes one JSON document per line and flushes after each.
pub(crate) struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    pub(crate) const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialises `message` as a single line.
    pub(crate) fn write_message<T: Serialize>(&mut self, message: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}
