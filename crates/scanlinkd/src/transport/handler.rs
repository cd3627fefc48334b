//! Connection handling abstractions for the command server.

use std::io::{self, Read};
use std::mem;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};

/// Longest accepted command line, terminator excluded.
pub(crate) const MAX_LINE_BYTES: usize = 4096;

const READ_CHUNK: usize = 1024;

/// Handles accepted connections.
pub(crate) trait ConnectionHandler: Send + Sync + 'static {
    /// Serves one connection until the peer leaves or `shutdown` is raised.
    /// Implementations should avoid panicking.
    fn handle(&self, stream: TcpStream, shutdown: &AtomicBool);
}

/// Splits a byte stream into newline-terminated command lines.
///
/// Bytes after a newline are kept for the next call, so pipelined commands
/// are served in order.
#[derive(Debug, Default)]
pub(crate) struct LineReader {
    buffer: Vec<u8>,
}

impl LineReader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the next line without its `\n` or trailing `\r`.
    ///
    /// Returns `Ok(None)` once the peer closes the stream or `shutdown` is
    /// raised; read timeouts only serve to re-check the flag. An unterminated
    /// final line is returned as-is.
    pub(crate) fn next_line<R: Read>(
        &mut self,
        stream: &mut R,
        shutdown: &AtomicBool,
    ) -> io::Result<Option<String>> {
        let mut chunk = [0_u8; READ_CHUNK];
        loop {
            if let Some(line) = self.take_line()? {
                return Ok(Some(line));
            }
            enforce_line_limit(self.buffer.len())?;
            if shutdown.load(Ordering::SeqCst) {
                return Ok(None);
            }
            match stream.read(&mut chunk) {
                Ok(0) => return Ok(self.take_remainder()),
                Ok(read) => self
                    .buffer
                    .extend_from_slice(chunk.get(..read).unwrap_or_default()),
                Err(error) if is_idle(&error) => {}
                Err(error) => return Err(error),
            }
        }
    }

    fn take_line(&mut self) -> io::Result<Option<String>> {
        let Some(position) = self.buffer.iter().position(|byte| *byte == b'\n') else {
            return Ok(None);
        };
        let rest = self.buffer.split_off(position + 1);
        let mut line = mem::replace(&mut self.buffer, rest);
        line.pop();
        enforce_line_limit(line.len())?;
        Ok(Some(decode(line)))
    }

    fn take_remainder(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(decode(mem::take(&mut self.buffer)))
    }
}

fn decode(mut line: Vec<u8>) -> String {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line)
        .unwrap_or_else(|error| String::from_utf8_lossy(error.as_bytes()).into_owned())
}

fn is_idle(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

fn enforce_line_limit(size: usize) -> io::Result<()> {
    if size > MAX_LINE_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "command line exceeds maximum size",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use rstest::rstest;

    use super::*;

    /// Replays scripted read results.
    struct ScriptedStream {
        reads: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedStream {
        fn new(reads: impl IntoIterator<Item = io::Result<Vec<u8>>>) -> Self {
            Self {
                reads: reads.into_iter().collect(),
            }
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(error)) => Err(error),
                None => Ok(0),
            }
        }
    }

    fn lines(stream: &mut ScriptedStream) -> Vec<String> {
        let mut reader = LineReader::new();
        let shutdown = AtomicBool::new(false);
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line(stream, &shutdown).expect("read line") {
            lines.push(line);
        }
        lines
    }

    #[rstest]
    #[case::single(vec![b"STOP\n".to_vec()], vec!["STOP"])]
    #[case::crlf(vec![b"GET_INFO\r\n".to_vec()], vec!["GET_INFO"])]
    #[case::pipelined(vec![b"START_SCAN\nGET_SAMPLE\n".to_vec()], vec!["START_SCAN", "GET_SAMPLE"])]
    #[case::split(vec![b"GET_".to_vec(), b"HEALTH\n".to_vec()], vec!["GET_HEALTH"])]
    #[case::unterminated(vec![b"STOP\nGET_INFO".to_vec()], vec!["STOP", "GET_INFO"])]
    #[case::blank(vec![b"\n".to_vec()], vec![""])]
    fn splits_command_lines(#[case] reads: Vec<Vec<u8>>, #[case] expected: Vec<&str>) {
        let mut stream = ScriptedStream::new(reads.into_iter().map(Ok));
        assert_eq!(lines(&mut stream), expected);
    }

    #[test]
    fn read_timeouts_are_not_errors() {
        let mut stream = ScriptedStream::new([
            Err(io::Error::from(io::ErrorKind::WouldBlock)),
            Err(io::Error::from(io::ErrorKind::TimedOut)),
            Ok(b"STOP\n".to_vec()),
        ]);
        assert_eq!(lines(&mut stream), vec!["STOP"]);
    }

    #[test]
    fn shutdown_ends_an_idle_read() {
        let mut stream = ScriptedStream::new([
            Err(io::Error::from(io::ErrorKind::WouldBlock)),
            Ok(b"STOP\n".to_vec()),
        ]);
        let shutdown = AtomicBool::new(true);
        let line = LineReader::new()
            .next_line(&mut stream, &shutdown)
            .expect("read line");
        assert_eq!(line, None);
    }

    #[test]
    fn overlong_lines_are_rejected() {
        let chunks = (0..=MAX_LINE_BYTES / READ_CHUNK).map(|_| Ok(vec![b'A'; READ_CHUNK]));
        let mut stream = ScriptedStream::new(chunks);
        let error = LineReader::new()
            .next_line(&mut stream, &AtomicBool::new(false))
            .expect_err("line should be rejected");
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn connection_reset_is_reported() {
        let mut stream =
            ScriptedStream::new([Err(io::Error::from(io::ErrorKind::ConnectionReset))]);
        let error = LineReader::new()
            .next_line(&mut stream, &AtomicBool::new(false))
            .expect_err("reset should surface");
        assert_eq!(error.kind(), io::ErrorKind::ConnectionReset);
    }
}
