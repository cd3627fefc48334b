//! Line-oriented TCP client for talking to a test daemon.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use serde_json::Value;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) struct TestClient {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

impl TestClient {
    /// Connects and consumes nothing; the greeting is read by the caller.
    pub(crate) fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect to daemon");
        stream
            .set_read_timeout(Some(CLIENT_TIMEOUT))
            .expect("set client read timeout");
        let reader = BufReader::new(stream.try_clone().expect("clone client stream"));
        Self {
            writer: stream,
            reader,
        }
    }

    /// Connects and asserts the greeting reports a ready sensor.
    pub(crate) fn connect_ready(addr: SocketAddr) -> Self {
        let mut client = Self::connect(addr);
        let greeting = client.read_envelope();
        assert_eq!(greeting["command"], "CONNECT");
        assert_eq!(greeting["response"]["status"], "OK");
        client
    }

    pub(crate) fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).expect("write to daemon");
        self.writer.flush().expect("flush to daemon");
    }

    pub(crate) fn read_envelope(&mut self) -> Value {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).expect("read response line");
        assert!(read > 0, "daemon closed the connection");
        serde_json::from_str(&line).expect("response should be one JSON object")
    }

    /// Sends one command line and returns its response.
    pub(crate) fn command(&mut self, keyword: &str) -> Value {
        self.send_raw(format!("{keyword}\n").as_bytes());
        self.read_envelope()
    }

    /// Returns `true` once the daemon has closed the connection.
    pub(crate) fn is_closed(&mut self) -> bool {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(read) => read == 0,
            Err(error) => error.kind() != std::io::ErrorKind::WouldBlock
                && error.kind() != std::io::ErrorKind::TimedOut,
        }
    }
}
