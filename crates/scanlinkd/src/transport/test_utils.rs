//! Test helpers for the transport module.

use std::net::TcpStream;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

use super::ConnectionHandler;

/// Counts connections; optionally stays in the handler until shutdown.
pub(crate) struct CountingHandler {
    count: Arc<AtomicUsize>,
    hold: bool,
}

impl CountingHandler {
    pub(crate) fn new() -> (Arc<AtomicUsize>, Arc<Self>) {
        Self::build(false)
    }

    /// Counts once on entry and once more after shutdown is observed.
    pub(crate) fn holding_until_shutdown() -> (Arc<AtomicUsize>, Arc<Self>) {
        Self::build(true)
    }

    fn build(hold: bool) -> (Arc<AtomicUsize>, Arc<Self>) {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Self {
            count: Arc::clone(&count),
            hold,
        });
        (count, handler)
    }
}

impl ConnectionHandler for CountingHandler {
    fn handle(&self, _stream: TcpStream, shutdown: &AtomicBool) {
        self.count.fetch_add(1, Ordering::SeqCst);
        if !self.hold {
            return;
        }
        while !shutdown.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(10));
        }
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Polls `condition` for up to two seconds.
pub(crate) fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}
