//! Background reader that turns the measurement stream into rotations.

use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serialport::SerialPort;
use tracing::{debug, error, info};

use super::RPLIDAR_TARGET;
use super::protocol::{NodeStream, RotationAssembler};
use crate::driver::SensorError;
use crate::sample::RawSample;

const READ_CHUNK: usize = 1024;

#[derive(Debug, Default)]
struct Slot {
    rotation: Option<Vec<RawSample>>,
    failure: Option<String>,
}

/// Latest complete rotation published by the reader.
#[derive(Debug, Default)]
pub(crate) struct ScanCache {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl ScanCache {
    pub(crate) fn publish(&self, rotation: Vec<RawSample>) {
        self.slot.lock().rotation = Some(rotation);
        self.ready.notify_all();
    }

    pub(crate) fn fail(&self, message: String) {
        self.slot.lock().failure = Some(message);
        self.ready.notify_all();
    }

    /// Takes the newest rotation, waiting up to `timeout` for one to arrive.
    pub(crate) fn take(&self, timeout: Duration) -> Result<Vec<RawSample>, SensorError> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        loop {
            if let Some(rotation) = slot.rotation.take() {
                return Ok(rotation);
            }
            if let Some(message) = &slot.failure {
                return Err(SensorError::reader_stopped(message.clone()));
            }
            if self.ready.wait_until(&mut slot, deadline).timed_out() && slot.rotation.is_none() {
                return Err(SensorError::Timeout {
                    request: "scan data",
                    timeout,
                });
            }
        }
    }
}

/// Owns the reader thread for one scan session.
#[derive(Debug)]
pub(crate) struct ScanReader {
    stop: Arc<AtomicBool>,
    cache: Arc<ScanCache>,
    thread: Option<JoinHandle<()>>,
}

impl ScanReader {
    pub(crate) fn spawn(port: Box<dyn SerialPort>) -> Result<Self, SensorError> {
        let stop = Arc::new(AtomicBool::new(false));
        let cache = Arc::new(ScanCache::default());
        let thread = thread::Builder::new()
            .name("rplidar-reader".to_owned())
            .spawn({
                let stop = Arc::clone(&stop);
                let cache = Arc::clone(&cache);
                move || read_loop(port, &stop, &cache)
            })?;
        Ok(Self {
            stop,
            cache,
            thread: Some(thread),
        })
    }

    pub(crate) fn next_rotation(&self, timeout: Duration) -> Result<Vec<RawSample>, SensorError> {
        self.cache.take(timeout)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    pub(crate) fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!(target: RPLIDAR_TARGET, "reader thread panicked");
        }
    }
}

impl Drop for ScanReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop(mut port: Box<dyn SerialPort>, stop: &AtomicBool, cache: &ScanCache) {
    let mut stream = NodeStream::new();
    let mut assembler = RotationAssembler::new();
    let mut buffer = [0_u8; READ_CHUNK];
    let mut rotations = 0_u64;

    info!(target: RPLIDAR_TARGET, "reader started");
    while !stop.load(Ordering::SeqCst) {
        let read = match port.read(&mut buffer) {
            Ok(read) => read,
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(error) => {
                error!(target: RPLIDAR_TARGET, error = %error, "serial read failed");
                cache.fail(error.to_string());
                return;
            }
        };
        let Some(bytes) = buffer.get(..read) else {
            continue;
        };
        for sample in stream.push(bytes) {
            if let Some(rotation) = assembler.push(sample) {
                rotations += 1;
                debug!(
                    target: RPLIDAR_TARGET,
                    rotation = rotations,
                    samples = rotation.len(),
                    "rotation published"
                );
                cache.publish(rotation);
            }
        }
    }
    info!(
        target: RPLIDAR_TARGET,
        rotations,
        discarded_bytes = stream.discarded(),
        "reader stopped"
    );
}
