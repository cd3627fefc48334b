//! Listener implementation for the command server socket.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use scanlink_config::ListenEndpoint;

use super::{ConnectionHandler, LISTENER_TARGET, ListenerError};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Read timeout on accepted sockets; bounds how long a connection thread
/// takes to notice shutdown while its client is idle.
pub(crate) const CONNECTION_POLL_INTERVAL: Duration = Duration::from_millis(250);

type ConnectionThreads = Arc<Mutex<Vec<JoinHandle<()>>>>;

/// Listener bound to the command server endpoint.
#[derive(Debug)]
pub(crate) struct SocketListener {
    endpoint: ListenEndpoint,
    listener: TcpListener,
}

impl SocketListener {
    pub(crate) fn bind(endpoint: &ListenEndpoint) -> Result<Self, ListenerError> {
        let listener = bind_tcp(endpoint.host(), endpoint.port())?;
        Ok(Self {
            endpoint: endpoint.clone(),
            listener,
        })
    }

    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Starts accepting connections until `shutdown` is raised.
    ///
    /// Each connection is served on its own thread. The same flag is handed
    /// to every connection so in-flight sessions wind down with the listener.
    pub(crate) fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<ListenerHandle, ListenerError> {
        self.listener
            .set_nonblocking(true)
            .map_err(|source| ListenerError::NonBlocking { source })?;
        let connections = ConnectionThreads::default();
        let handle = thread::Builder::new()
            .name("scanlink-accept".to_owned())
            .spawn({
                let shutdown = Arc::clone(&shutdown);
                let connections = Arc::clone(&connections);
                move || run_accept_loop(&self, &shutdown, &handler, &connections)
            })
            .map_err(|source| ListenerError::Spawn { source })?;
        Ok(ListenerHandle {
            shutdown,
            handle: Some(handle),
            connections,
        })
    }
}

/// Handle to the background accept thread and the connections it spawned.
#[derive(Debug)]
pub(crate) struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    connections: ConnectionThreads,
}

impl ListenerHandle {
    /// Requests shutdown. Safe to call repeatedly.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept thread, then for every connection thread.
    pub(crate) fn join(mut self) -> Result<(), ListenerError> {
        let accept = match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ListenerError::ThreadPanic),
            None => Ok(()),
        };

        let pending = std::mem::take(
            &mut *self
                .connections
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let panicked = pending
            .into_iter()
            .map(JoinHandle::join)
            .filter(Result::is_err)
            .count();

        accept?;
        if panicked > 0 {
            return Err(ListenerError::ConnectionPanic { count: panicked });
        }
        Ok(())
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_accept_loop(
    listener: &SocketListener,
    shutdown: &Arc<AtomicBool>,
    handler: &Arc<dyn ConnectionHandler>,
    connections: &ConnectionThreads,
) {
    info!(
        target: LISTENER_TARGET,
        endpoint = %listener.endpoint,
        "command server listening"
    );
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.load(Ordering::SeqCst) {
        match accept_connection(listener) {
            Ok(Some((stream, peer))) => {
                last_error = None;
                spawn_connection(stream, peer, shutdown, handler, connections);
            }
            Ok(None) => {
                thread::sleep(ACCEPT_BACKOFF);
            }
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: LISTENER_TARGET,
                        error = %error,
                        "socket accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    info!(target: LISTENER_TARGET, "command server stopped accepting");
}

fn spawn_connection(
    stream: TcpStream,
    peer: SocketAddr,
    shutdown: &Arc<AtomicBool>,
    handler: &Arc<dyn ConnectionHandler>,
    connections: &ConnectionThreads,
) {
    let handler = Arc::clone(handler);
    let shutdown = Arc::clone(shutdown);
    let spawned = thread::Builder::new()
        .name(format!("scanlink-conn-{peer}"))
        .spawn(move || handler.handle(stream, &shutdown));
    let mut threads = connections.lock().unwrap_or_else(PoisonError::into_inner);
    reap_finished(&mut threads);
    match spawned {
        Ok(thread) => threads.push(thread),
        Err(error) => warn!(
            target: LISTENER_TARGET,
            peer = %peer,
            error = %error,
            "failed to spawn connection thread"
        ),
    }
}

/// Joins connection threads that have already returned.
fn reap_finished(threads: &mut Vec<JoinHandle<()>>) {
    let (finished, running): (Vec<_>, Vec<_>) =
        threads.drain(..).partition(JoinHandle::is_finished);
    *threads = running;
    for thread in finished {
        if thread.join().is_err() {
            warn!(target: LISTENER_TARGET, "connection thread panicked");
        }
    }
}

fn accept_connection(listener: &SocketListener) -> io::Result<Option<(TcpStream, SocketAddr)>> {
    match listener.listener.accept() {
        Ok((stream, peer)) => {
            stream.set_nonblocking(false)?;
            stream.set_read_timeout(Some(CONNECTION_POLL_INTERVAL))?;
            debug!(target: LISTENER_TARGET, peer = %peer, "connection accepted");
            Ok(Some((stream, peer)))
        }
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    let addr = addrs
        .next()
        .ok_or_else(|| ListenerError::ResolveEmpty {
            host: host.to_owned(),
            port,
        })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}

#[cfg(test)]
mod tests {
    use std::net::TcpStream;

    use rstest::rstest;

    use super::*;
    use crate::transport::{CountingHandler, wait_for};

    fn loopback() -> ListenEndpoint {
        ListenEndpoint::new("127.0.0.1", 0)
    }

    #[test]
    fn tcp_listener_accepts_connections() {
        let listener = SocketListener::bind(&loopback()).expect("bind tcp listener");
        let addr = listener
            .local_addr()
            .expect("listener should report local address");
        let (count, handler) = CountingHandler::new();
        let handle = listener
            .start(handler, Arc::new(AtomicBool::new(false)))
            .expect("start listener");

        TcpStream::connect(addr).expect("connect first client");
        TcpStream::connect(addr).expect("connect second client");

        assert!(
            wait_for(|| count.load(Ordering::SeqCst) >= 2),
            "expected two connections"
        );
        handle.shutdown();
        handle.join().expect("join listener");
    }

    #[test]
    fn bind_rejects_port_in_use() {
        let reserved = TcpListener::bind(("127.0.0.1", 0)).expect("reserve port");
        let port = reserved.local_addr().expect("reserved address").port();

        let error = SocketListener::bind(&ListenEndpoint::new("127.0.0.1", port))
            .expect_err("bind should fail");

        assert!(matches!(error, ListenerError::BindTcp { .. }));
    }

    #[rstest]
    #[case("host.invalid")]
    #[case("no such host")]
    fn bind_reports_unresolvable_hosts(#[case] host: &str) {
        let error = SocketListener::bind(&ListenEndpoint::new(host, 8002))
            .expect_err("resolution should fail");

        assert!(matches!(
            error,
            ListenerError::Resolve { .. } | ListenerError::ResolveEmpty { .. }
        ));
    }

    #[test]
    fn join_waits_for_connection_threads() {
        let listener = SocketListener::bind(&loopback()).expect("bind tcp listener");
        let addr = listener.local_addr().expect("local address");
        let (count, handler) = CountingHandler::holding_until_shutdown();
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = listener
            .start(handler, Arc::clone(&shutdown))
            .expect("start listener");

        let _client = TcpStream::connect(addr).expect("connect client");
        assert!(wait_for(|| count.load(Ordering::SeqCst) >= 1));

        handle.shutdown();
        handle.join().expect("join listener");

        assert!(shutdown.load(Ordering::SeqCst));
        assert_eq!(count.load(Ordering::SeqCst), 2, "handler should have returned");
    }

    #[test]
    fn shutdown_is_idempotent() {
        let listener = SocketListener::bind(&loopback()).expect("bind tcp listener");
        let (_count, handler) = CountingHandler::new();
        let handle = listener
            .start(handler, Arc::new(AtomicBool::new(false)))
            .expect("start listener");

        handle.shutdown();
        handle.shutdown();
        handle.join().expect("join listener");
    }
}
