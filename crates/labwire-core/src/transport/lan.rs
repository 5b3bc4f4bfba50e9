//! LAN (TCP/IP) link
//!
//! Client mode performs a bounded-timeout connect to a listening peer.
//! Server mode binds and listens, then accepts exactly one client in the
//! background; the link becomes connected when the accept completes. An
//! accept that times out is logged and given up, not fatal.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::reader::{LoopStep, ReceiveLoop};
use super::{
    ConnectParams, InterfaceKind, LanMode, LanParams, LanStatus, Transport, TransportError,
    TransportEvent, TransportStatus, RECEIVE_BUFFER_SIZE, RECEIVE_POLL_INTERVAL,
};

/// Upper bound on one lock-holding read slice, so the foreground can
/// interleave sends
const READ_SLICE: Duration = Duration::from_millis(200);

/// How often the background acceptor re-polls the listener
const ACCEPT_POLL: Duration = Duration::from_millis(100);

type SharedStream = Arc<Mutex<Option<TcpStream>>>;

fn lock_stream(stream: &SharedStream) -> MutexGuard<'_, Option<TcpStream>> {
    stream.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock_slot<T>(slot: &Arc<Mutex<Option<T>>>) -> MutexGuard<'_, Option<T>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// State shared between the owning link, its receive loop, and (in server
/// mode) the acceptor thread
#[derive(Clone)]
struct LanShared {
    stream: SharedStream,
    connected: Arc<AtomicBool>,
    events: Sender<TransportEvent>,
    peer: Arc<Mutex<Option<String>>>,
}

impl LanShared {
    fn new(events: Sender<TransportEvent>) -> Self {
        Self {
            stream: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            events,
            peer: Arc::new(Mutex::new(None)),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Adopt an established stream (client connect or server accept)
    fn attach(&self, stream: TcpStream, peer: String) {
        *lock_stream(&self.stream) = Some(stream);
        *lock_slot(&self.peer) = Some(peer.clone());
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Connected(peer));
    }

    /// Tear down after an I/O failure: error event, stream closed,
    /// `Disconnected` emitted once
    fn mark_lost(&self, error: TransportError) {
        warn!(%error, "lan link lost");
        let _ = self.events.send(TransportEvent::Error(error));
        if let Some(stream) = lock_stream(&self.stream).take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(TransportEvent::Disconnected);
        }
    }

    fn send(&self, data: &[u8], timeout: Duration) -> bool {
        let mut guard = lock_stream(&self.stream);
        let Some(stream) = guard.as_mut() else {
            debug!("lan send refused: not connected");
            return false;
        };
        let result = stream
            .set_write_timeout(Some(timeout))
            .and_then(|()| stream.write_all(data))
            .and_then(|()| stream.flush());
        drop(guard);

        match result {
            Ok(()) => {
                debug!(bytes = data.len(), "lan sent");
                true
            }
            Err(e) => {
                self.mark_lost(TransportError::SendFailed(e.to_string()));
                false
            }
        }
    }

    /// One bounded receive attempt; distinguishes "no data yet" (`None`,
    /// silent) from "stream ended" (`None` after error + disconnect events)
    fn receive(&self, timeout: Duration) -> Option<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let slice = READ_SLICE
                .min(deadline - now)
                .max(Duration::from_millis(1));

            let mut guard = lock_stream(&self.stream);
            let Some(stream) = guard.as_mut() else {
                return None;
            };
            if let Err(e) = stream.set_read_timeout(Some(slice)) {
                drop(guard);
                self.mark_lost(TransportError::Socket(e.to_string()));
                return None;
            }
            let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
            match stream.read(&mut buf) {
                Ok(0) => {
                    drop(guard);
                    debug!("lan connection closed by remote");
                    self.mark_lost(TransportError::PeerClosed);
                    return None;
                }
                Ok(n) => {
                    buf.truncate(n);
                    debug!(bytes = n, "lan received");
                    return Some(buf);
                }
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    drop(guard);
                    self.mark_lost(TransportError::Socket(e.to_string()));
                    return None;
                }
            }
        }
    }
}

/// Background accept thread for server mode
struct Acceptor {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Acceptor {
    fn spawn(listener: TcpListener, shared: LanShared, timeout: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            let deadline = Instant::now() + timeout;
            debug!("waiting for client connection");
            loop {
                if flag.load(Ordering::SeqCst) {
                    return;
                }
                match listener.accept() {
                    Ok((stream, addr)) => {
                        if stream.set_nonblocking(false).is_err() {
                            warn!("accepted stream could not be made blocking");
                        }
                        info!(peer = %addr, "lan client connected");
                        shared.attach(stream, addr.to_string());
                        return;
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        if Instant::now() >= deadline {
                            warn!("no client connected within accept timeout");
                            return;
                        }
                        std::thread::sleep(ACCEPT_POLL);
                    }
                    Err(e) => {
                        let _ = shared
                            .events
                            .send(TransportEvent::Error(TransportError::Socket(e.to_string())));
                        return;
                    }
                }
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Acceptor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// TCP/IP link, client or listening server
pub struct LanLink {
    shared: LanShared,
    params: LanParams,
    bound_port: Option<u16>,
    reader: Option<ReceiveLoop>,
    acceptor: Option<Acceptor>,
}

impl LanLink {
    /// Create a link that reports events on `events`
    pub fn new(events: Sender<TransportEvent>) -> Self {
        Self {
            shared: LanShared::new(events),
            params: LanParams::default(),
            bound_port: None,
            reader: None,
            acceptor: None,
        }
    }

    fn stop_acceptor(&mut self) {
        if let Some(mut acceptor) = self.acceptor.take() {
            acceptor.stop();
        }
    }

    fn connect_client(&mut self) -> Result<(), TransportError> {
        let target = format!("{}:{}", self.params.host, self.params.port);
        let addr = (self.params.host.as_str(), self.params.port)
            .to_socket_addrs()
            .map_err(|e| TransportError::Socket(e.to_string()))?
            .next()
            .ok_or_else(|| TransportError::Socket(format!("cannot resolve {target}")))?;

        debug!(%target, "connecting");
        let stream = TcpStream::connect_timeout(&addr, self.params.timeout).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                TransportError::ConnectTimeout(target.clone())
            } else {
                TransportError::Socket(e.to_string())
            }
        })?;

        info!(%target, "lan connected");
        self.shared.attach(stream, addr.to_string());
        Ok(())
    }

    fn connect_server(&mut self) -> Result<(), TransportError> {
        let listener = TcpListener::bind((self.params.host.as_str(), self.params.port))
            .map_err(|e| TransportError::Socket(e.to_string()))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| TransportError::Socket(e.to_string()))?;
        let local = listener
            .local_addr()
            .map_err(|e| TransportError::Socket(e.to_string()))?;

        self.bound_port = Some(local.port());
        info!(addr = %local, "lan server listening");
        self.acceptor = Some(Acceptor::spawn(
            listener,
            self.shared.clone(),
            self.params.timeout,
        ));
        Ok(())
    }
}

impl Transport for LanLink {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::Lan
    }

    fn connect(&mut self, params: &ConnectParams) -> bool {
        let ConnectParams::Lan(lan_params) = params else {
            let _ = self
                .shared
                .events
                .send(TransportEvent::Error(TransportError::ParamMismatch {
                    transport: "lan",
                    given: params.label(),
                }));
            return false;
        };

        // A listener from a previous attempt must not keep accepting
        self.stop_acceptor();
        if self.is_connected() {
            self.disconnect();
        }

        self.params = lan_params.clone();
        self.bound_port = None;

        let result = match self.params.mode {
            LanMode::Client => self.connect_client(),
            LanMode::Server => self.connect_server(),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "lan connect failed");
                let _ = self.shared.events.send(TransportEvent::Error(e));
                false
            }
        }
    }

    fn disconnect(&mut self) -> bool {
        self.stop_acceptor();
        self.stop_receiving();
        if let Some(stream) = lock_stream(&self.shared.stream).take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        lock_slot(&self.shared.peer).take();
        if self.shared.connected.swap(false, Ordering::SeqCst) {
            info!(
                host = %self.params.host,
                port = self.params.port,
                "lan disconnected"
            );
            let _ = self.shared.events.send(TransportEvent::Disconnected);
        }
        true
    }

    fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    fn send(&mut self, data: &[u8]) -> bool {
        self.shared.send(data, self.params.timeout)
    }

    fn receive(&mut self, timeout: Duration) -> Option<Vec<u8>> {
        self.shared.receive(timeout)
    }

    fn start_receiving(&mut self) {
        if self.reader.is_some() {
            return;
        }
        let shared = self.shared.clone();
        let mut was_connected = false;
        self.reader = Some(ReceiveLoop::spawn(move || {
            if shared.is_connected() {
                was_connected = true;
                if let Some(data) = shared.receive(RECEIVE_POLL_INTERVAL) {
                    if shared.events.send(TransportEvent::Data(data)).is_err() {
                        return LoopStep::Stop;
                    }
                }
                LoopStep::Continue
            } else if was_connected {
                LoopStep::Stop
            } else {
                // Server mode: keep waiting for the acceptor to attach a client
                std::thread::sleep(RECEIVE_POLL_INTERVAL);
                LoopStep::Continue
            }
        }));
    }

    fn stop_receiving(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.stop();
        }
    }

    fn status(&self) -> TransportStatus {
        TransportStatus::Lan(LanStatus {
            connected: self.is_connected(),
            host: self.params.host.clone(),
            port: self.params.port,
            bound_port: self.bound_port,
            peer: lock_slot(&self.shared.peer).clone(),
            mode: self.params.mode,
            timeout_secs: self.params.timeout.as_secs_f64(),
        })
    }
}

impl Drop for LanLink {
    fn drop(&mut self) {
        self.disconnect();
    }
}
