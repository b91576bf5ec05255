//! Tracking server
//!
//! Accepts client nodes, records their values per host name and drives the
//! serial line. The first payload of every connection is the peer's host
//! name; every payload, including that one, is answered with `ok`.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};

use crate::constants::{ACK, MAX_MESSAGE_LEN, POLL_INTERVAL_MS};
use crate::error::NetworkError;
use crate::network::log::ResultLog;
use crate::network::serial::SerialLine;
use crate::protocol::{Decoded, ProtocolCodec, Signal};

/// Shared between the poll loop and the local send path
#[derive(Debug)]
struct ServerState {
    log: ResultLog,
    serial: SerialLine,
    peers: usize,
}

impl ServerState {
    /// Log a wire value for `host` and pass it on to the serial line
    fn handle(&mut self, codec: &ProtocolCodec, host: &str, value: u64) -> Result<(), NetworkError> {
        let decoded = codec.decode(value);
        self.log.record(host, decoded);
        if matches!(decoded, Decoded::Error(_)) && !codec.send_errors() {
            return Ok(());
        }
        self.serial.write(value)
    }
}

#[derive(Debug)]
pub struct Server {
    hostname: String,
    codec: ProtocolCodec,
    local_addr: SocketAddr,
    listener: Option<TcpListener>,
    state: Arc<Mutex<ServerState>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    result_path: Option<PathBuf>,
}

impl Server {
    /// Bind the listening socket. Nothing is accepted until [`start`](Self::start).
    pub fn bind(
        addr: SocketAddr,
        hostname: impl Into<String>,
        codec: ProtocolCodec,
        serial: SerialLine,
    ) -> Result<Self, NetworkError> {
        let listener = listen(addr).map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
        tracing::info!("Server listening on {}", local_addr);

        Ok(Self {
            hostname: hostname.into(),
            codec,
            local_addr,
            listener: Some(listener),
            state: Arc::new(Mutex::new(ServerState {
                log: ResultLog::new(),
                serial,
                peers: 0,
            })),
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
            result_path: None,
        })
    }

    /// Persist the result log to `path` on stop
    pub fn with_result_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.result_path = Some(path.into());
        self
    }

    /// Start the poll loop on its own thread
    pub fn start(&mut self) -> Result<(), NetworkError> {
        let Some(listener) = self.listener.take() else {
            return Ok(());
        };
        self.running.store(true, Ordering::SeqCst);

        let poller = Poller {
            listener,
            peers: Vec::new(),
            codec: self.codec,
            state: self.state.clone(),
            running: self.running.clone(),
        };
        let handle = thread::Builder::new()
            .name("server".into())
            .spawn(move || poller.run())
            .map_err(|e| NetworkError::BindFailed(format!("failed to spawn server thread: {}", e)))?;
        self.thread = Some(handle);
        Ok(())
    }

    /// Stop the poll loop, close all connections and persist the result log
    pub fn stop(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };
        tracing::info!("Stopping server");
        self.running.store(false, Ordering::SeqCst);
        if handle.join().is_err() {
            tracing::error!("Server thread panicked");
        }
        if let Some(path) = &self.result_path {
            if let Err(e) = self.state.lock().log.persist(path) {
                tracing::error!("Failed to save results to {}: {}", path.display(), e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn codec(&self) -> &ProtocolCodec {
        &self.codec
    }

    /// Number of open client connections
    pub fn peer_count(&self) -> usize {
        self.state.lock().peers
    }

    /// Copy of the result log so far
    pub fn log_snapshot(&self) -> ResultLog {
        self.state.lock().log.clone()
    }

    /// Record a locally detected value under the server's own host name and
    /// write it to the serial line. Returns `false` when the value was
    /// suppressed.
    pub fn send(&mut self, value: f64) -> Result<bool, NetworkError> {
        let Some(encoded) = self.codec.encode(value) else {
            return Ok(false);
        };
        self.state.lock().handle(&self.codec, &self.hostname, encoded.value)?;
        Ok(true)
    }

    pub fn send_signal(&mut self, signal: Signal) -> Result<bool, NetworkError> {
        let Some(encoded) = self.codec.encode_signal(signal) else {
            return Ok(false);
        };
        self.state.lock().handle(&self.codec, &self.hostname, encoded.value)?;
        Ok(true)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn listen(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(8)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// One accepted connection
struct Peer {
    stream: TcpStream,
    addr: SocketAddr,
    host: Option<String>,
}

enum PeerStatus {
    Idle,
    Active,
    Closed,
}

struct Poller {
    listener: TcpListener,
    peers: Vec<Peer>,
    codec: ProtocolCodec,
    state: Arc<Mutex<ServerState>>,
    running: Arc<AtomicBool>,
}

impl Poller {
    fn run(mut self) {
        tracing::debug!("Server poll loop running");
        let mut buf = [0u8; MAX_MESSAGE_LEN];
        while self.running.load(Ordering::SeqCst) {
            let mut active = self.accept();

            let mut i = 0;
            while i < self.peers.len() {
                match self.poll_peer(i, &mut buf) {
                    PeerStatus::Idle => i += 1,
                    PeerStatus::Active => {
                        active = true;
                        i += 1;
                    }
                    PeerStatus::Closed => {
                        let peer = self.peers.swap_remove(i);
                        tracing::info!(
                            "Connection from {} ({}) closed",
                            peer.addr,
                            peer.host.as_deref().unwrap_or("unidentified")
                        );
                        self.state.lock().peers = self.peers.len();
                    }
                }
            }

            if !active {
                thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
            }
        }
        tracing::debug!("Server poll loop exiting, closing {} connection(s)", self.peers.len());
        self.state.lock().peers = 0;
    }

    fn accept(&mut self) -> bool {
        match self.listener.accept() {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nonblocking(true) {
                    tracing::warn!("Dropping connection from {}: {}", addr, e);
                    return true;
                }
                let _ = stream.set_nodelay(true);
                tracing::info!("Connection from {}", addr);
                self.peers.push(Peer {
                    stream,
                    addr,
                    host: None,
                });
                self.state.lock().peers = self.peers.len();
                true
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => false,
            Err(e) => {
                tracing::warn!("Accept failed: {}", e);
                false
            }
        }
    }

    fn poll_peer(&mut self, index: usize, buf: &mut [u8]) -> PeerStatus {
        let peer = &mut self.peers[index];
        let n = match peer.stream.read(buf) {
            Ok(0) => return PeerStatus::Closed,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return PeerStatus::Idle,
            Err(e) if e.kind() == ErrorKind::Interrupted => return PeerStatus::Active,
            Err(e) => {
                tracing::debug!("Read from {} failed: {}", peer.addr, e);
                return PeerStatus::Closed;
            }
        };
        let payload = String::from_utf8_lossy(&buf[..n]);
        let payload = payload.trim();

        if let Some(host) = &peer.host {
            match payload.parse::<u64>() {
                Ok(value) => {
                    if let Err(e) = self.state.lock().handle(&self.codec, host, value) {
                        tracing::warn!("Value {} from '{}' not forwarded: {}", value, host, e);
                    }
                }
                Err(_) => tracing::warn!("Invalid payload {:?} from '{}'", payload, host),
            }
        } else {
            tracing::info!("{} identified as host '{}'", peer.addr, payload);
            peer.host = Some(payload.to_string());
        }

        if let Err(e) = peer.stream.write_all(ACK) {
            tracing::debug!("Acknowledge to {} failed: {}", peer.addr, e);
            return PeerStatus::Closed;
        }
        PeerStatus::Active
    }
}
