//! Tracking client
//!
//! Sends its host name on connect, then one decimal value per message and
//! waits for the server's `ok` before the next one.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::constants::{ACK, MAX_MESSAGE_LEN};
use crate::error::NetworkError;
use crate::protocol::{Encoded, ProtocolCodec, Signal};

#[derive(Debug)]
pub struct Client {
    stream: TcpStream,
    server: SocketAddr,
    hostname: String,
    codec: ProtocolCodec,
    sent: u64,
}

impl Client {
    /// Connect to `addr` and identify as `hostname`
    pub fn connect(
        addr: impl ToSocketAddrs,
        hostname: impl Into<String>,
        codec: ProtocolCodec,
        ack_timeout: Duration,
    ) -> Result<Self, NetworkError> {
        let hostname = hostname.into();
        let stream = TcpStream::connect(addr).map_err(|e| match e.kind() {
            ErrorKind::ConnectionRefused => NetworkError::ConnectionFailed(
                "connection refused, is the server running on this ip/port?".to_string(),
            ),
            _ => NetworkError::ConnectionFailed(e.to_string()),
        })?;
        let server = stream
            .peer_addr()
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;
        stream
            .set_nodelay(true)
            .and_then(|_| stream.set_read_timeout(Some(ack_timeout)))
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;
        tracing::info!("Connected to server {}", server);

        let mut client = Self {
            stream,
            server,
            hostname,
            codec,
            sent: 0,
        };
        let payload = client.hostname.clone();
        match client.exchange(&payload) {
            Ok(true) => {}
            Ok(false) => return Err(NetworkError::HandshakeRejected),
            Err(e) => return Err(e),
        }
        tracing::info!("Identified to {} as '{}'", client.server, client.hostname);
        Ok(client)
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn codec(&self) -> &ProtocolCodec {
        &self.codec
    }

    /// Values acknowledged so far
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Encode and send `value`.
    ///
    /// Returns whether the server acknowledged it, `false` when the value was
    /// suppressed or answered with something other than `ok`. A reset
    /// connection or a missing acknowledgement is `ConnectionLost`.
    pub fn send(&mut self, value: f64) -> Result<bool, NetworkError> {
        match self.codec.encode(value) {
            Some(encoded) => self.transmit(encoded),
            None => Ok(false),
        }
    }

    pub fn send_signal(&mut self, signal: Signal) -> Result<bool, NetworkError> {
        match self.codec.encode_signal(signal) {
            Some(encoded) => self.transmit(encoded),
            None => Ok(false),
        }
    }

    fn transmit(&mut self, encoded: Encoded) -> Result<bool, NetworkError> {
        let acked = self.exchange(&encoded.value.to_string())?;
        if acked {
            self.sent += 1;
        }
        Ok(acked)
    }

    fn exchange(&mut self, payload: &str) -> Result<bool, NetworkError> {
        self.stream
            .write_all(payload.as_bytes())
            .map_err(|e| self.transport_error(e))?;

        let mut buf = [0u8; MAX_MESSAGE_LEN];
        match self.stream.read(&mut buf) {
            Ok(0) => Err(NetworkError::ConnectionLost(format!(
                "server {} closed the connection",
                self.server
            ))),
            Ok(n) => Ok(&buf[..n] == ACK),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                // A late `ok` would be taken as the reply to the next value
                tracing::error!("No acknowledgement from {} for {:?}", self.server, payload);
                Err(NetworkError::ConnectionLost(format!(
                    "server {} did not acknowledge {:?} in time",
                    self.server, payload
                )))
            }
            Err(e) => Err(self.transport_error(e)),
        }
    }

    fn transport_error(&self, e: io::Error) -> NetworkError {
        match e.kind() {
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                NetworkError::ConnectionLost(format!("server {}: {}", self.server, e))
            }
            _ => NetworkError::SendFailed(e.to_string()),
        }
    }

    pub fn close(self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        tracing::info!("Disconnected from {} after {} value(s)", self.server, self.sent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::serial::{CaptureBuffer, SerialLine};
    use crate::network::server::Server;
    use std::net::TcpListener;
    use std::thread;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn server(capture: &CaptureBuffer) -> Server {
        let codec = ProtocolCodec::new(360, 2, true).unwrap();
        let serial = SerialLine::with_writer(capture.clone(), 2);
        let mut server = Server::bind("127.0.0.1:0".parse().unwrap(), "pi-server", codec, serial).unwrap();
        server.start().unwrap();
        server
    }

    #[test]
    fn test_send_to_server() {
        let capture = CaptureBuffer::new();
        let server = server(&capture);
        let codec = ProtocolCodec::new(360, 2, true).unwrap();
        let mut client = Client::connect(server.local_addr(), "pi-left", codec, TIMEOUT).unwrap();

        assert!(client.send(-10.0).unwrap());
        assert!(client.send(370.0).unwrap());
        assert!(client.send_signal(Signal::NotFound).unwrap());
        assert_eq!(client.sent(), 3);

        let log = server.log_snapshot();
        let left = log.host("pi-left").unwrap();
        assert_eq!(left.angle, vec![350, 10, 10]);
        assert_eq!(left.error, vec![0, 0, 9]);
        assert_eq!(capture.values(2), vec![350, 10, 65535]);
        client.close();
    }

    #[test]
    fn test_suppressed_errors_are_not_sent() {
        let capture = CaptureBuffer::new();
        let server = server(&capture);
        let codec = ProtocolCodec::new(360, 2, false).unwrap();
        let mut client = Client::connect(server.local_addr(), "pi-left", codec, TIMEOUT).unwrap();

        assert!(!client.send_signal(Signal::NotFound).unwrap());
        assert!(!client.send(65535.0).unwrap());
        assert_eq!(client.sent(), 0);
        assert!(server.log_snapshot().host("pi-left").is_none());
    }

    #[test]
    fn test_connection_refused() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let codec = ProtocolCodec::default();
        assert!(matches!(
            Client::connect(addr, "pi-left", codec, TIMEOUT),
            Err(NetworkError::ConnectionFailed(_))
        ));
    }

    #[test]
    fn test_server_shutdown_is_connection_lost() {
        let capture = CaptureBuffer::new();
        let mut server = server(&capture);
        let codec = ProtocolCodec::default();
        let mut client = Client::connect(server.local_addr(), "pi-left", codec, TIMEOUT).unwrap();
        server.stop();

        let result = client.send(10.0).and_then(|_| client.send(11.0));
        assert!(matches!(result, Err(NetworkError::ConnectionLost(_))));
    }

    #[test]
    fn test_missing_acknowledgement_is_connection_lost() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf).unwrap();
            stream.write_all(ACK).unwrap();
            // swallow the value without answering until the client gave up
            let _ = stream.read(&mut buf).unwrap();
            done_rx.recv().unwrap();
            let _ = stream.write_all(ACK);
        });

        let codec = ProtocolCodec::default();
        let mut client = Client::connect(addr, "pi-left", codec, Duration::from_millis(100)).unwrap();
        let result = client.send(10.0);
        assert!(matches!(result, Err(NetworkError::ConnectionLost(_))));
        assert_eq!(client.sent(), 0);
        done_tx.send(()).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_rejected_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf).unwrap();
            stream.write_all(b"no").unwrap();
        });
        let result = Client::connect(addr, "pi-left", ProtocolCodec::default(), TIMEOUT);
        assert!(matches!(result, Err(NetworkError::HandshakeRejected)));
        handle.join().unwrap();
    }
}
