//! Network subsystem: server/client transport and the serial line

pub mod client;
pub mod log;
pub mod serial;
pub mod server;

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

pub use client::Client;
pub use log::{HostSeries, ResultFile, ResultLog};
pub use serial::{CaptureBuffer, SerialLine};
pub use server::Server;

use crate::config::NetworkConfig;
use crate::error::{NetworkError, Result};
use crate::pipeline::dispatcher::ResultSink;
use crate::protocol::{ProtocolCodec, Signal};

/// The role a node plays, chosen once from configuration
#[derive(Debug)]
pub enum Endpoint {
    Server(Server),
    Client(Client),
}

impl Endpoint {
    /// Send a value; `false` when it was suppressed or not acknowledged
    pub fn send(&mut self, value: f64) -> std::result::Result<bool, NetworkError> {
        match self {
            Endpoint::Server(server) => server.send(value),
            Endpoint::Client(client) => client.send(value),
        }
    }

    pub fn send_signal(&mut self, signal: Signal) -> std::result::Result<bool, NetworkError> {
        match self {
            Endpoint::Server(server) => server.send_signal(signal),
            Endpoint::Client(client) => client.send_signal(signal),
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, Endpoint::Server(_))
    }

    /// Shut the endpoint down; a server persists its result log
    pub fn close(self) {
        match self {
            Endpoint::Server(mut server) => server.stop(),
            Endpoint::Client(client) => client.close(),
        }
    }
}

impl ResultSink for Endpoint {
    fn deliver(&mut self, frame_number: u64, signal: Signal) -> Result<()> {
        let delivered = self.send_signal(signal)?;
        if !delivered {
            tracing::trace!("Frame {} result {:?} not delivered", frame_number, signal);
        }
        Ok(())
    }
}

fn resolve(conf: &NetworkConfig) -> std::result::Result<SocketAddr, NetworkError> {
    let target = format!("{}:{}", conf.server_ip, conf.server_port);
    target
        .to_socket_addrs()
        .map_err(|e| NetworkError::ConnectionFailed(format!("{}: {}", target, e)))?
        .next()
        .ok_or_else(|| NetworkError::ConnectionFailed(format!("{}: no address", target)))
}

/// Build the endpoint for this node: a started server owning the serial
/// line, or a client connected and identified as `hostname`.
pub fn init_network(conf: &NetworkConfig, hostname: &str) -> Result<Endpoint> {
    let codec = ProtocolCodec::from_config(conf)?;
    let addr = resolve(conf)?;

    if conf.is_server {
        let serial = SerialLine::open(&conf.serial, conf.message_bytes)?;
        let mut server = Server::bind(addr, hostname, codec, serial)?.with_result_path(&conf.result_path);
        server.start()?;
        Ok(Endpoint::Server(server))
    } else {
        tracing::info!("Connecting to {}", addr);
        let client = Client::connect(addr, hostname, codec, Duration::from_millis(conf.ack_timeout_ms))?;
        Ok(Endpoint::Client(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SerialConfig;
    use crate::error::{Error, ProtocolError};

    fn server_config(result_path: std::path::PathBuf) -> NetworkConfig {
        NetworkConfig {
            is_server: true,
            server_ip: "127.0.0.1".into(),
            server_port: 0,
            result_path,
            serial: SerialConfig {
                active: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_init_server_and_client() {
        let tmp = tempfile::tempdir().unwrap();
        let result_path = tmp.path().join("result.json");
        let mut server = init_network(&server_config(result_path.clone()), "pi-server").unwrap();
        assert!(server.is_server());
        let Endpoint::Server(inner) = &server else {
            unreachable!()
        };
        let port = inner.local_addr().port();

        let client_conf = NetworkConfig {
            server_port: port,
            ..Default::default()
        };
        let mut client = init_network(&client_conf, "pi-left").unwrap();
        assert!(!client.is_server());
        assert!(client.send(90.0).unwrap());
        client.deliver(1, Signal::NotFound).unwrap();
        assert!(server.send(180.0).unwrap());

        client.close();
        server.close();
        let file = ResultFile::load(&result_path).unwrap();
        assert_eq!(file.hosts["pi-left"].angle, vec![90, 90]);
        assert_eq!(file.hosts["pi-left"].error, vec![0, 9]);
        assert_eq!(file.hosts["pi-server"].angle, vec![180]);
    }

    #[test]
    fn test_init_rejects_bad_codec() {
        let conf = NetworkConfig {
            precision: 65530,
            ..server_config("unused.json".into())
        };
        assert!(matches!(
            init_network(&conf, "pi-server"),
            Err(Error::Protocol(ProtocolError::InsufficientMessageBytes { .. }))
        ));
    }
}
