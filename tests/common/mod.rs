//! Shared utilities for the integration tests.

#![allow(dead_code)]

use std::io::ErrorKind;
use std::time::Duration;

use fault_harness::lifecycle::BoundAddrs;
use fault_harness::{Harness, HarnessConfig, ShutdownCoordinator};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// How a raw connection ended, with everything read before that.
#[derive(Debug)]
pub enum Ending {
    Closed(Vec<u8>),
    Reset(Vec<u8>),
}

impl Ending {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Ending::Closed(bytes) | Ending::Reset(bytes) => bytes,
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(self.bytes()).into_owned()
    }

    pub fn is_reset(&self) -> bool {
        matches!(self, Ending::Reset(_))
    }
}

/// A harness running on ephemeral loopback ports.
pub struct RunningHarness {
    pub addrs: BoundAddrs,
    pub coordinator: ShutdownCoordinator,
    pub handle: JoinHandle<()>,
}

impl RunningHarness {
    pub fn debug_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addrs.debug, path)
    }
}

/// Default config with every listener on 127.0.0.1:0 and short drain timings.
pub fn test_config() -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.tcp_echo.bind_address = "127.0.0.1:0".into();
    config.udp_echo.bind_address = "127.0.0.1:0".into();
    config.control.bind_address = "127.0.0.1:0".into();
    config.debug.bind_address = "127.0.0.1:0".into();
    config.shutdown.handler_timeout_secs = 5;
    config.shutdown.drain_window_secs = 1;
    config.observability.metrics_enabled = false;
    config
}

pub async fn start_harness(config: HarnessConfig) -> RunningHarness {
    let coordinator = ShutdownCoordinator::new();
    let harness = Harness::bind(&config, coordinator.clone()).unwrap();
    let addrs = harness.addrs();
    let handle = tokio::spawn(harness.run());

    RunningHarness {
        addrs,
        coordinator,
        handle,
    }
}

/// Client that never reuses connections, so each request gets its own socket.
pub fn fresh_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Read until FIN or RST.
pub async fn read_until_end(stream: &mut TcpStream) -> Ending {
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => return Ending::Closed(received),
            Ok(n) => received.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::ConnectionReset => return Ending::Reset(received),
            Err(e) => panic!("unexpected read error: {e}"),
        }
    }
}

/// Send one raw HTTP/1.1 request on a new connection and report how it ended.
pub async fn raw_request(addr: std::net::SocketAddr, method: &str, target: &str) -> Ending {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let head = format!("{method} {target} HTTP/1.1\r\nHost: {addr}\r\n\r\n");
    stream.write_all(head.as_bytes()).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), read_until_end(&mut stream))
        .await
        .expect("connection did not end")
}

/// Read one response with a Content-Length body from a keep-alive connection.
pub async fn read_one_response(stream: &mut TcpStream) -> String {
    let read = async {
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed mid-response");
            received.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&received).into_owned();
            if let Some(split) = text.find("\r\n\r\n") {
                let length = text[..split]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if received.len() >= split + 4 + length {
                    return text;
                }
            }
        }
    };

    tokio::time::timeout(Duration::from_secs(5), read).await.unwrap()
}
