//! Common test utilities and fixtures
//!
//! Mock Pulsoid stream server and a local OSC receiver standing in for VRChat.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use rosc::{decoder, OscMessage, OscPacket};
use tempfile::TempDir;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Mock Pulsoid real-time endpoint
///
/// Every accepted connection receives the configured readings as JSON text
/// frames and is then held open.
pub struct MockPulsoid {
    addr: SocketAddr,
    shutdown_tx: Option<mpsc::Sender<()>>,
    auth_headers: Arc<RwLock<Vec<String>>>,
    connections: Arc<AtomicUsize>,
}

impl MockPulsoid {
    pub async fn start(readings: Vec<u32>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let auth_headers = Arc::new(RwLock::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let headers = auth_headers.clone();
        let count = connections.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        let Ok((stream, _)) = accept_result else { continue };
                        count.fetch_add(1, Ordering::SeqCst);
                        let headers = headers.clone();
                        let readings = readings.clone();
                        tokio::spawn(async move {
                            let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                                if let Some(value) = req.headers().get("authorization") {
                                    headers.write().push(value.to_str().unwrap_or_default().to_string());
                                }
                                Ok(resp)
                            };
                            let Ok(mut ws) = accept_hdr_async(stream, callback).await else { return };
                            for bpm in readings {
                                let frame = format!(
                                    r#"{{"measured_at":1700000000000,"data":{{"heart_rate":{}}}}}"#,
                                    bpm
                                );
                                if ws.send(WsMessage::Text(frame)).await.is_err() {
                                    return;
                                }
                            }
                            while let Some(Ok(_)) = ws.next().await {}
                        });
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            auth_headers,
            connections,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn auth_headers(&self) -> Vec<String> {
        self.auth_headers.read().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for MockPulsoid {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
    }
}

/// Endpoint that accepts TCP and hangs up before the WebSocket handshake
pub async fn refusing_endpoint() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            seen.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });
    (url, count)
}

/// UDP socket decoding OSC messages
pub struct OscReceiver {
    socket: UdpSocket,
}

impl OscReceiver {
    pub async fn bind() -> Self {
        Self {
            socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
        }
    }

    pub fn port(&self) -> u16 {
        self.socket.local_addr().unwrap().port()
    }

    /// Next message, or `None` after `wait` without traffic
    pub async fn recv_timeout(&self, wait: Duration) -> Option<OscMessage> {
        let mut buf = [0u8; 1536];
        let len = tokio::time::timeout(wait, self.socket.recv(&mut buf))
            .await
            .ok()?
            .ok()?;
        match decoder::decode_udp(&buf[..len]).ok()?.1 {
            OscPacket::Message(msg) => Some(msg),
            OscPacket::Bundle(_) => None,
        }
    }

    pub async fn recv(&self) -> OscMessage {
        self.recv_timeout(Duration::from_secs(20))
            .await
            .expect("no OSC message received")
    }
}

/// Empty config file plus a private token location, so runs never pick up
/// the developer's own configuration
pub struct IsolatedConfig {
    dir: TempDir,
}

impl IsolatedConfig {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let token_file = dir.path().join("token.txt");
        std::fs::write(
            dir.path().join("config.toml"),
            format!("[auth]\ntoken_file = {:?}\n", token_file.display().to_string()),
        )
        .unwrap();
        Self { dir }
    }

    pub fn config_path(&self) -> String {
        self.dir.path().join("config.toml").display().to_string()
    }

    pub fn token_path(&self) -> PathBuf {
        self.dir.path().join("token.txt")
    }
}
