//! TCP IPC client for connecting a satellite to the host.
//!
//! Establishes a TCP connection to the host's IPC server, waits for the
//! host's ready event and then exchanges one request/response pair at a time.
//!
//! # Thread Safety
//!
//! The client uses a tokio `Mutex` to serialize access to the TCP stream,
//! allowing safe concurrent use from multiple async tasks.
//!
//! # Cancellation
//!
//! Each exchange runs in its own task, so a caller that stops waiting (a
//! timeout, a `select!`) never leaves half an exchange on the stream. The
//! mutations of an abandoned exchange are carried by the next response,
//! ahead of its own, so the satellite still replays them in host order.

use super::frame::{read_frame, read_message, write_message};
use crate::config::IpcConfig;
use crate::protocol::{HostEvent, Mutation, ServiceRequest, ServiceResponse};
use crate::transport::Transport;
use crate::{BridgeError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    /// Mutations from exchanges whose caller went away.
    orphaned: Vec<Mutation>,
}

/// IPC client connected to a host's server.
#[derive(Debug)]
pub struct IpcClient {
    conn: Arc<Mutex<Connection>>,
    addr: SocketAddr,
}

impl IpcClient {
    /// Connect to the host and wait until it reports ready.
    ///
    /// Uses the connect and ready timeouts from `IpcConfig`.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let mut stream = tokio::time::timeout(IpcConfig::CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| BridgeError::HostLost { addr })?
            .map_err(|_| BridgeError::HostLost { addr })?;

        let event: HostEvent =
            tokio::time::timeout(IpcConfig::READY_TIMEOUT, read_message(&mut stream))
                .await
                .map_err(|_| BridgeError::HostLost { addr })??
                .ok_or(BridgeError::HostLost { addr })?;

        match event {
            HostEvent::Ready => debug!("IPC client connected to {}, host ready", addr),
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(Connection {
                stream,
                orphaned: Vec::new(),
            })),
            addr,
        })
    }

    /// Get the address of the connected host.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Write one request and read its response.
    async fn exchange(
        stream: &mut TcpStream,
        addr: SocketAddr,
        request: &ServiceRequest,
    ) -> Result<ServiceResponse> {
        let host_lost = || BridgeError::HostLost { addr };
        let (mut reader, mut writer) = stream.split();

        // Send request
        write_message(&mut writer, request)
            .await
            .map_err(|_| host_lost())?;

        // Read response
        let response_bytes = read_frame(&mut reader)
            .await
            .map_err(|_| host_lost())?
            .ok_or_else(host_lost)?;

        let response: ServiceResponse =
            serde_json::from_slice(&response_bytes).map_err(|e| BridgeError::Json {
                message: format!("Failed to parse IPC response: {}", e),
                source: Some(e),
            })?;

        if response.id != request.id {
            warn!(expected = %request.id, actual = %response.id, "Response id mismatch");
            return Err(BridgeError::CorrelationMismatch {
                expected: request.id.clone(),
                actual: response.id,
            });
        }

        Ok(response)
    }
}

#[async_trait::async_trait]
impl Transport for IpcClient {
    async fn request(&self, request: ServiceRequest) -> Result<ServiceResponse> {
        let conn = self.conn.clone();
        let addr = self.addr;
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut guard = conn.lock().await;
            let Connection { stream, orphaned } = &mut *guard;

            let result = Self::exchange(stream, addr, &request).await.map(|mut response| {
                if !orphaned.is_empty() {
                    let mut mutations = std::mem::take(orphaned);
                    mutations.append(&mut response.mutations);
                    response.mutations = mutations;
                }
                response
            });

            if let Err(Ok(abandoned)) = tx.send(result) {
                warn!(
                    id = %request.id,
                    mutations = abandoned.mutations.len(),
                    "Caller stopped waiting; keeping mutations for the next response"
                );
                *orphaned = abandoned.mutations;
            }
        });

        rx.await.map_err(|_| BridgeError::HostLost { addr })?
    }
}
