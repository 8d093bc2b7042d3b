//! TCP IPC server for the host process.
//!
//! Listens on `127.0.0.1` (OS-assigned port by default), greets every
//! connection with a ready event and answers request frames through a
//! [`RequestHandler`].
//!
//! # Thread Safety
//!
//! Each connection is handled in its own spawned task. Ordering across
//! connections is the handler's responsibility; [`crate::HostDispatcher`]
//! serializes all requests behind a single lock.

use super::frame::{read_frame, write_frame, write_message};
use crate::config::IpcConfig;
use crate::protocol::{HostEvent, ResponseError, ServiceRequest, ServiceResponse};
use crate::{BridgeError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

/// Answers requests arriving over the channel.
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, request: ServiceRequest) -> ServiceResponse;
}

/// Handle to a running IPC server. Dropping shuts down the server.
pub struct IpcServerHandle {
    pub addr: SocketAddr,
    pub port: u16,
    max_satellites: usize,
    slots: Arc<Semaphore>,
    shutdown_tx: watch::Sender<bool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl IpcServerHandle {
    /// Get the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of satellites currently connected.
    pub fn satellites(&self) -> usize {
        self.max_satellites - self.slots.available_permits()
    }

    /// Stop accepting satellites and close every open connection.
    pub fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for IpcServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// IPC server that listens for satellite connections.
pub struct IpcServer;

impl IpcServer {
    /// Start the server on a random local port.
    pub async fn start<H: RequestHandler>(handler: Arc<H>) -> Result<IpcServerHandle> {
        let addr: SocketAddr = format!("{}:0", IpcConfig::BIND_HOST)
            .parse()
            .map_err(|e| BridgeError::Config {
                message: format!("Invalid bind address: {}", e),
            })?;
        Self::start_on(handler, addr).await
    }

    /// Start the server on a specific address.
    pub async fn start_on<H: RequestHandler>(
        handler: Arc<H>,
        addr: SocketAddr,
    ) -> Result<IpcServerHandle> {
        Self::start_bounded(handler, addr, IpcConfig::MAX_CONNECTIONS).await
    }

    /// Start the server, admitting at most `max_satellites` at once.
    ///
    /// A satellite over the limit is closed before the ready event, so its
    /// connect fails with `HostLost` instead of hanging.
    pub async fn start_bounded<H: RequestHandler>(
        handler: Arc<H>,
        addr: SocketAddr,
        max_satellites: usize,
    ) -> Result<IpcServerHandle> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        info!(addr = %addr, max_satellites, "IPC server listening");

        let slots = Arc::new(Semaphore::new(max_satellites));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task_handle = tokio::spawn(Self::accept_satellites(
            listener,
            handler,
            slots.clone(),
            shutdown_rx,
        ));

        Ok(IpcServerHandle {
            addr,
            port: addr.port(),
            max_satellites,
            slots,
            shutdown_tx,
            task_handle: Some(task_handle),
        })
    }

    async fn accept_satellites<H: RequestHandler>(
        listener: TcpListener,
        handler: Arc<H>,
        slots: Arc<Semaphore>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("IPC server shutting down");
                    return;
                }
                accepted = listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!("IPC accept error: {}", e);
                        continue;
                    }
                },
            };

            // The permit lives as long as the connection task
            let Ok(permit) = slots.clone().try_acquire_owned() else {
                warn!(peer = %peer, "Rejecting satellite: connection limit reached");
                continue;
            };

            let handler = handler.clone();
            let mut shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                let _permit = permit;
                debug!(peer = %peer, "Satellite connected");
                match Self::handle_connection(stream, &*handler, &mut shutdown).await {
                    Ok(()) => debug!(peer = %peer, "Satellite disconnected"),
                    Err(e) => debug!(peer = %peer, "Satellite connection ended: {}", e),
                }
            });
        }
    }

    async fn handle_connection<H: RequestHandler>(
        mut stream: TcpStream,
        handler: &H,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.split();

        write_message(&mut writer, &HostEvent::Ready).await?;

        loop {
            let frame = tokio::select! {
                result = read_frame(&mut reader) => {
                    match result? {
                        Some(f) => f,
                        None => return Ok(()), // Clean disconnect
                    }
                }
                _ = shutdown_rx.changed() => {
                    return Ok(());
                }
            };

            let response = Self::process_frame(&frame, handler).await;
            let response_bytes = serde_json::to_vec(&response)?;
            write_frame(&mut writer, &response_bytes).await?;
        }
    }

    async fn process_frame<H: RequestHandler>(frame: &[u8], handler: &H) -> ServiceResponse {
        let value: serde_json::Value = match serde_json::from_slice(frame) {
            Ok(v) => v,
            Err(e) => return Self::reject(String::new(), -32700, format!("Parse error: {}", e)),
        };

        // Keep the id for the error reply even when the rest is malformed
        let id = value
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        match serde_json::from_value::<ServiceRequest>(value) {
            Ok(request) => handler.handle(request).await,
            Err(e) => Self::reject(id, -32600, format!("Invalid Request: {}", e)),
        }
    }

    fn reject(id: String, code: i32, message: String) -> ServiceResponse {
        warn!(id = %id, "{}", message);
        ServiceResponse::failure(
            id,
            Vec::new(),
            ResponseError {
                code,
                message,
                data: None,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::frame::read_message;
    use serde_json::json;

    struct EchoHandler;

    #[async_trait::async_trait]
    impl RequestHandler for EchoHandler {
        async fn handle(&self, request: ServiceRequest) -> ServiceResponse {
            match request.method_name.as_deref() {
                Some("fail") => ServiceResponse::failure(
                    request.id,
                    Vec::new(),
                    BridgeError::Other("test failure".into()).to_response_error(),
                ),
                _ => ServiceResponse::success(request.id, Vec::new(), json!(request.args)),
            }
        }
    }

    async fn connect(handle: &IpcServerHandle) -> TcpStream {
        let mut stream = TcpStream::connect(handle.addr()).await.unwrap();
        let ready: Option<HostEvent> = read_message(&mut stream).await.unwrap();
        assert_eq!(ready, Some(HostEvent::Ready));
        stream
    }

    #[tokio::test]
    async fn test_server_start_and_shutdown() {
        let mut handle = IpcServer::start(Arc::new(EchoHandler)).await.unwrap();

        assert!(handle.port > 0);
        assert_eq!(handle.addr.ip(), std::net::Ipv4Addr::LOCALHOST);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_server_echo() {
        let mut handle = IpcServer::start(Arc::new(EchoHandler)).await.unwrap();
        let mut stream = connect(&handle).await;

        let request = ServiceRequest::call_method("Echo", "echo", vec![json!("hi")]);
        write_message(&mut stream, &request).await.unwrap();

        let response: ServiceResponse = read_message(&mut stream).await.unwrap().unwrap();
        assert_eq!(response.id, request.id);
        assert_eq!(response.payload, json!(["hi"]));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_server_error_response() {
        let mut handle = IpcServer::start(Arc::new(EchoHandler)).await.unwrap();
        let mut stream = connect(&handle).await;

        let request = ServiceRequest::call_method("Echo", "fail", vec![]);
        write_message(&mut stream, &request).await.unwrap();

        let response: ServiceResponse = read_message(&mut stream).await.unwrap().unwrap();
        let err = response.error.unwrap();
        assert_eq!(err.code, -32603);
        assert!(err.message.contains("test failure"));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_server_invalid_json_returns_parse_error() {
        let mut handle = IpcServer::start(Arc::new(EchoHandler)).await.unwrap();
        let mut stream = connect(&handle).await;

        write_frame(&mut stream, b"not valid json").await.unwrap();

        let response: ServiceResponse = read_message(&mut stream).await.unwrap().unwrap();
        assert_eq!(response.error.unwrap().code, -32700);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_server_malformed_request_keeps_id() {
        let mut handle = IpcServer::start(Arc::new(EchoHandler)).await.unwrap();
        let mut stream = connect(&handle).await;

        write_message(&mut stream, &json!({"id": "abc", "action": "explode"}))
            .await
            .unwrap();

        let response: ServiceResponse = read_message(&mut stream).await.unwrap().unwrap();
        assert_eq!(response.id, "abc");
        assert_eq!(response.error.unwrap().code, -32600);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_server_rejects_satellites_over_the_limit() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut handle = IpcServer::start_bounded(Arc::new(EchoHandler), addr, 1)
            .await
            .unwrap();

        let first = connect(&handle).await;
        assert_eq!(handle.satellites(), 1);

        // Closed without a ready event
        let mut second = TcpStream::connect(handle.addr()).await.unwrap();
        let greeting: Option<HostEvent> = read_message(&mut second).await.unwrap_or(None);
        assert_eq!(greeting, None);

        // The slot frees up once the first satellite leaves
        drop(first);
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        while handle.satellites() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(handle.satellites(), 0);
        let _third = connect(&handle).await;

        handle.shutdown();
    }
}
