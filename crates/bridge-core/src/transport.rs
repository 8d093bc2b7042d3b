//! Request/response channel abstraction used by satellites.
//!
//! A [`Transport`] carries one [`ServiceRequest`] to the host and returns the
//! matching [`ServiceResponse`]. Errors the host raised while executing a call
//! are part of the response; only channel failures come back as `Err`.

use crate::ipc::RequestHandler;
use crate::protocol::{ServiceRequest, ServiceResponse};
use crate::{BridgeError, Result};
use std::sync::Arc;

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and wait for its response.
    async fn request(&self, request: ServiceRequest) -> Result<ServiceResponse>;
}

/// In-process transport that hands requests straight to a host handler.
///
/// Requests and responses are still encoded to JSON and back, so values that
/// would not survive the socket do not survive here either.
pub struct LocalTransport<H> {
    handler: Arc<H>,
}

impl<H: RequestHandler> LocalTransport<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }
}

impl<H> Clone for LocalTransport<H> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

#[async_trait::async_trait]
impl<H: RequestHandler> Transport for LocalTransport<H> {
    async fn request(&self, request: ServiceRequest) -> Result<ServiceResponse> {
        let request: ServiceRequest = serde_json::from_slice(&serde_json::to_vec(&request)?)?;
        let expected = request.id.clone();

        let response = self.handler.handle(request).await;
        let response: ServiceResponse = serde_json::from_slice(&serde_json::to_vec(&response)?)?;

        if response.id != expected {
            return Err(BridgeError::CorrelationMismatch {
                expected,
                actual: response.id,
            });
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn request(&self, request: ServiceRequest) -> Result<ServiceResponse> {
        (**self).request(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait::async_trait]
    impl RequestHandler for Echo {
        async fn handle(&self, request: ServiceRequest) -> ServiceResponse {
            ServiceResponse::success(request.id, Vec::new(), json!(request.args))
        }
    }

    struct WrongId;

    #[async_trait::async_trait]
    impl RequestHandler for WrongId {
        async fn handle(&self, _request: ServiceRequest) -> ServiceResponse {
            ServiceResponse::success("someone-else", Vec::new(), json!(null))
        }
    }

    #[tokio::test]
    async fn test_local_transport_round_trip() {
        let transport = LocalTransport::new(Arc::new(Echo));
        let request = ServiceRequest::call_method("Echo", "say", vec![json!(1), json!("two")]);
        let id = request.id.clone();

        let response = transport.request(request).await.unwrap();
        assert_eq!(response.id, id);
        assert_eq!(response.payload, json!([1, "two"]));
    }

    #[tokio::test]
    async fn test_local_transport_checks_correlation() {
        let transport = LocalTransport::new(Arc::new(WrongId));
        let err = transport
            .request(ServiceRequest::init_service("Echo"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::CorrelationMismatch { .. }));
    }
}
