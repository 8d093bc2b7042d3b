//! Error types for the service bridge.
//!
//! Every failure the bridge can surface is a variant of [`BridgeError`]. Errors
//! raised on the host travel back to the satellite as a response error object
//! (code + message + structured data) and are rebuilt into the same variant
//! there, so call sites can match on them regardless of where they occurred.

use crate::protocol::ResponseError;
use serde_json::json;
use std::net::SocketAddr;
use thiserror::Error;

/// Main error type for the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    // Resolution errors
    #[error("Unknown service: {name}")]
    UnknownService { name: String },

    #[error("Unknown mutator: {name}")]
    UnknownMutator { name: String },

    #[error("Method not found: {service}.{method}")]
    MethodNotFound { service: String, method: String },

    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    // Buffering errors
    #[error("Mutation buffer armed twice; overlapping call handling detected")]
    BufferReentrancy,

    // Replication errors
    #[error("State slice {slice} is out of date: {message}")]
    StaleState { slice: String, message: String },

    // Protocol errors
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Response id mismatch: expected {expected}, got {actual}")]
    CorrelationMismatch { expected: String, actual: String },

    #[error("Host at {addr} is no longer reachable")]
    HostLost { addr: SocketAddr },

    #[error("Remote error {code}: {message}")]
    Remote { code: i32, message: String },

    // IO and serialization errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl BridgeError {
    /// Shorthand for a mutation that targets something the slice does not hold.
    pub fn stale_state(slice: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::StaleState {
            slice: slice.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a missing method on a named target.
    pub fn method_not_found(service: impl Into<String>, method: impl Into<String>) -> Self {
        BridgeError::MethodNotFound {
            service: service.into(),
            method: method.into(),
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Standard codes:
    /// - -32700: Parse error
    /// - -32600: Invalid Request
    /// - -32601: Method not found
    /// - -32602: Invalid params
    /// - -32603: Internal error
    ///
    /// Application codes:
    /// - -32010: Unknown service
    /// - -32011: Unknown mutator
    /// - -32012: Mutation buffer reentrancy
    /// - -32013: Stale state slice
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            BridgeError::Json { .. } => -32700,
            BridgeError::InvalidRequest { .. } | BridgeError::Validation { .. } => -32600,
            BridgeError::MethodNotFound { .. } => -32601,
            BridgeError::InvalidParams { .. } => -32602,
            BridgeError::UnknownService { .. } => -32010,
            BridgeError::UnknownMutator { .. } => -32011,
            BridgeError::BufferReentrancy => -32012,
            BridgeError::StaleState { .. } => -32013,
            BridgeError::Remote { code, .. } => *code,
            _ => -32603,
        }
    }

    /// Build the wire error object for this error.
    ///
    /// Resolution errors carry the names involved in `data` so the satellite
    /// can rebuild the exact variant.
    pub fn to_response_error(&self) -> ResponseError {
        let data = match self {
            BridgeError::UnknownService { name } | BridgeError::UnknownMutator { name } => {
                Some(json!({ "name": name }))
            }
            BridgeError::MethodNotFound { service, method } => {
                Some(json!({ "service": service, "method": method }))
            }
            BridgeError::StaleState { slice, .. } => Some(json!({ "slice": slice })),
            _ => None,
        };
        ResponseError {
            code: self.to_rpc_error_code(),
            message: self.to_string(),
            data,
        }
    }

    /// Rebuild an error from a response error object.
    ///
    /// Codes without a dedicated variant (or without the expected `data`)
    /// become [`BridgeError::Remote`].
    pub fn from_response_error(err: ResponseError) -> Self {
        let field = |key: &str| {
            err.data
                .as_ref()
                .and_then(|d| d.get(key))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        match err.code {
            -32010 => match field("name") {
                Some(name) => BridgeError::UnknownService { name },
                None => BridgeError::Remote {
                    code: err.code,
                    message: err.message,
                },
            },
            -32011 => match field("name") {
                Some(name) => BridgeError::UnknownMutator { name },
                None => BridgeError::Remote {
                    code: err.code,
                    message: err.message,
                },
            },
            -32601 => match (field("service"), field("method")) {
                (Some(service), Some(method)) => BridgeError::MethodNotFound { service, method },
                _ => BridgeError::Remote {
                    code: err.code,
                    message: err.message,
                },
            },
            -32602 => BridgeError::InvalidParams {
                message: err
                    .message
                    .strip_prefix("Invalid params: ")
                    .unwrap_or(&err.message)
                    .to_string(),
            },
            -32012 => BridgeError::BufferReentrancy,
            -32013 => match field("slice") {
                Some(slice) => BridgeError::StaleState {
                    message: err
                        .message
                        .strip_prefix(&format!("State slice {} is out of date: ", slice))
                        .unwrap_or(&err.message)
                        .to_string(),
                    slice,
                },
                None => BridgeError::Remote {
                    code: err.code,
                    message: err.message,
                },
            },
            code => BridgeError::Remote {
                code,
                message: err.message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::method_not_found("ScenesService", "explode");
        assert_eq!(err.to_string(), "Method not found: ScenesService.explode");
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(
            BridgeError::UnknownService {
                name: "Nope".into()
            }
            .to_rpc_error_code(),
            -32010
        );
        assert_eq!(BridgeError::BufferReentrancy.to_rpc_error_code(), -32012);
        assert_eq!(
            BridgeError::Other("boom".into()).to_rpc_error_code(),
            -32603
        );
    }

    #[test]
    fn test_resolution_errors_survive_the_wire() {
        let original = BridgeError::method_not_found("AudioSource", "explode");
        let rebuilt = BridgeError::from_response_error(original.to_response_error());
        match rebuilt {
            BridgeError::MethodNotFound { service, method } => {
                assert_eq!(service, "AudioSource");
                assert_eq!(method, "explode");
            }
            other => panic!("Expected MethodNotFound, got: {:?}", other),
        }

        let rebuilt = BridgeError::from_response_error(
            BridgeError::UnknownMutator {
                name: "Ghost".into(),
            }
            .to_response_error(),
        );
        assert!(matches!(rebuilt, BridgeError::UnknownMutator { name } if name == "Ghost"));
    }

    #[test]
    fn test_invalid_params_message_not_double_prefixed() {
        let original = BridgeError::InvalidParams {
            message: "sourceId is required".into(),
        };
        let rebuilt = BridgeError::from_response_error(original.to_response_error());
        assert_eq!(rebuilt.to_string(), "Invalid params: sourceId is required");
    }

    #[test]
    fn test_stale_state_survives_the_wire() {
        let original = BridgeError::stale_state("AudioService", "no audio source mic-9");
        let rebuilt = BridgeError::from_response_error(original.to_response_error());
        assert_eq!(rebuilt.to_rpc_error_code(), -32013);
        assert_eq!(rebuilt.to_string(), original.to_string());
    }

    #[test]
    fn test_unrecognized_code_becomes_remote() {
        let rebuilt = BridgeError::from_response_error(ResponseError {
            code: -32603,
            message: "disk on fire".into(),
            data: None,
        });
        assert!(matches!(rebuilt, BridgeError::Remote { code: -32603, .. }));
    }
}
