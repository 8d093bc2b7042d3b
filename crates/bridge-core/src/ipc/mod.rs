//! Local IPC channel between satellites and the host.
//!
//! Length-prefixed JSON frames over `127.0.0.1` TCP connections.
//!
//! # Architecture
//!
//! - **Server**: runs in the host, sends a ready event on every new
//!   connection, then answers requests through a [`RequestHandler`]
//! - **Client**: runs in a satellite, one request/response exchange at a time
//! - **Frame**: shared framing used by both

pub mod client;
pub mod frame;
pub mod server;

pub use client::IpcClient;
pub use server::{IpcServer, IpcServerHandle, RequestHandler};
