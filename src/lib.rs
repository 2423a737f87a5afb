//! # rpcwire
//!
//! Client-side transport for a request/response RPC protocol over
//! persistent TCP connections.
//!
//! ## Architecture
//!
//! - **Wire format**: 16-byte header (magic, version, length, type, codec,
//!   compression, request id) followed by a serialized, optionally
//!   compressed body
//! - **Connections**: one multiplexed connection per remote address, with a
//!   reader task routing responses by request id and a writer task that
//!   also sends heartbeats when the connection is write-idle
//! - **Requests**: `send` returns a [`ResponseHandle`] immediately; the
//!   handle resolves with the response, a timeout or a connection error
//!
//! ## Example
//!
//! ```ignore
//! use rpcwire::discovery::LocalRegistry;
//! use rpcwire::{RpcClient, RpcRequest};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> rpcwire::Result<()> {
//!     let registry = LocalRegistry::from_static([("demo.Greeter", "127.0.0.1:20880".parse().unwrap())]);
//!
//!     let client = RpcClient::builder().discovery(registry).build()?;
//!
//!     let request = RpcRequest::new("demo.Greeter", "greet").param("String", json!("ada"));
//!     let response = client.call(request).await?;
//!     println!("{:?}", response.data);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod pending;
pub mod protocol;
pub mod transport;
pub mod writer;

mod client;

pub use client::{ClientBuilder, ResponseHandle, RpcClient};
pub use config::ClientConfig;
pub use error::{Result, RpcError};
pub use protocol::{ResponseCode, RpcRequest, RpcResponse};
