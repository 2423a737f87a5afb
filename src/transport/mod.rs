//! Transport module - streams, connection handles and the connection registry.
//!
//! Provides:
//! - [`Connector`] for establishing byte streams (TCP by default)
//! - [`Connection`] owning one stream with its reader and writer tasks
//! - [`ConnectionRegistry`] holding at most one connection per address

mod connection;
mod connector;
mod registry;
mod state;

pub use connection::{
    Connection, ConnectionOptions, MessageHandler, DEFAULT_READ_BUFFER_SIZE,
};
pub use connector::{BoxFuture, BoxedReader, BoxedWriter, Connector, TcpConnector};
pub use registry::ConnectionRegistry;
pub use state::{ConnectionState, StateCell};
