//! In-process RPC over tokio channels.
//!
//! A service is declared with [`service!`]; the declaration expands to the
//! request/reply wire types, a typed async `Client`, and a `Server` actor
//! that owns the service value and handles one request at a time. A
//! [`Network`] routes packets between every node registered on it.

pub mod client;
mod macros;
pub mod network;
pub mod server;

pub use anyhow;
pub use async_trait::async_trait;
pub use futures;
pub use log;
pub use serde;
pub use serde_json;
pub use tokio;

pub use network::Network;
