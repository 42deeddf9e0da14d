#![deny(missing_docs)]
#![deny(clippy::all)]
//! Fault-tolerant replicated KV store over a slot-indexed consensus log.
//!
//! A fixed set of replicas serialize client commands into slots of a
//! shared log (the [`slotlog::Engine`] seam), learn the agreed sequence,
//! and apply it in slot order to an in-memory map. Reads and writes are
//! linearizable while a majority of peers is reachable; command ids make
//! every operation at-most-once across client retries.

use log::warn;
use serde::{Deserialize, Serialize};

/// Kind of a replicated command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    /// Linearizable read; leaves the store unchanged.
    Get,
    /// Overwrite the value under a key.
    Put,
    /// Concatenate onto the value under a key; a missing key reads as empty.
    Append,
    /// Filler decided in place of a stalled slot; ignored by the applier.
    #[default]
    Noop,
}

/// One command bound for a consensus-log slot.
///
/// Encoded to an opaque payload before proposing; the engine carries it
/// without interpreting it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Op {
    /// What to do.
    pub kind: OpKind,
    /// Key the command affects.
    pub key: String,
    /// Value for Put and Append; empty otherwise.
    pub value: String,
    /// Client-generated 62-bit command identity, the dedup key.
    pub cmd_id: u64,
    /// Index of the replica that proposed it.
    pub origin: u32,
}

impl Op {
    /// Encode for the consensus log.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode a slot payload. Anything unreadable becomes a no-op so that
    /// every replica still applies the same sequence.
    pub fn decode(raw: &str) -> Op {
        serde_json::from_str(raw).unwrap_or_else(|e| {
            warn!("undecodable command ({}), treating as no-op", e);
            Op::default()
        })
    }
}

/// Client-visible outcome of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Command logged (Put/Append) or applied and read (Get).
    Ok,
    /// The read reached the applied frontier and the key is absent.
    ErrNoKey,
    /// No decision within the bounded wait; retry with the same cmd_id.
    Timeout,
}

/// Reply to a Get.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetReply {
    /// Applied value; empty unless the status is [`Status::Ok`].
    pub value: String,
    /// Outcome.
    pub err: Status,
}

/// Reply to a PutAppend.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PutAppendReply {
    /// Outcome.
    pub err: Status,
}

chanrpc::service! {
    /// Wire protocol between clerks and replicas.
    service kv_service {
        fn get(key: String, cmd_id: u64, client_id: u64) -> GetReply;
        fn put_append(key: String, value: String, kind: OpKind, cmd_id: u64) -> PutAppendReply;
        fn get_local(key: String) -> Option<String>;
    }
}

pub use kv_service::{Client as KvClient, Server as KvServer, Service as KvService};

/// Cluster client.
pub mod client;
/// Timing knobs.
pub mod config;
/// Replica server.
pub mod server;
/// In-memory state machine.
pub mod store;
