use std::collections::{HashMap, HashSet};

use log::trace;

use crate::{Op, OpKind};

/// In-memory key→value state machine with at-most-once apply.
///
/// The applied-command set is the authority for deduplication: a command
/// that lands in two slots, or arrives twice over the wire, mutates the
/// map exactly once.
#[derive(Debug, Default)]
pub struct Store {
    data: HashMap<String, String>,
    applied: HashSet<u64>,
}

impl Store {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently applied value under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Execute one decided command. No-ops and duplicate command ids are
    /// inert, so replaying a log prefix is harmless.
    pub fn apply(&mut self, op: &Op) {
        if op.kind == OpKind::Noop || !self.applied.insert(op.cmd_id) {
            return;
        }
        match op.kind {
            OpKind::Put => {
                self.data.insert(op.key.clone(), op.value.clone());
            }
            OpKind::Append => {
                self.data
                    .entry(op.key.clone())
                    .or_default()
                    .push_str(&op.value);
            }
            OpKind::Get | OpKind::Noop => {}
        }
        trace!("applied {:?} cmd {}", op.kind, op.cmd_id);
    }
}
