//! Deterministic in-process engine for clusters that share an address
//! space.
//!
//! All peers hang off one decision board. A proposal decides its slot
//! immediately when the proposing peer sits in a majority component;
//! proposals from an isolated peer are dropped, and an isolated peer
//! learns no new decisions until it is reconnected. This is the engine
//! behind the integration tests and the bench.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use log::{debug, info, trace};

use crate::{Engine, Fate};

struct Board {
    n: usize,
    /// Highest slot ever decided; never regresses under truncation.
    top: Option<u64>,
    /// Decided slots still retained.
    chosen: BTreeMap<u64, String>,
    /// Per peer, the highest slot it has observed.
    view_max: Vec<Option<u64>>,
    /// Per peer, the highest slot it has promised not to read again.
    done: Vec<Option<u64>>,
    connected: Vec<bool>,
    dead: Vec<bool>,
    /// Lowest retained slot; everything below is forgotten.
    min: u64,
}

impl Board {
    fn new(n: usize) -> Self {
        Self {
            n,
            top: None,
            chosen: BTreeMap::new(),
            view_max: vec![None; n],
            done: vec![None; n],
            connected: vec![true; n],
            dead: vec![false; n],
            min: 0,
        }
    }

    fn alive(&self, me: usize) -> bool {
        self.connected[me] && !self.dead[me]
    }

    fn quorum(&self) -> bool {
        let up = self
            .connected
            .iter()
            .zip(&self.dead)
            .filter(|(c, d)| **c && !**d)
            .count();
        up >= self.n / 2 + 1
    }

    /// A connected peer observes everything decided so far.
    fn sync(&mut self, me: usize) {
        if self.alive(me) && self.view_max[me] < self.top {
            self.view_max[me] = self.top;
        }
    }

    /// min = 1 + the lowest watermark, once every peer has reported one.
    fn recompute_min(&mut self) {
        if let Some(lowest) = self.done.iter().copied().min().flatten() {
            let floor = lowest + 1;
            if floor > self.min {
                self.min = floor;
                self.chosen = self.chosen.split_off(&floor);
                debug!("log truncated below slot {}", floor);
            }
        }
    }
}

/// Shared decision state for one simulated cluster.
#[derive(Clone)]
pub struct SimCluster {
    board: Arc<Mutex<Board>>,
}

impl SimCluster {
    /// A fresh board for `n` peers, all connected.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "cluster needs at least one peer");
        Self {
            board: Arc::new(Mutex::new(Board::new(n))),
        }
    }

    /// The engine handle for peer `me`.
    pub fn engine(&self, me: usize) -> SimEngine {
        assert!(me < self.board.lock().unwrap().n, "no such peer");
        SimEngine {
            me,
            board: self.board.clone(),
        }
    }

    /// Cut peer `me` off: its proposals are dropped and it learns no new
    /// decisions until reconnected.
    pub fn isolate(&self, me: usize) {
        let mut b = self.board.lock().unwrap();
        b.connected[me] = false;
        info!("peer {} isolated", me);
    }

    /// Undo [`SimCluster::isolate`].
    pub fn reconnect(&self, me: usize) {
        let mut b = self.board.lock().unwrap();
        b.connected[me] = true;
        info!("peer {} reconnected", me);
    }
}

/// Per-peer [`Engine`] handle of a [`SimCluster`].
#[derive(Clone)]
pub struct SimEngine {
    me: usize,
    board: Arc<Mutex<Board>>,
}

impl Engine for SimEngine {
    fn start(&self, slot: u64, value: String) {
        let mut b = self.board.lock().unwrap();
        if b.dead[self.me] || slot < b.min {
            return;
        }
        if !b.alive(self.me) || !b.quorum() {
            trace!("peer {}: proposal for slot {} dropped", self.me, slot);
            return;
        }
        let b = &mut *b;
        if let Entry::Vacant(e) = b.chosen.entry(slot) {
            e.insert(value);
            if b.top < Some(slot) {
                b.top = Some(slot);
            }
            debug!("slot {} decided via peer {}", slot, self.me);
        }
        b.sync(self.me);
    }

    fn status(&self, slot: u64) -> Fate {
        let mut b = self.board.lock().unwrap();
        if b.dead[self.me] {
            return Fate::Unknown;
        }
        b.sync(self.me);
        if slot < b.min {
            return Fate::Forgotten;
        }
        if b.alive(self.me) {
            if let Some(v) = b.chosen.get(&slot) {
                return Fate::Decided(v.clone());
            }
        }
        if Some(slot) <= b.view_max[self.me] {
            Fate::Pending
        } else {
            Fate::Unknown
        }
    }

    fn max(&self) -> Option<u64> {
        let mut b = self.board.lock().unwrap();
        if !b.dead[self.me] {
            b.sync(self.me);
        }
        b.view_max[self.me]
    }

    fn min(&self) -> u64 {
        self.board.lock().unwrap().min
    }

    fn done(&self, slot: u64) {
        let mut b = self.board.lock().unwrap();
        if b.dead[self.me] {
            return;
        }
        let me = self.me;
        b.done[me] = b.done[me].max(Some(slot));
        b.recompute_min();
    }

    fn kill(&self) {
        let mut b = self.board.lock().unwrap();
        b.dead[self.me] = true;
        info!("peer {} killed", self.me);
    }
}
