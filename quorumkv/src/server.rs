use std::collections::{HashMap, HashSet};

use chanrpc::anyhow::Result;
use log::{debug, info, warn};
use slotlog::{Engine, Fate};

use crate::config::ReplicaConfig;
use crate::store::Store;
use crate::{GetReply, KvService, Op, OpKind, PutAppendReply, Status};

/// One peer of the replicated store.
///
/// The replica owns all of its mutable state and the service actor hands
/// it one RPC at a time, so ingress, sequencing, and application are
/// serialized per peer. While a command waits on the consensus engine,
/// later RPCs queue behind it.
pub struct Replica<E> {
    me: u32,
    engine: E,
    config: ReplicaConfig,
    store: Store,
    /// Command ids this replica has carried through consensus.
    seen: HashSet<u64>,
    /// Values returned by completed Gets, by command id.
    replies: HashMap<u64, String>,
    /// Exclusive upper bound of the applied slot prefix.
    frontier: u64,
}

impl<E: Engine> Replica<E> {
    /// A fresh replica with peer index `me` over `engine`.
    pub fn new(me: u32, engine: E, config: ReplicaConfig) -> Self {
        info!("replica {} starting", me);
        Self {
            me,
            engine,
            config,
            store: Store::new(),
            seen: HashSet::new(),
            replies: HashMap::new(),
            frontier: 0,
        }
    }

    /// Poll `slot` with exponential backoff until it decides, or give up
    /// once the delay reaches the configured cap.
    async fn wait_decision(&self, slot: u64) -> Option<Op> {
        let mut delay = self.config.poll_initial;
        loop {
            if let Fate::Decided(raw) = self.engine.status(slot) {
                return Some(Op::decode(&raw));
            }
            tokio::time::sleep(delay).await;
            if delay < self.config.poll_cap {
                delay *= 2;
            } else {
                debug!("replica {}: gave up waiting on slot {}", self.me, slot);
                return None;
            }
        }
    }

    /// Propose `op` at successive candidate slots until it wins one.
    ///
    /// Every attempt consumes exactly one slot, so contention cannot
    /// starve a command, only delay it. Returns the winning slot, or
    /// None when a decision wait gave up.
    async fn sequence(&self, op: &Op) -> Result<Option<u64>> {
        let payload = op.encode()?;
        loop {
            let slot = self.engine.max().map_or(0, |m| m + 1);
            self.engine.start(slot, payload.clone());
            match self.wait_decision(slot).await {
                Some(winner) if winner.cmd_id == op.cmd_id => {
                    debug!("replica {}: cmd {} won slot {}", self.me, op.cmd_id, slot);
                    return Ok(Some(slot));
                }
                Some(winner) => {
                    debug!(
                        "replica {}: slot {} went to cmd {}, retrying",
                        self.me, slot, winner.cmd_id
                    );
                }
                None => return Ok(None),
            }
        }
    }

    /// Apply every decided slot in [frontier, limit) in order, forcing
    /// undecided slots with no-ops. Returns false if a slot would not
    /// decide; the frontier parks on it so no slot is ever skipped.
    async fn catch_up(&mut self, limit: u64) -> Result<bool> {
        while self.frontier < limit {
            let slot = self.frontier;
            let op = match self.engine.status(slot) {
                Fate::Decided(raw) => Op::decode(&raw),
                Fate::Forgotten => {
                    // below the low-water mark: applied everywhere already
                    self.frontier = slot + 1;
                    continue;
                }
                Fate::Pending | Fate::Unknown => {
                    self.engine.start(slot, Op::default().encode()?);
                    match self.wait_decision(slot).await {
                        Some(op) => op,
                        None => {
                            warn!("replica {}: slot {} stuck undecided", self.me, slot);
                            return Ok(false);
                        }
                    }
                }
            };
            self.store.apply(&op);
            self.frontier = slot + 1;
        }
        if self.frontier > 0 {
            // every slot strictly below the frontier is never read again
            self.engine.done(self.frontier - 1);
        }
        Ok(true)
    }
}

#[chanrpc::async_trait]
impl<E: Engine> KvService for Replica<E> {
    async fn get(&mut self, key: String, cmd_id: u64, client_id: u64) -> Result<GetReply> {
        debug!(
            "replica {}: get key={:?} cmd={} client={}",
            self.me, key, cmd_id, client_id
        );
        if self.seen.contains(&cmd_id) {
            // completed earlier; answer from the cache, or re-read the
            // applied state for a Get that completed without a value
            let reply = match self.replies.get(&cmd_id) {
                Some(v) => GetReply {
                    value: v.clone(),
                    err: Status::Ok,
                },
                None => match self.store.get(&key) {
                    Some(v) => GetReply {
                        value: v.to_owned(),
                        err: Status::Ok,
                    },
                    None => GetReply {
                        value: String::new(),
                        err: Status::ErrNoKey,
                    },
                },
            };
            return Ok(reply);
        }
        self.seen.insert(cmd_id);
        let op = Op {
            kind: OpKind::Get,
            key: key.clone(),
            value: String::new(),
            cmd_id,
            origin: self.me,
        };
        if self.sequence(&op).await?.is_none() {
            self.seen.remove(&cmd_id);
            return Ok(GetReply {
                value: String::new(),
                err: Status::Timeout,
            });
        }
        // every slot agreed before this Get must be visible to the read;
        // the top slot itself is the Get or younger, neither of which the
        // read depends on
        let limit = self.engine.max().unwrap_or(0);
        if !self.catch_up(limit).await? {
            self.seen.remove(&cmd_id);
            return Ok(GetReply {
                value: String::new(),
                err: Status::Timeout,
            });
        }
        let reply = match self.store.get(&key) {
            Some(v) => {
                self.replies.insert(cmd_id, v.to_owned());
                GetReply {
                    value: v.to_owned(),
                    err: Status::Ok,
                }
            }
            None => GetReply {
                value: String::new(),
                err: Status::ErrNoKey,
            },
        };
        Ok(reply)
    }

    async fn put_append(
        &mut self,
        key: String,
        value: String,
        kind: OpKind,
        cmd_id: u64,
    ) -> Result<PutAppendReply> {
        debug!(
            "replica {}: {:?} key={:?} value={:?} cmd={}",
            self.me, kind, key, value, cmd_id
        );
        if self.seen.contains(&cmd_id) {
            // the command is in the log; the duplicate is absorbed here
            return Ok(PutAppendReply { err: Status::Ok });
        }
        self.seen.insert(cmd_id);
        let op = Op {
            kind,
            key,
            value,
            cmd_id,
            origin: self.me,
        };
        let err = match self.sequence(&op).await? {
            Some(_) => Status::Ok,
            None => {
                // outcome indeterminate; let a retry propose again under
                // the same cmd_id, the applied set keeps it at-most-once
                self.seen.remove(&cmd_id);
                Status::Timeout
            }
        };
        Ok(PutAppendReply { err })
    }

    async fn get_local(&mut self, key: String) -> Result<Option<String>> {
        Ok(self.store.get(&key).map(str::to_owned))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use slotlog::sim::SimCluster;

    use super::*;

    fn fast() -> ReplicaConfig {
        ReplicaConfig::default().with_poll(Duration::from_millis(1), Duration::from_millis(4))
    }

    fn op(kind: OpKind, key: &str, value: &str, cmd_id: u64) -> Op {
        Op {
            kind,
            key: key.to_owned(),
            value: value.to_owned(),
            cmd_id,
            origin: 9,
        }
    }

    #[tokio::test]
    async fn put_then_get() {
        let sim = SimCluster::new(1);
        let mut r = Replica::new(0, sim.engine(0), fast());

        let reply = r
            .put_append("a".to_owned(), "1".to_owned(), OpKind::Put, 1)
            .await
            .unwrap();
        assert_eq!(reply.err, Status::Ok);

        let reply = r.get("a".to_owned(), 2, 100).await.unwrap();
        assert_eq!(reply.err, Status::Ok);
        assert_eq!(reply.value, "1");
    }

    #[tokio::test]
    async fn get_absent_key() {
        let sim = SimCluster::new(1);
        let mut r = Replica::new(0, sim.engine(0), fast());

        let reply = r.get("nothing".to_owned(), 1, 100).await.unwrap();
        assert_eq!(reply.err, Status::ErrNoKey);
        assert_eq!(reply.value, "");
    }

    #[tokio::test]
    async fn seen_put_short_circuits() {
        let sim = SimCluster::new(1);
        let engine = sim.engine(0);
        let mut r = Replica::new(0, engine.clone(), fast());

        r.put_append("k".to_owned(), "v".to_owned(), OpKind::Put, 5)
            .await
            .unwrap();
        let after_first = engine.max();
        let reply = r
            .put_append("k".to_owned(), "v".to_owned(), OpKind::Put, 5)
            .await
            .unwrap();
        assert_eq!(reply.err, Status::Ok);
        assert_eq!(engine.max(), after_first, "duplicate must not consume a slot");
    }

    #[tokio::test]
    async fn command_in_two_slots_applies_once() {
        let sim = SimCluster::new(1);
        let engine = sim.engine(0);
        let mut r = Replica::new(0, engine.clone(), fast());

        // the same append decided twice, as after a client retry that
        // re-proposed before learning the first slot had won
        let dup = op(OpKind::Append, "x", "A", 42).encode().unwrap();
        engine.start(0, dup.clone());
        engine.start(1, dup);

        let reply = r.get("x".to_owned(), 43, 100).await.unwrap();
        assert_eq!(reply.err, Status::Ok);
        assert_eq!(reply.value, "A");
    }

    #[tokio::test]
    async fn noop_slots_are_ignored() {
        let sim = SimCluster::new(1);
        let engine = sim.engine(0);
        let mut r = Replica::new(0, engine.clone(), fast());

        engine.start(0, Op::default().encode().unwrap());
        engine.start(1, op(OpKind::Put, "k", "v", 7).encode().unwrap());

        let reply = r.get("k".to_owned(), 8, 100).await.unwrap();
        assert_eq!(reply.err, Status::Ok);
        assert_eq!(reply.value, "v");
    }

    #[tokio::test]
    async fn applies_in_slot_order() {
        let sim = SimCluster::new(1);
        let engine = sim.engine(0);
        let mut r = Replica::new(0, engine.clone(), fast());

        engine.start(0, op(OpKind::Put, "k", "base", 1).encode().unwrap());
        engine.start(1, op(OpKind::Append, "k", "+1", 2).encode().unwrap());
        engine.start(2, op(OpKind::Append, "k", "+2", 3).encode().unwrap());

        let reply = r.get("k".to_owned(), 4, 100).await.unwrap();
        assert_eq!(reply.value, "base+1+2");
    }

    #[tokio::test]
    async fn isolated_replica_times_out_then_recovers() {
        let sim = SimCluster::new(3);
        let mut r = Replica::new(0, sim.engine(0), fast());

        sim.isolate(0);
        let reply = r
            .put_append("k".to_owned(), "v".to_owned(), OpKind::Put, 11)
            .await
            .unwrap();
        assert_eq!(reply.err, Status::Timeout);

        // the retry must be able to propose again under the same cmd_id
        sim.reconnect(0);
        let reply = r
            .put_append("k".to_owned(), "v".to_owned(), OpKind::Put, 11)
            .await
            .unwrap();
        assert_eq!(reply.err, Status::Ok);

        let reply = r.get("k".to_owned(), 12, 100).await.unwrap();
        assert_eq!(reply.value, "v");
    }

    #[tokio::test]
    async fn get_result_is_cached_by_cmd_id() {
        let sim = SimCluster::new(1);
        let engine = sim.engine(0);
        let mut r = Replica::new(0, engine.clone(), fast());

        r.put_append("k".to_owned(), "old".to_owned(), OpKind::Put, 1)
            .await
            .unwrap();
        let first = r.get("k".to_owned(), 2, 100).await.unwrap();
        assert_eq!(first.value, "old");

        // a later write must not leak into the replay of the old Get
        engine.start(9, op(OpKind::Put, "k", "new", 3).encode().unwrap());
        let replay = r.get("k".to_owned(), 2, 100).await.unwrap();
        assert_eq!(replay.value, "old");
    }

    #[tokio::test]
    async fn catch_up_signals_done() {
        let sim = SimCluster::new(1);
        let engine = sim.engine(0);
        let mut r = Replica::new(0, engine.clone(), fast());

        for i in 0..5u64 {
            r.put_append(format!("k{}", i), "v".to_owned(), OpKind::Put, 100 + i)
                .await
                .unwrap();
        }
        assert_eq!(engine.min(), 0);
        r.get("k0".to_owned(), 200, 100).await.unwrap();
        assert!(engine.min() > 0, "applied prefix should be released");
    }
}
