use log::debug;
use rand::Rng;

use crate::{KvClient, OpKind, Status};

/// Draw a fresh 62-bit identity from a uniform source.
fn nrand() -> u64 {
    rand::thread_rng().gen_range(0..1u64 << 62)
}

/// Client for a replicated KV cluster.
///
/// Operations retry forever across servers on transport failure or
/// Timeout; the command id stays fixed through every retry of one
/// operation, which is what makes the retries at-most-once.
pub struct Clerk {
    servers: Vec<KvClient>,
    client_id: u64,
}

impl Clerk {
    /// A clerk over one client per replica.
    pub fn new(servers: Vec<KvClient>) -> Self {
        Self {
            servers,
            client_id: nrand(),
        }
    }

    /// Fetch the current value for `key`; the empty string if absent.
    pub async fn get(&self, key: &str) -> String {
        let cmd_id = nrand();
        let mut i = 0;
        loop {
            let c = &self.servers[i % self.servers.len()];
            i += 1;
            match c.get(key.to_owned(), cmd_id, self.client_id).await {
                Ok(reply) => match reply.err {
                    Status::Ok => return reply.value,
                    Status::ErrNoKey => return String::new(),
                    Status::Timeout => debug!("get {:?} timed out, rotating", key),
                },
                Err(e) => debug!("get {:?} transport error: {}", key, e),
            }
        }
    }

    /// Overwrite `key` with `value`.
    pub async fn put(&self, key: &str, value: &str) {
        self.put_append(key, value, OpKind::Put).await;
    }

    /// Concatenate `value` onto `key`.
    pub async fn append(&self, key: &str, value: &str) {
        self.put_append(key, value, OpKind::Append).await;
    }

    async fn put_append(&self, key: &str, value: &str, kind: OpKind) {
        let cmd_id = nrand();
        let mut i = 0;
        loop {
            let c = &self.servers[i % self.servers.len()];
            i += 1;
            match c
                .put_append(key.to_owned(), value.to_owned(), kind, cmd_id)
                .await
            {
                Ok(reply) if reply.err == Status::Ok => return,
                Ok(_) => debug!("{:?} {:?} timed out, rotating", kind, key),
                Err(e) => debug!("{:?} {:?} transport error: {}", kind, key, e),
            }
        }
    }
}
