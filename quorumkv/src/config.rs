use std::time::Duration;

/// Timing knobs for a replica.
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    /// First delay of the decision-wait poll.
    pub poll_initial: Duration,
    /// Give up waiting on a slot once the poll delay reaches this.
    pub poll_cap: Duration,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            poll_initial: Duration::from_millis(10),
            poll_cap: Duration::from_secs(10),
        }
    }
}

impl ReplicaConfig {
    /// Override the decision-wait bounds; tests compress them.
    pub fn with_poll(mut self, initial: Duration, cap: Duration) -> Self {
        self.poll_initial = initial;
        self.poll_cap = cap;
        self
    }
}
