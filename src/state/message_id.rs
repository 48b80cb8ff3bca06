use std::sync::atomic::{AtomicU64, Ordering};

/// Local message ids, unique per process, assigned before the backend
/// announces its own request id.
pub struct MessageIdGenerator {
    seed: u128,
    counter: AtomicU64,
}

impl MessageIdGenerator {
    #[must_use]
    pub fn new() -> Self {
        let seed_hi = u128::from(fastrand::u64(..));
        let seed_lo = u128::from(fastrand::u64(..));
        Self {
            seed: (seed_hi << 64) | seed_lo,
            counter: AtomicU64::new(1),
        }
    }

    pub fn next_seq(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    #[must_use]
    pub fn message_uuid(&self, seq: u64) -> uuid::Uuid {
        uuid::Uuid::from_u128(self.seed ^ u128::from(seq))
    }

    pub fn next_id(&self) -> String {
        self.message_uuid(self.next_seq()).to_string()
    }
}

impl Default for MessageIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
