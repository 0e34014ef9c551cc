use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-user async mutexes. Entries are never evicted.
#[derive(Clone, Default)]
pub struct UserLocks {
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub async fn lock(&self, user_id: i64) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(&self.locks.entry(user_id).or_default());
        lock.lock_owned().await
    }
}

/// Outstanding spin tickets, one per user, issued by `spin` and redeemed once
/// by `spinResult`.
#[derive(Clone, Default)]
pub struct SpinTickets {
    tickets: Arc<DashMap<i64, DateTime<Utc>>>,
}

impl SpinTickets {
    pub fn issue(&self, user_id: i64, now: DateTime<Utc>) {
        self.tickets.insert(user_id, now);
    }

    /// Takes the user's ticket and returns its issue time if it is still
    /// live. An expired ticket is consumed all the same.
    pub fn redeem(&self, user_id: i64, now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
        self.tickets
            .remove(&user_id)
            .map(|(_, issued_at)| issued_at)
            .filter(|issued_at| now - *issued_at <= ttl)
    }
}
