use chrono::{DateTime, Duration, Utc};

use super::AppStatus;

/// A remote status snapshot and the moment it was fetched.
#[derive(Debug, Clone)]
pub struct StatusCache {
    pub fetched_at: DateTime<Utc>,
    pub status: AppStatus,
}

impl StatusCache {
    pub fn new(status: AppStatus, fetched_at: DateTime<Utc>) -> Self {
        Self { fetched_at, status }
    }

    /// A snapshot from the future is never fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now >= self.fetched_at && now - self.fetched_at < ttl
    }
}
