use chrono::{DateTime, Utc};

use super::UserSnapshot;

/// One persisted session, mirrored verbatim into both storage tiers.
///
/// `expiry` is always the token's `issued_at` plus the session duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub token: String,
    pub expiry: i64,
    pub user: UserSnapshot,
}

impl SessionRecord {
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        now_millis > self.expiry
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.expiry)
    }
}
