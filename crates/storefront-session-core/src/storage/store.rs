use tracing::{debug, warn};

use super::{MemoryTier, StorageError, StorageTier, TierKind};
use crate::models::{SessionRecord, UserSnapshot};

/// The three slot names a session occupies in each tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotKeys {
    pub token: String,
    pub expiry: String,
    pub user: String,
}

impl SlotKeys {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            token: format!("{}_session_token", prefix),
            expiry: format!("{}_session_expiry", prefix),
            user: format!("{}_session_user", prefix),
        }
    }

    fn all(&self) -> [&str; 3] {
        [self.token.as_str(), self.expiry.as_str(), self.user.as_str()]
    }
}

pub struct SessionStore {
    volatile: Box<dyn StorageTier>,
    durable: Box<dyn StorageTier>,
    keys: SlotKeys,
}

impl SessionStore {
    pub fn new(
        volatile: Box<dyn StorageTier>,
        durable: Box<dyn StorageTier>,
        key_prefix: &str,
    ) -> Self {
        Self {
            volatile,
            durable,
            keys: SlotKeys::with_prefix(key_prefix),
        }
    }

    /// Both tiers in memory. Useful for tests and embedding.
    pub fn in_memory(key_prefix: &str) -> Self {
        Self::new(
            Box::new(MemoryTier::new()),
            Box::new(MemoryTier::new()),
            key_prefix,
        )
    }

    pub fn tier(&self, kind: TierKind) -> &dyn StorageTier {
        match kind {
            TierKind::Volatile => self.volatile.as_ref(),
            TierKind::Durable => self.durable.as_ref(),
        }
    }

    /// Write the record into both tiers.
    ///
    /// Both tiers are attempted even if the first one fails. On any failure
    /// the session is cleared from both tiers and the first error is
    /// returned, so a record is either in both tiers or in neither.
    pub fn write(&self, record: &SessionRecord) -> Result<(), StorageError> {
        let user = serde_json::to_string(&record.user)?;
        let expiry = record.expiry.to_string();

        let mut first_error = None;
        for kind in [TierKind::Volatile, TierKind::Durable] {
            if let Err(e) = self.write_tier(self.tier(kind), &record.token, &expiry, &user) {
                warn!(tier = %kind, error = %e, "Failed to write session");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => {
                if let Err(clear_err) = self.clear() {
                    warn!(error = %clear_err, "Failed to roll back partial session write");
                }
                Err(e)
            }
            None => Ok(()),
        }
    }

    fn write_tier(
        &self,
        tier: &dyn StorageTier,
        token: &str,
        expiry: &str,
        user: &str,
    ) -> Result<(), StorageError> {
        tier.set(&self.keys.token, token)?;
        tier.set(&self.keys.expiry, expiry)?;
        tier.set(&self.keys.user, user)?;
        Ok(())
    }

    /// Read the record, volatile tier first.
    ///
    /// The durable tier is consulted as a unit when the volatile tier is
    /// incomplete, unreadable, or holds slots that do not parse.
    pub fn read(&self) -> Result<Option<SessionRecord>, StorageError> {
        match self.read_tier(TierKind::Volatile) {
            Ok(Some(record)) => return Ok(Some(record)),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Volatile tier unreadable, falling back to durable tier");
            }
        }
        self.read_tier(TierKind::Durable)
    }

    /// The cached user snapshot, following the same fallback as `read`
    pub fn read_user(&self) -> Result<Option<UserSnapshot>, StorageError> {
        Ok(self.read()?.map(|record| record.user))
    }

    fn read_tier(&self, kind: TierKind) -> Result<Option<SessionRecord>, StorageError> {
        let tier = self.tier(kind);
        let token = tier.get(&self.keys.token)?;
        let expiry = tier.get(&self.keys.expiry)?;
        let user = tier.get(&self.keys.user)?;

        let (Some(token), Some(expiry), Some(user)) = (token, expiry, user) else {
            debug!(tier = %kind, "No complete session in tier");
            return Ok(None);
        };

        let expiry = match expiry.trim().parse::<i64>() {
            Ok(expiry) => expiry,
            Err(e) => {
                warn!(tier = %kind, error = %e, "Unparseable session expiry");
                return Ok(None);
            }
        };

        let user: UserSnapshot = match serde_json::from_str(&user) {
            Ok(user) => user,
            Err(e) => {
                warn!(tier = %kind, error = %e, "Unparseable session user");
                return Ok(None);
            }
        };

        Ok(Some(SessionRecord {
            token,
            expiry,
            user,
        }))
    }

    /// Remove every slot from both tiers. Missing slots are fine.
    ///
    /// Every removal is attempted; the first error is returned.
    pub fn clear(&self) -> Result<(), StorageError> {
        let volatile = self.clear_tier(TierKind::Volatile);
        let durable = self.clear_tier(TierKind::Durable);
        volatile.and(durable)
    }

    /// Remove every slot from one tier only
    pub fn clear_tier(&self, kind: TierKind) -> Result<(), StorageError> {
        let tier = self.tier(kind);
        let mut first_error = None;
        for key in self.keys.all() {
            if let Err(e) = tier.remove(key) {
                warn!(tier = %kind, key, error = %e, "Failed to remove session slot");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
