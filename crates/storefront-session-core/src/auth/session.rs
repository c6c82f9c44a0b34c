use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, trace, warn};

use super::{InvalidReason, RefreshError, SessionError, SigningKey, TokenCodec};
use crate::clock::Clock;
use crate::config::{ConfigError, SessionConfig};
use crate::models::{Identity, SessionRecord, UserSnapshot};
use crate::storage::SessionStore;
use crate::utils::truncate_string;

/// Characters of a token shown in trace logs
const TOKEN_PREVIEW_LENGTH: usize = 12;

/// Result of checking the stored session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Valid {
        user_id: String,
        email: String,
        user: UserSnapshot,
        issued_at: i64,
        expiry: i64,
    },
    Invalid(InvalidReason),
}

impl SessionOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, SessionOutcome::Valid { .. })
    }
}

pub struct SessionManager {
    codec: TokenCodec,
    store: SessionStore,
    clock: Arc<dyn Clock>,
    session_duration: Duration,
}

impl SessionManager {
    pub fn new(
        codec: TokenCodec,
        store: SessionStore,
        clock: Arc<dyn Clock>,
        session_duration: Duration,
    ) -> Self {
        Self {
            codec,
            store,
            clock,
            session_duration,
        }
    }

    pub fn from_config(
        config: &SessionConfig,
        key: &SigningKey,
        store: SessionStore,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let codec = TokenCodec::new(key, config.tag_length, clock.clone())?;
        Ok(Self::new(codec, store, clock, config.session_duration()))
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Issue a new session for a user the identity provider just signed in
    pub fn create_session(&self, identity: &Identity) -> Result<SessionRecord, SessionError> {
        self.issue(identity, self.now())
    }

    fn issue(&self, identity: &Identity, issued_at: i64) -> Result<SessionRecord, SessionError> {
        let token = self
            .codec
            .encode_at(&identity.user_id, &identity.email, issued_at);
        let record = SessionRecord {
            token,
            expiry: issued_at.saturating_add(self.session_duration.num_milliseconds()),
            user: UserSnapshot::from(identity),
        };

        if let Err(e) = self.store.write(&record) {
            warn!(user_id = %identity.user_id, error = %e, "Session not persisted");
            return Err(e.into());
        }

        trace!(token = %truncate_string(&record.token, TOKEN_PREVIEW_LENGTH), "Token issued");
        info!(user_id = %identity.user_id, expiry = record.expiry, "Session created");
        Ok(record)
    }

    /// Check the stored session, clearing it if it has expired or was tampered with
    pub fn validate_current_session(&self) -> SessionOutcome {
        let record = match self.store.read() {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("No session token found");
                return SessionOutcome::Invalid(InvalidReason::NoToken);
            }
            Err(e) => {
                warn!(error = %e, "Session storage unreadable");
                return SessionOutcome::Invalid(InvalidReason::StorageUnavailable);
            }
        };

        let claims = match self.codec.decode(&record.token) {
            Ok(claims) => claims,
            Err(e) => {
                warn!(reason = %e, "Session token rejected, clearing session");
                self.clear_session();
                return SessionOutcome::Invalid(InvalidReason::Tampered);
            }
        };

        let now = self.now();
        let duration_ms = self.session_duration.num_milliseconds();
        let age = now.saturating_sub(claims.issued_at);
        if age > duration_ms || record.is_expired_at(now) {
            info!(user_id = %claims.user_id, age_ms = age, "Session expired, clearing session");
            self.clear_session();
            return SessionOutcome::Invalid(InvalidReason::Expired);
        }

        // The expiry slot is not covered by the tag, so it must match the token
        if record.expiry != claims.issued_at.saturating_add(duration_ms) {
            warn!(
                user_id = %claims.user_id,
                expiry = record.expiry,
                "Stored expiry does not match token, clearing session"
            );
            self.clear_session();
            return SessionOutcome::Invalid(InvalidReason::Tampered);
        }

        SessionOutcome::Valid {
            user_id: claims.user_id,
            email: claims.email,
            user: record.user,
            issued_at: claims.issued_at,
            expiry: record.expiry,
        }
    }

    /// Re-issue the current session with a new token and a later expiry
    pub fn refresh_session(&self) -> Result<SessionRecord, RefreshError> {
        match self.validate_current_session() {
            SessionOutcome::Valid {
                user_id,
                email,
                user,
                issued_at,
                ..
            } => {
                let identity = Identity::new(user_id, email, user.display_name);
                // Never reuse the previous issuance time, so expiry always moves forward
                let issued_at = self.now().max(issued_at + 1);
                let record = self.issue(&identity, issued_at)?;
                info!(user_id = %identity.user_id, expiry = record.expiry, "Session refreshed");
                Ok(record)
            }
            SessionOutcome::Invalid(InvalidReason::NoToken) => Err(RefreshError::NoActiveSession),
            SessionOutcome::Invalid(reason) => Err(RefreshError::InvalidSession(reason)),
        }
    }

    /// Remove the session from both tiers. Storage failures are logged, not returned.
    pub fn clear_session(&self) {
        match self.store.clear() {
            Ok(()) => debug!("Session cleared"),
            Err(e) => warn!(error = %e, "Failed to fully clear session"),
        }
    }

    /// Cached user for instant display. The token is not verified.
    pub fn get_session_user(&self) -> Option<Identity> {
        match self.store.read_user() {
            Ok(user) => user.map(Identity::from),
            Err(e) => {
                warn!(error = %e, "Session user unreadable");
                None
            }
        }
    }

    /// The stored token, unless its recorded expiry has passed
    pub fn session_token(&self) -> Option<String> {
        let record = match self.store.read() {
            Ok(record) => record?,
            Err(e) => {
                warn!(error = %e, "Session storage unreadable");
                return None;
            }
        };
        if record.is_expired_at(self.now()) {
            self.clear_session();
            return None;
        }
        Some(record.token)
    }

    pub fn is_session_active(&self) -> bool {
        self.validate_current_session().is_valid()
    }

    /// Time left on the current session, if it is valid
    pub fn remaining_ttl(&self) -> Option<Duration> {
        match self.validate_current_session() {
            SessionOutcome::Valid { expiry, .. } => {
                Some(Duration::milliseconds(expiry - self.now()))
            }
            SessionOutcome::Invalid(_) => None,
        }
    }

    /// Startup check: drop an expired session before anything relies on it
    pub fn initialize(&self) -> SessionOutcome {
        let outcome = self.validate_current_session();
        match &outcome {
            SessionOutcome::Valid { user_id, expiry, .. } => {
                debug!(%user_id, expiry, "Existing session is valid");
            }
            SessionOutcome::Invalid(InvalidReason::Expired) => {
                info!("Session expired, user needs to sign in again");
            }
            SessionOutcome::Invalid(reason) => {
                debug!(%reason, "No usable session at startup");
            }
        }
        outcome
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    use crate::clock::ManualClock;
    use crate::storage::{MemoryTier, StorageError, StorageTier, TierKind};

    const START: i64 = 1_700_000_000_000;

    fn ann() -> Identity {
        Identity::new("u1", "u1@example.com", "Ann")
    }

    fn manager_with_store(store: SessionStore) -> (SessionManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let key = SigningKey::from_bytes(vec![3u8; 32]).unwrap();
        let manager =
            SessionManager::from_config(&SessionConfig::default(), &key, store, clock.clone())
                .unwrap();
        (manager, clock)
    }

    fn manager() -> (SessionManager, Arc<ManualClock>) {
        manager_with_store(SessionStore::in_memory("test"))
    }

    struct QuotaExceededTier;

    /// Reads fail outright, like storage blocked by the browser.
    struct BlockedTier;

    impl StorageTier for BlockedTier {
        fn name(&self) -> &'static str {
            "durable"
        }

        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::unavailable(
                "durable",
                key,
                io::Error::new(io::ErrorKind::PermissionDenied, "storage blocked"),
            ))
        }

        fn set(&self, key: &str, _value: &str) -> Result<(), StorageError> {
            self.get(key).map(|_| ())
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.get(key).map(|_| ())
        }
    }

    impl StorageTier for QuotaExceededTier {
        fn name(&self) -> &'static str {
            "durable"
        }

        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Ok(None)
        }

        fn set(&self, key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::unavailable(
                "durable",
                key,
                io::Error::new(io::ErrorKind::Other, "quota exceeded"),
            ))
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[test]
    fn test_create_then_validate() {
        let (manager, _) = manager();
        let record = manager.create_session(&ann()).unwrap();
        assert_eq!(record.expiry, START + Duration::hours(24).num_milliseconds());

        match manager.validate_current_session() {
            SessionOutcome::Valid {
                user_id,
                email,
                user,
                issued_at,
                expiry,
            } => {
                assert_eq!(user_id, "u1");
                assert_eq!(email, "u1@example.com");
                assert_eq!(user.display_name, "Ann");
                assert_eq!(issued_at, START);
                assert_eq!(expiry, record.expiry);
            }
            other => panic!("expected valid session, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_without_session() {
        let (manager, _) = manager();
        assert_eq!(
            manager.validate_current_session(),
            SessionOutcome::Invalid(InvalidReason::NoToken)
        );
        assert!(!manager.is_session_active());
    }

    #[test]
    fn test_expiry_boundary() {
        let (manager, clock) = manager();
        manager.create_session(&ann()).unwrap();

        clock.advance(Duration::hours(24) - Duration::milliseconds(1));
        assert!(manager.validate_current_session().is_valid());

        clock.advance(Duration::milliseconds(2));
        assert_eq!(
            manager.validate_current_session(),
            SessionOutcome::Invalid(InvalidReason::Expired)
        );
        // Expired sessions are removed, not just reported
        assert_eq!(manager.store().read().unwrap(), None);
        assert_eq!(
            manager.validate_current_session(),
            SessionOutcome::Invalid(InvalidReason::NoToken)
        );
    }

    #[test]
    fn test_tampered_tag_is_invalid_and_cleared() {
        let (manager, _) = manager();
        let record = manager.create_session(&ann()).unwrap();

        let mut forged = record.token.clone();
        let last = forged.pop().unwrap();
        forged.push(if last == 'x' { 'y' } else { 'x' });
        for kind in [TierKind::Volatile, TierKind::Durable] {
            manager
                .store()
                .tier(kind)
                .set("test_session_token", &forged)
                .unwrap();
        }

        assert_eq!(
            manager.validate_current_session(),
            SessionOutcome::Invalid(InvalidReason::Tampered)
        );
        assert_eq!(manager.get_session_user(), None);
    }

    #[test]
    fn test_garbage_token_is_tampered() {
        let (manager, _) = manager();
        manager.create_session(&ann()).unwrap();
        manager
            .store()
            .tier(TierKind::Volatile)
            .set("test_session_token", "not-a-token")
            .unwrap();

        assert_eq!(
            manager.validate_current_session(),
            SessionOutcome::Invalid(InvalidReason::Tampered)
        );
    }

    #[test]
    fn test_stored_expiry_in_past_is_expired() {
        let (manager, _) = manager();
        manager.create_session(&ann()).unwrap();
        for kind in [TierKind::Volatile, TierKind::Durable] {
            manager
                .store()
                .tier(kind)
                .set("test_session_expiry", &(START - 1).to_string())
                .unwrap();
        }

        assert_eq!(
            manager.validate_current_session(),
            SessionOutcome::Invalid(InvalidReason::Expired)
        );
    }

    #[test]
    fn test_clear_session_is_idempotent() {
        let (manager, _) = manager();
        manager.create_session(&ann()).unwrap();

        manager.clear_session();
        assert_eq!(manager.store().read().unwrap(), None);
        manager.clear_session();
        assert_eq!(manager.store().read().unwrap(), None);
        assert_eq!(manager.get_session_user(), None);
    }

    #[test]
    fn test_refresh_extends_expiry() {
        let (manager, clock) = manager();
        let first = manager.create_session(&ann()).unwrap();

        clock.advance(Duration::hours(23) + Duration::minutes(30));
        let refreshed = manager.refresh_session().unwrap();

        assert!(refreshed.expiry > first.expiry);
        assert_ne!(refreshed.token, first.token);
        assert_eq!(refreshed.user, first.user);
        match manager.validate_current_session() {
            SessionOutcome::Valid { user_id, email, .. } => {
                assert_eq!(user_id, "u1");
                assert_eq!(email, "u1@example.com");
            }
            other => panic!("expected valid session, got {:?}", other),
        }
    }

    #[test]
    fn test_refresh_in_same_millisecond_still_moves_expiry() {
        let (manager, _) = manager();
        let first = manager.create_session(&ann()).unwrap();
        let refreshed = manager.refresh_session().unwrap();
        assert!(refreshed.expiry > first.expiry);
    }

    #[test]
    fn test_refresh_without_session() {
        let (manager, _) = manager();
        assert!(matches!(
            manager.refresh_session(),
            Err(RefreshError::NoActiveSession)
        ));
    }

    #[test]
    fn test_refresh_expired_session() {
        let (manager, clock) = manager();
        manager.create_session(&ann()).unwrap();
        clock.advance(Duration::hours(25));

        assert!(matches!(
            manager.refresh_session(),
            Err(RefreshError::InvalidSession(InvalidReason::Expired))
        ));
    }

    #[test]
    fn test_durable_tier_fallback() {
        let (manager, _) = manager();
        manager.create_session(&ann()).unwrap();

        // New tab: volatile tier starts empty
        manager.store().clear_tier(TierKind::Volatile).unwrap();

        assert!(manager.validate_current_session().is_valid());
        assert_eq!(manager.get_session_user(), Some(ann()));
    }

    #[test]
    fn test_get_session_user_skips_verification() {
        let (manager, _) = manager();
        manager.create_session(&ann()).unwrap();
        manager
            .store()
            .tier(TierKind::Volatile)
            .set("test_session_token", "garbage")
            .unwrap();

        assert_eq!(manager.get_session_user(), Some(ann()));
    }

    #[test]
    fn test_session_token_respects_stored_expiry() {
        let (manager, clock) = manager();
        let record = manager.create_session(&ann()).unwrap();
        assert_eq!(manager.session_token(), Some(record.token));

        clock.advance(Duration::hours(24) + Duration::seconds(1));
        assert_eq!(manager.session_token(), None);
        assert_eq!(manager.store().read().unwrap(), None);
    }

    #[test]
    fn test_remaining_ttl() {
        let (manager, clock) = manager();
        assert_eq!(manager.remaining_ttl(), None);

        manager.create_session(&ann()).unwrap();
        clock.advance(Duration::hours(20));
        assert_eq!(manager.remaining_ttl(), Some(Duration::hours(4)));
    }

    #[test]
    fn test_storage_unavailable_degrades() {
        let store = SessionStore::new(
            Box::new(MemoryTier::new()),
            Box::new(QuotaExceededTier),
            "test",
        );
        let (manager, _) = manager_with_store(store);

        let err = manager.create_session(&ann()).unwrap_err();
        assert!(matches!(err, SessionError::StorageUnavailable(_)));
        assert!(err.to_string().contains("quota exceeded"));

        // Nothing half-written is left behind to validate later
        assert_eq!(
            manager.validate_current_session(),
            SessionOutcome::Invalid(InvalidReason::NoToken)
        );
        assert_eq!(manager.get_session_user(), None);
    }

    #[test]
    fn test_unreadable_storage_is_invalid() {
        let store = SessionStore::new(Box::new(MemoryTier::new()), Box::new(BlockedTier), "test");
        let (manager, _) = manager_with_store(store);

        assert_eq!(
            manager.validate_current_session(),
            SessionOutcome::Invalid(InvalidReason::StorageUnavailable)
        );
        assert!(!manager.is_session_active());
        assert_eq!(manager.remaining_ttl(), None);
        assert!(matches!(
            manager.refresh_session(),
            Err(RefreshError::InvalidSession(InvalidReason::StorageUnavailable))
        ));
    }

    #[test]
    fn test_inflated_stored_expiry_is_tampered() {
        let (manager, clock) = manager();
        manager.create_session(&ann()).unwrap();
        let inflated = START + Duration::hours(100).num_milliseconds();
        for kind in [TierKind::Volatile, TierKind::Durable] {
            manager
                .store()
                .tier(kind)
                .set("test_session_expiry", &inflated.to_string())
                .unwrap();
        }

        clock.advance(Duration::hours(23) + Duration::minutes(30));
        assert_eq!(
            manager.validate_current_session(),
            SessionOutcome::Invalid(InvalidReason::Tampered)
        );
        assert_eq!(manager.store().read().unwrap(), None);
    }

    #[test]
    fn test_from_config_rejects_oversized_duration() {
        let config = SessionConfig {
            session_duration_secs: u64::MAX / 2,
            ..Default::default()
        };
        let key = SigningKey::from_bytes(vec![3u8; 32]).unwrap();
        let clock = Arc::new(ManualClock::new(START));
        assert!(SessionManager::from_config(&config, &key, SessionStore::in_memory("test"), clock)
            .is_err());
    }

    #[test]
    fn test_initialize_clears_expired_session() {
        let (manager, clock) = manager();
        manager.create_session(&ann()).unwrap();
        clock.advance(Duration::days(2));

        assert_eq!(
            manager.initialize(),
            SessionOutcome::Invalid(InvalidReason::Expired)
        );
        assert_eq!(manager.get_session_user(), None);
    }
}
