//! Background refresh of the live session.
//!
//! On every tick the scheduler validates the current session and refreshes it
//! once less than the refresh threshold remains. The task runs until its
//! `SchedulerHandle` is cancelled or dropped.

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{InvalidReason, RefreshError, SessionManager, SessionOutcome};
use crate::config::SessionConfig;
use crate::models::SessionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed,
}

#[derive(Debug)]
pub enum TickOutcome {
    Refreshed(SessionRecord),
    NotDue { remaining: Duration },
    NoSession(InvalidReason),
    Failed(RefreshError),
}

#[derive(Clone)]
pub struct AutoRefreshScheduler {
    manager: Arc<SessionManager>,
    interval: std::time::Duration,
    threshold: Duration,
}

impl AutoRefreshScheduler {
    pub fn new(
        manager: Arc<SessionManager>,
        interval: std::time::Duration,
        threshold: Duration,
    ) -> Self {
        Self {
            manager,
            interval,
            threshold,
        }
    }

    pub fn from_config(manager: Arc<SessionManager>, config: &SessionConfig) -> Self {
        Self::new(manager, config.refresh_interval(), config.refresh_threshold())
    }

    pub fn interval(&self) -> std::time::Duration {
        self.interval
    }

    /// Run one check, refreshing the session if it is close to expiry
    pub fn tick(&self) -> TickOutcome {
        let expiry = match self.manager.validate_current_session() {
            SessionOutcome::Valid { expiry, .. } => expiry,
            SessionOutcome::Invalid(reason) => return TickOutcome::NoSession(reason),
        };

        let remaining = Duration::milliseconds(expiry - self.manager.clock().now_millis());
        if remaining <= Duration::zero() || remaining >= self.threshold {
            return TickOutcome::NotDue { remaining };
        }

        match self.manager.refresh_session() {
            Ok(record) => TickOutcome::Refreshed(record),
            Err(e) => TickOutcome::Failed(e),
        }
    }

    /// Arm the periodic task. The first tick happens one interval from now.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let interval = self.interval;
        info!(interval_secs = interval.as_secs(), "Session auto-refresh armed");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => log_tick(&self.tick()),
                }
            }
            debug!("Session auto-refresh stopped");
        });

        SchedulerHandle {
            shutdown_tx,
            task: Some(task),
        }
    }
}

fn log_tick(outcome: &TickOutcome) {
    match outcome {
        TickOutcome::Refreshed(record) => {
            info!(user_id = %record.user.uid, expiry = record.expiry, "Session auto-refreshed");
        }
        TickOutcome::NotDue { remaining } => {
            debug!(remaining_mins = remaining.num_minutes(), "Session refresh not due");
        }
        TickOutcome::NoSession(reason) => debug!(%reason, "No session to refresh"),
        TickOutcome::Failed(e) => warn!(error = %e, "Session auto-refresh failed"),
    }
}

/// Owns the running refresh task. Dropping the handle aborts the task.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn state(&self) -> SchedulerState {
        match &self.task {
            Some(task) if !task.is_finished() => SchedulerState::Armed,
            _ => SchedulerState::Idle,
        }
    }

    /// Stop the task and wait for it to exit
    pub async fn cancel(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Session auto-refresh task failed");
                }
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SigningKey;
    use crate::clock::ManualClock;
    use crate::models::Identity;
    use crate::storage::{SessionStore, TierKind};

    const START: i64 = 1_700_000_000_000;

    fn setup() -> (Arc<SessionManager>, Arc<ManualClock>, AutoRefreshScheduler) {
        let clock = Arc::new(ManualClock::new(START));
        let key = SigningKey::from_bytes(vec![9u8; 32]).unwrap();
        let config = SessionConfig::default();
        let manager = Arc::new(
            SessionManager::from_config(&config, &key, SessionStore::in_memory("test"), clock.clone())
                .unwrap(),
        );
        let scheduler = AutoRefreshScheduler::from_config(manager.clone(), &config);
        (manager, clock, scheduler)
    }

    fn ann() -> Identity {
        Identity::new("u1", "u1@example.com", "Ann")
    }

    #[test]
    fn test_tick_without_session() {
        let (_, _, scheduler) = setup();
        assert!(matches!(
            scheduler.tick(),
            TickOutcome::NoSession(InvalidReason::NoToken)
        ));
    }

    #[test]
    fn test_tick_not_due_on_fresh_session() {
        let (manager, _, scheduler) = setup();
        let record = manager.create_session(&ann()).unwrap();

        match scheduler.tick() {
            TickOutcome::NotDue { remaining } => assert_eq!(remaining, Duration::hours(24)),
            other => panic!("expected NotDue, got {:?}", other),
        }
        assert_eq!(manager.store().read().unwrap().unwrap(), record);
    }

    #[test]
    fn test_tick_at_threshold_is_not_due() {
        let (manager, clock, scheduler) = setup();
        manager.create_session(&ann()).unwrap();
        clock.advance(Duration::hours(23));

        assert!(matches!(scheduler.tick(), TickOutcome::NotDue { .. }));
    }

    #[test]
    fn test_tick_refreshes_inside_threshold() {
        let (manager, clock, scheduler) = setup();
        let first = manager.create_session(&ann()).unwrap();
        clock.advance(Duration::hours(23) + Duration::minutes(1));

        match scheduler.tick() {
            TickOutcome::Refreshed(record) => {
                assert!(record.expiry > first.expiry);
                assert_eq!(record.user, first.user);
            }
            other => panic!("expected Refreshed, got {:?}", other),
        }
    }

    #[test]
    fn test_tick_after_expiry_clears() {
        let (manager, clock, scheduler) = setup();
        manager.create_session(&ann()).unwrap();
        clock.advance(Duration::hours(25));

        assert!(matches!(
            scheduler.tick(),
            TickOutcome::NoSession(InvalidReason::Expired)
        ));
        assert_eq!(manager.store().read().unwrap(), None);
    }

    #[test]
    fn test_tick_rejects_inflated_stored_expiry() {
        let (manager, clock, scheduler) = setup();
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

        assert!(matches!(
            scheduler.tick(),
            TickOutcome::NoSession(InvalidReason::Tampered)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_background_refresh() {
        let (manager, clock, scheduler) = setup();
        let first = manager.create_session(&ann()).unwrap();

        match manager.validate_current_session() {
            SessionOutcome::Valid { user_id, email, .. } => {
                assert_eq!(user_id, "u1");
                assert_eq!(email, "u1@example.com");
            }
            other => panic!("expected valid session, got {:?}", other),
        }

        let interval = scheduler.interval();
        let mut handle = scheduler.start();
        assert_eq!(handle.state(), SchedulerState::Armed);

        // Past the refresh threshold before the first tick fires
        clock.advance(Duration::hours(23) + Duration::minutes(15));
        tokio::time::sleep(interval + std::time::Duration::from_secs(1)).await;

        match manager.validate_current_session() {
            SessionOutcome::Valid {
                user_id,
                email,
                user,
                expiry,
                ..
            } => {
                assert_eq!(user_id, "u1");
                assert_eq!(email, "u1@example.com");
                assert_eq!(user.display_name, "Ann");
                assert!(expiry > first.expiry);
            }
            other => panic!("expected valid session, got {:?}", other),
        }

        handle.cancel().await;
        assert_eq!(handle.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_scheduler_stops_refreshing() {
        let (manager, clock, scheduler) = setup();
        let first = manager.create_session(&ann()).unwrap();
        let interval = scheduler.interval();

        let mut handle = scheduler.start();
        handle.cancel().await;

        clock.advance(Duration::hours(23) + Duration::minutes(15));
        tokio::time::sleep(interval * 2).await;

        assert_eq!(manager.store().read().unwrap().unwrap().expiry, first.expiry);
    }
}
