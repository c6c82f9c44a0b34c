//! Keeping the local session in step with the identity provider.
//!
//! The provider publishes its state on a `watch` channel. It starts as
//! `AuthState::Initializing` and moves to `SignedIn`/`SignedOut` once ready,
//! so consumers await readiness instead of polling for it.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{SessionError, SessionManager};
use crate::models::{Identity, SessionRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Initializing,
    SignedIn(Identity),
    SignedOut,
}

impl AuthState {
    pub fn is_ready(&self) -> bool {
        !matches!(self, AuthState::Initializing)
    }

    pub fn user(&self) -> Option<&Identity> {
        match self {
            AuthState::SignedIn(identity) => Some(identity),
            _ => None,
        }
    }
}

/// The remote identity provider, seen from the session layer.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<Identity>;

    fn subscribe(&self) -> watch::Receiver<AuthState>;
}

#[derive(Debug)]
pub enum SyncAction {
    /// Provider not ready yet
    Ignored,
    SessionKept,
    SessionCreated(SessionRecord),
    SessionCleared,
    Failed(SessionError),
}

pub struct AuthStateSync {
    manager: Arc<SessionManager>,
}

impl AuthStateSync {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    /// React to one provider state
    pub fn apply(&self, state: &AuthState) -> SyncAction {
        match state {
            AuthState::Initializing => SyncAction::Ignored,
            AuthState::SignedIn(identity) => {
                if self.manager.validate_current_session().is_valid() {
                    return SyncAction::SessionKept;
                }
                match self.manager.create_session(identity) {
                    Ok(record) => SyncAction::SessionCreated(record),
                    Err(e) => SyncAction::Failed(e),
                }
            }
            AuthState::SignedOut => {
                self.manager.clear_session();
                SyncAction::SessionCleared
            }
        }
    }

    /// Wait until the provider has finished initializing.
    ///
    /// Returns `None` if the provider went away first.
    pub async fn wait_until_ready(rx: &mut watch::Receiver<AuthState>) -> Option<AuthState> {
        match rx.wait_for(AuthState::is_ready).await {
            Ok(state) => Some(state.clone()),
            Err(_) => None,
        }
    }

    /// Follow the provider until its sender is dropped or the task is aborted
    pub fn spawn(self, mut rx: watch::Receiver<AuthState>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let state = rx.borrow_and_update().clone();
                match self.apply(&state) {
                    SyncAction::Ignored => debug!("Identity provider still initializing"),
                    SyncAction::SessionKept => debug!("Existing session kept"),
                    SyncAction::SessionCreated(record) => {
                        info!(user_id = %record.user.uid, "Session created from provider sign-in");
                    }
                    SyncAction::SessionCleared => info!("Session cleared after provider sign-out"),
                    SyncAction::Failed(e) => warn!(error = %e, "Could not create session"),
                }
                if rx.changed().await.is_err() {
                    debug!("Identity provider closed");
                    break;
                }
            }
        })
    }
}
