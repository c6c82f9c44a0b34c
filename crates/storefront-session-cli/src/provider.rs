//! Stand-in identity provider for the command line.
//!
//! The real provider verifies credentials remotely. Here the user named on
//! the command line is taken as signed in, which is enough to drive the
//! session layer end to end.

use storefront_session_core::{AuthState, Identity, IdentityProvider};
use tokio::sync::watch;

pub struct LocalProvider {
    tx: watch::Sender<AuthState>,
}

impl LocalProvider {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AuthState::Initializing);
        Self { tx }
    }

    pub fn sign_in(&self, identity: Identity) {
        self.tx.send_replace(AuthState::SignedIn(identity));
    }

    pub fn sign_out(&self) {
        self.tx.send_replace(AuthState::SignedOut);
    }
}

impl IdentityProvider for LocalProvider {
    fn current_user(&self) -> Option<Identity> {
        self.tx.borrow().user().cloned()
    }

    fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }
}
