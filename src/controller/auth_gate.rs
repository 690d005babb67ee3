//! Session state for gating views on sign-in.

use tokio::sync::watch;

use crate::auth::{Session, User};
use crate::error::{RowlensError, RowlensResult};

#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub user: Option<User>,
    pub session: Option<Session>,
    /// True until the first session value has been read.
    pub loading: bool,
}

/// Follows an auth client's session stream.
pub struct AuthGate {
    receiver: watch::Receiver<Option<Session>>,
    state: AuthState,
}

impl AuthGate {
    pub fn new(receiver: watch::Receiver<Option<Session>>) -> Self {
        Self {
            receiver,
            state: AuthState {
                user: None,
                session: None,
                loading: true,
            },
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.user.is_some()
    }

    /// Read the current session without waiting.
    pub fn sync(&mut self) -> &AuthState {
        let session = self.receiver.borrow_and_update().clone();
        self.apply(session);
        &self.state
    }

    /// Wait for the next sign-in or sign-out.
    pub async fn changed(&mut self) -> RowlensResult<&AuthState> {
        self.receiver
            .changed()
            .await
            .map_err(|_| RowlensError::Auth("auth client dropped".to_string()))?;
        Ok(self.sync())
    }

    fn apply(&mut self, session: Option<Session>) {
        self.state.user = session.as_ref().and_then(|s| s.user.clone());
        self.state.session = session;
        self.state.loading = false;
    }
}
