use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::models::UserProfile;

/// Client-side authentication state at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub access_token: Option<String>,
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub is_hydrated: bool,
    pub error: Option<String>,
}

impl AuthSnapshot {
    fn initial() -> Self {
        Self {
            access_token: None,
            user: None,
            is_authenticated: false,
            is_loading: true,
            is_hydrated: false,
            error: None,
        }
    }
}

/// In-memory auth state shared by the API client and its callers.
///
/// Writes happen only through the four transitions below, each of which
/// replaces the credential fields under a single write lock. Create one
/// instance per client; nothing here is global.
#[derive(Debug)]
pub struct AuthRuntimeState {
    inner: RwLock<AuthSnapshot>,
}

impl Default for AuthRuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthRuntimeState {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(AuthSnapshot::initial()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AuthSnapshot> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, AuthSnapshot> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.read().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_authenticated
    }

    pub fn login_success(&self, access_token: String, user: UserProfile) {
        let mut state = self.write();
        debug!(user_id = %user.id, "Auth state: login success");
        state.access_token = Some(access_token);
        state.user = Some(user);
        state.is_authenticated = true;
        state.is_loading = false;
        state.error = None;
    }

    pub fn login_failure(&self, error: impl Into<String>) {
        let mut state = self.write();
        debug!("Auth state: login failure");
        state.access_token = None;
        state.user = None;
        state.is_authenticated = false;
        state.is_loading = false;
        state.error = Some(error.into());
    }

    /// Swap in a refreshed access token. Authentication still requires a
    /// known user.
    pub fn token_refreshed(&self, access_token: String) {
        let mut state = self.write();
        debug!("Auth state: token refreshed");
        state.is_authenticated = state.user.is_some();
        state.access_token = Some(access_token);
        state.is_loading = false;
        state.error = None;
    }

    pub fn logout(&self) {
        let mut state = self.write();
        debug!("Auth state: logout");
        state.access_token = None;
        state.user = None;
        state.is_authenticated = false;
        state.is_loading = false;
        state.error = None;
    }

    /// Record that persisted client state has been restored. Credentials
    /// are left untouched.
    pub fn mark_hydrated(&self) {
        let mut state = self.write();
        state.is_hydrated = true;
        state.is_loading = false;
    }
}
