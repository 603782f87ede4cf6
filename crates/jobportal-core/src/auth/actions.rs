//! Server-side login/logout actions backed by the session store.

use tracing::{info, warn};

use crate::models::{Credentials, Role, Session};

use super::{AuthError, CookieJar, SessionStore};

/// Password shared by the demo accounts
const DEMO_PASSWORD: &str = "password";

/// Source of truth for account credentials.
pub trait UserDirectory: Send + Sync {
    /// Return the session for valid credentials, `None` otherwise.
    fn authenticate(&self, credentials: &Credentials) -> Option<Session>;
}

struct DemoAccount {
    id: &'static str,
    name: &'static str,
    email: &'static str,
    role: Role,
}

const DEMO_ACCOUNTS: &[DemoAccount] = &[
    DemoAccount {
        id: "u1",
        name: "John Seeker",
        email: "john@example.com",
        role: Role::Worker,
    },
    DemoAccount {
        id: "u2",
        name: "Aisha Dev",
        email: "aisha@example.com",
        role: Role::Recruiter,
    },
];

/// Fixed demo accounts used in development.
#[derive(Debug, Default, Clone, Copy)]
pub struct DemoDirectory;

impl UserDirectory for DemoDirectory {
    fn authenticate(&self, credentials: &Credentials) -> Option<Session> {
        if credentials.password != DEMO_PASSWORD {
            return None;
        }
        DEMO_ACCOUNTS
            .iter()
            .find(|a| a.email.eq_ignore_ascii_case(credentials.email.trim()))
            .map(|a| Session::new(a.id, a.name, a.email, a.role))
    }
}

pub struct AuthActions<D, J> {
    directory: D,
    store: SessionStore<J>,
}

impl<D: UserDirectory, J: CookieJar> AuthActions<D, J> {
    pub fn new(directory: D, store: SessionStore<J>) -> Self {
        Self { directory, store }
    }

    pub fn store(&self) -> &SessionStore<J> {
        &self.store
    }

    /// Check credentials and start a session.
    pub fn login(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let Some(session) = self.directory.authenticate(credentials) else {
            warn!(email = %credentials.email, "Login failed");
            return Err(AuthError::InvalidCredentials);
        };
        self.store.create_session(&session)?;
        info!(user_id = %session.id, role = %session.role, "User logged in");
        Ok(session)
    }

    pub fn logout(&self) -> Result<(), AuthError> {
        self.store.clear_session()?;
        Ok(())
    }

    pub fn current_user(&self) -> Option<Session> {
        self.store.read_session()
    }
}
