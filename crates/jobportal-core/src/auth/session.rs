use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::Session;

use super::{Cookie, CookieJar, SameSite, SessionError, SessionSigner};

/// Session cookie name
pub const SESSION_COOKIE_NAME: &str = "jp_session";

/// Session lifetime in seconds (7 days).
pub const SESSION_MAX_AGE_SECS: i64 = 7 * 24 * 60 * 60;

/// Signed-cookie session storage over a cookie jar.
///
/// Cookie value: `base64url(json(session)) + "." + hex(hmac_sha256(secret, base64url(json(session))))`.
/// Reads always go to the jar; nothing is cached between calls.
pub struct SessionStore<J> {
    jar: J,
    signer: SessionSigner,
    secure: bool,
}

impl<J: CookieJar> SessionStore<J> {
    pub fn new(jar: J, signer: SessionSigner, secure: bool) -> Self {
        Self { jar, signer, secure }
    }

    /// Build a store using the configured secret and cookie security.
    pub fn from_config(jar: J, config: &Config) -> Self {
        Self::new(
            jar,
            SessionSigner::new(config.session_secret()),
            config.is_production(),
        )
    }

    pub fn jar(&self) -> &J {
        &self.jar
    }

    /// Sign and store the session, replacing any existing session cookie.
    pub fn create_session(&self, session: &Session) -> Result<(), SessionError> {
        let json = serde_json::to_vec(session)?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let value = self.signer.sign(&payload);

        self.jar.set(Cookie {
            name: SESSION_COOKIE_NAME.to_string(),
            value,
            path: "/".to_string(),
            max_age_secs: SESSION_MAX_AGE_SECS,
            http_only: true,
            secure: self.secure,
            same_site: SameSite::Lax,
        })?;

        debug!(user_id = %session.id, role = %session.role, "Session created");
        Ok(())
    }

    /// Read and verify the session cookie.
    ///
    /// Returns `None` when the cookie is missing, the signature does not
    /// verify, or the payload does not decode to a complete session.
    pub fn read_session(&self) -> Option<Session> {
        let value = match self.jar.get(SESSION_COOKIE_NAME) {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read session cookie");
                return None;
            }
        };

        let Some(payload) = self.signer.verify(&value) else {
            warn!("Session cookie failed signature check");
            return None;
        };

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        match serde_json::from_slice::<Session>(&json) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "Signed session payload did not decode");
                None
            }
        }
    }

    /// Delete the session cookie. Idempotent.
    pub fn clear_session(&self) -> Result<(), SessionError> {
        self.jar.remove(SESSION_COOKIE_NAME, self.secure)?;
        debug!("Session cleared");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
