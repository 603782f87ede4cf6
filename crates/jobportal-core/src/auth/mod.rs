//! Authentication module for sessions and client auth state.
//!
//! This module provides:
//! - `SessionStore`: HMAC-signed, httponly session cookie (create/read/clear)
//! - `CookieJar`: cookie storage, in memory or scoped to one HTTP request
//! - `AuthRuntimeState`: in-memory access token and user for the API client
//! - `AuthActions`: login/logout actions over a `UserDirectory`
//!
//! Session cookies expire after 7 days.

pub mod actions;
pub mod cookie;
pub mod error;
pub mod session;
pub mod signing;
pub mod state;

pub use actions::{AuthActions, DemoDirectory, UserDirectory};
pub use cookie::{parse_cookie_header, Cookie, CookieJar, MemoryCookieJar, RequestCookies, SameSite};
pub use error::{AuthError, SessionError};
pub use session::{SessionStore, SESSION_COOKIE_NAME, SESSION_MAX_AGE_SECS};
pub use signing::SessionSigner;
pub use state::{AuthRuntimeState, AuthSnapshot};
