//! Session and authentication core for the job portal.
//!
//! - [`auth`]: signed session cookies, cookie jars, client auth state,
//!   login/logout actions
//! - [`api`]: backend client with single-flight access token refresh
//! - [`config`]: configuration from file and environment
//! - [`models`]: session and user types

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, TokenRefreshGate};
pub use auth::{AuthActions, AuthRuntimeState, SessionStore};
pub use config::Config;
pub use models::{Credentials, Role, Session, UserProfile};
