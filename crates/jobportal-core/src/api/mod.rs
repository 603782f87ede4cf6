//! REST API client module for the job-portal backend.
//!
//! This module provides the `ApiClient` for calling the backend and the
//! `TokenRefreshGate` underneath it, which attaches the short-lived access
//! token to each call and runs a single shared refresh exchange when the
//! backend answers 401.

pub mod client;
pub mod error;
pub mod gate;
pub mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use gate::TokenRefreshGate;
pub use transport::{
    ApiRequest, ApiResponse, HttpTokenExchange, HttpTransport, LogRedirect, LoginRedirect, Method,
    TokenExchange, Transport, LOGIN_PAGE, REFRESH_PATH,
};
