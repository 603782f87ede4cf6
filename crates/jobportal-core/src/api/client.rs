//! API client for the job-portal backend.
//!
//! All data calls go through the `TokenRefreshGate`, so an expired access
//! token is refreshed transparently. Login and logout talk to the
//! transport directly: a 401 from the login endpoint means bad
//! credentials, not an expired token.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::{AuthError, AuthRuntimeState};
use crate::config::Config;
use crate::models::{Credentials, Session, UserProfile};

use super::gate::TokenRefreshGate;
use super::transport::{
    ApiRequest, HttpTokenExchange, HttpTransport, LoginRedirect, Method, TokenExchange, Transport,
};
use super::ApiError;

/// Login exchange endpoint
const LOGIN_PATH: &str = "/auth/login";

/// Logout endpoint
const LOGOUT_PATH: &str = "/auth/logout";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
    #[serde(rename = "refreshToken")]
    refresh_token: Option<String>,
    user: Option<UserProfile>,
}

/// Typed API client.
/// Clone is cheap - clones share the gate, its queue and the auth state.
#[derive(Clone)]
pub struct ApiClient {
    gate: TokenRefreshGate,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        exchange: Arc<dyn TokenExchange>,
        redirect: Arc<dyn LoginRedirect>,
        state: Arc<AuthRuntimeState>,
    ) -> Self {
        Self {
            gate: TokenRefreshGate::new(transport, exchange, redirect, state),
        }
    }

    /// Create a client for the configured backend using `reqwest`.
    ///
    /// `redirect` performs the navigation to the login page when a refresh
    /// fails; hosts without a page to leave can pass `LogRedirect`.
    pub fn from_config(config: &Config, redirect: Arc<dyn LoginRedirect>) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(config.api_url(), config.request_timeout_secs())?;
        let exchange = HttpTokenExchange::new(transport.clone());
        Ok(Self::new(
            Arc::new(transport),
            Arc::new(exchange),
            redirect,
            Arc::new(AuthRuntimeState::new()),
        ))
    }

    pub fn gate(&self) -> &TokenRefreshGate {
        &self.gate
    }

    pub fn state(&self) -> &Arc<AuthRuntimeState> {
        self.gate.state()
    }

    /// Restore runtime auth state from a verified cookie session.
    ///
    /// A session carrying an auth key becomes the current login; without
    /// one (or without a session) the state stays unauthenticated. Either
    /// way the state is marked hydrated.
    pub fn hydrate(&self, session: Option<&Session>) {
        match session {
            Some(session) => match session.auth_key.as_deref() {
                Some(key) if !key.is_empty() => {
                    debug!(user_id = %session.id, "Restoring auth state from session");
                    self.state().login_success(key.to_string(), session.profile());
                }
                _ => debug!(user_id = %session.id, "Session has no auth key, staying signed out"),
            },
            None => debug!("No session to restore"),
        }
        self.state().mark_hydrated();
    }

    /// Exchange credentials for tokens and return the session to store.
    ///
    /// The returned session carries the access token as its `auth_key`.
    pub async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let body = serde_json::to_value(credentials)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        let result = self.gate.transport().send(ApiRequest::post(LOGIN_PATH, body)).await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.state().login_failure(e.to_string());
                return Err(e.into());
            }
        };

        if !response.is_success() {
            let err = ApiError::from_status(response.status, &response.body);
            warn!(email = %credentials.email, status = response.status, "Login request failed");
            self.state().login_failure(err.to_string());
            return Err(if err.is_unauthorized() {
                AuthError::InvalidCredentials
            } else {
                err.into()
            });
        }

        let parsed: LoginResponse = match response.json() {
            Ok(parsed) => parsed,
            Err(e) => {
                self.state().login_failure(e.to_string());
                return Err(e.into());
            }
        };

        match parsed {
            LoginResponse {
                token: Some(token),
                refresh_token: Some(_),
                user: Some(user),
            } if !token.is_empty() => {
                info!(user_id = %user.id, role = %user.role, "Logged in");
                let session = user.to_session(Some(token.clone()));
                self.state().login_success(token, user);
                Ok(session)
            }
            _ => {
                let reason = "login response missing token, refresh token or user";
                warn!(email = %credentials.email, "{}", reason);
                self.state().login_failure(reason);
                Err(AuthError::LoginRejected(reason.to_string()))
            }
        }
    }

    /// Tell the backend the session is over. Local auth state is cleared
    /// whether or not the backend call succeeds.
    pub async fn logout(&self, auth_key: Option<&str>) -> Result<(), ApiError> {
        let token = auth_key
            .map(str::to_string)
            .or_else(|| self.state().access_token());

        let mut request = ApiRequest {
            method: Method::Post,
            path: LOGOUT_PATH.to_string(),
            body: None,
            bearer: None,
        };
        if let Some(token) = token {
            request = request.with_bearer(token);
        }

        let result = self.gate.transport().send(request).await;
        self.state().logout();

        let response = result?;
        if response.is_success() {
            debug!("Logged out");
            Ok(())
        } else {
            Err(ApiError::from_status(response.status, &response.body))
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.gate.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to serialize request body: {}", e)))?;
        self.gate.send(ApiRequest::post(path, body)).await?.json()
    }

    /// DELETE a resource, ignoring any response body.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let request = ApiRequest {
            method: Method::Delete,
            path: path.to_string(),
            body: None,
            bearer: None,
        };
        self.gate.send(request).await?;
        Ok(())
    }
}
