//! Access-token attachment and single-flight token refresh.
//!
//! Every call goes out with the current access token. A call answered with
//! 401 joins the refresh queue; the first one to join also starts the
//! refresh exchange. When the exchange settles, queued calls are released
//! in the order they joined: each is re-sent once with the new token, or
//! all fail together and the client is sent back to the login page.
//!
//! A call that is still unauthorized after its retry fails with
//! `ApiError::Unauthorized` and does not trigger another exchange.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::auth::AuthRuntimeState;

use super::transport::{ApiRequest, ApiResponse, LoginRedirect, TokenExchange, Transport};
use super::ApiError;

type Waiter = oneshot::Sender<Result<String, ApiError>>;

/// The in-flight flag and its waiters. Always locked together and never
/// held across an await point.
#[derive(Default)]
struct RefreshQueue {
    in_flight: bool,
    waiters: VecDeque<Waiter>,
}

/// Everything the detached refresh task needs.
struct Shared {
    transport: Arc<dyn Transport>,
    exchange: Arc<dyn TokenExchange>,
    redirect: Arc<dyn LoginRedirect>,
    state: Arc<AuthRuntimeState>,
    queue: Mutex<RefreshQueue>,
}

impl Shared {
    fn lock_queue(&self) -> MutexGuard<'_, RefreshQueue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Resolve or reject every waiter in join order and reset the queue.
    fn settle(&self, result: Result<String, ApiError>) {
        if let Ok(ref token) = result {
            self.state.token_refreshed(token.clone());
        }

        let waiters = {
            let mut queue = self.lock_queue();
            queue.in_flight = false;
            std::mem::take(&mut queue.waiters)
        };

        match result {
            Ok(token) => {
                info!(waiters = waiters.len(), "Access token refreshed, replaying queued requests");
                for waiter in waiters {
                    // A waiter whose caller went away is simply skipped
                    let _ = waiter.send(Ok(token.clone()));
                }
            }
            Err(e) => {
                warn!(error = %e, waiters = waiters.len(), "Token refresh failed");
                self.redirect.redirect_to_login();
                let message = e.to_string();
                for waiter in waiters {
                    let _ = waiter.send(Err(ApiError::RefreshFailed(message.clone())));
                }
            }
        }
    }
}

/// Wraps a `Transport` with bearer attachment and refresh coordination.
/// Clone is cheap and clones share the same queue and auth state.
#[derive(Clone)]
pub struct TokenRefreshGate {
    shared: Arc<Shared>,
}

impl TokenRefreshGate {
    pub fn new(
        transport: Arc<dyn Transport>,
        exchange: Arc<dyn TokenExchange>,
        redirect: Arc<dyn LoginRedirect>,
        state: Arc<AuthRuntimeState>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                exchange,
                redirect,
                state,
                queue: Mutex::new(RefreshQueue::default()),
            }),
        }
    }

    pub fn state(&self) -> &Arc<AuthRuntimeState> {
        &self.shared.state
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.shared.transport
    }

    /// Number of calls waiting on the current refresh exchange.
    pub fn pending_requests(&self) -> usize {
        self.shared.lock_queue().waiters.len()
    }

    pub fn is_refreshing(&self) -> bool {
        self.shared.lock_queue().in_flight
    }

    /// Send a request, refreshing the access token at most once if the
    /// backend answers 401.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let token = self.shared.state.access_token();
        let response = self.dispatch(request.clone(), token).await?;
        if !response.is_unauthorized() {
            return Self::check_response(response);
        }

        debug!(path = %request.path, "Request unauthorized, waiting for token refresh");
        let token = self.wait_for_refresh().await?;

        let response = self.dispatch(request.clone(), Some(token)).await?;
        if response.is_unauthorized() {
            warn!(path = %request.path, "Request still unauthorized after token refresh");
            return Err(ApiError::Unauthorized);
        }
        Self::check_response(response)
    }

    async fn dispatch(&self, mut request: ApiRequest, token: Option<String>) -> Result<ApiResponse, ApiError> {
        request.bearer = token;
        self.shared.transport.send(request).await
    }

    /// Non-2xx responses other than 401 become errors without a refresh.
    fn check_response(response: ApiResponse) -> Result<ApiResponse, ApiError> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(ApiError::from_status(response.status, &response.body))
        }
    }

    /// Join the refresh queue, starting the exchange if none is running.
    async fn wait_for_refresh(&self) -> Result<String, ApiError> {
        let (tx, rx) = oneshot::channel();
        let start = {
            let mut queue = self.shared.lock_queue();
            queue.waiters.push_back(tx);
            !std::mem::replace(&mut queue.in_flight, true)
        };

        if start {
            debug!("Starting token refresh exchange");
            // Detached so the exchange completes even if this caller is dropped
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                let result = shared.exchange.refresh().await;
                shared.settle(result);
            });
        }

        rx.await
            .map_err(|_| ApiError::RefreshFailed("refresh task ended without a result".to_string()))?
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use crate::models::{Role, UserProfile};

    const FRESH_TOKEN: &str = "fresh-token";

    /// Accepts only `FRESH_TOKEN`, except for paths that are always
    /// unauthorized or always fail.
    #[derive(Default)]
    struct MockTransport {
        log: Mutex<Vec<(String, Option<String>)>>,
    }

    impl MockTransport {
        fn retries(&self) -> Vec<String> {
            self.log
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, bearer)| bearer.as_deref() == Some(FRESH_TOKEN))
                .map(|(path, _)| path.clone())
                .collect()
        }

        fn calls(&self) -> usize {
            self.log.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
            self.log
                .lock()
                .unwrap()
                .push((request.path.clone(), request.bearer.clone()));
            match request.path.as_str() {
                "/offline" => Err(ApiError::NetworkError("connection refused".to_string())),
                "/broken" => Ok(ApiResponse::new(500, "boom")),
                "/always-401" => Ok(ApiResponse::new(401, "")),
                path if request.bearer.as_deref() == Some(FRESH_TOKEN) => {
                    Ok(ApiResponse::new(200, format!("ok {}", path)))
                }
                _ => Ok(ApiResponse::new(401, "")),
            }
        }
    }

    /// Blocks until the test releases it, then succeeds or fails.
    struct MockExchange {
        calls: AtomicUsize,
        release: Semaphore,
        fail: bool,
    }

    impl MockExchange {
        fn new(fail: bool, released: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                release: Semaphore::new(if released { Semaphore::MAX_PERMITS } else { 0 }),
                fail,
            }
        }

        fn release(&self) {
            self.release.add_permits(Semaphore::MAX_PERMITS);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenExchange for MockExchange {
        async fn refresh(&self) -> Result<String, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let permit = self.release.acquire().await.unwrap();
            drop(permit);
            if self.fail {
                Err(ApiError::Unauthorized)
            } else {
                Ok(FRESH_TOKEN.to_string())
            }
        }
    }

    #[derive(Default)]
    struct CountingRedirect(AtomicUsize);

    impl LoginRedirect for CountingRedirect {
        fn redirect_to_login(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        gate: TokenRefreshGate,
        transport: Arc<MockTransport>,
        exchange: Arc<MockExchange>,
        redirect: Arc<CountingRedirect>,
    }

    fn harness(fail: bool, released: bool) -> Harness {
        let transport = Arc::new(MockTransport::default());
        let exchange = Arc::new(MockExchange::new(fail, released));
        let redirect = Arc::new(CountingRedirect::default());
        let state = Arc::new(AuthRuntimeState::new());
        state.login_success(
            "stale-token".to_string(),
            UserProfile {
                id: "u1".to_string(),
                name: "John Seeker".to_string(),
                email: "john@example.com".to_string(),
                role: Role::Worker,
            },
        );
        let gate = TokenRefreshGate::new(transport.clone(), exchange.clone(), redirect.clone(), state);
        Harness {
            gate,
            transport,
            exchange,
            redirect,
        }
    }

    async fn wait_for_pending(gate: &TokenRefreshGate, n: usize) {
        while gate.pending_requests() < n {
            tokio::task::yield_now().await;
        }
    }

    fn spawn_get(gate: &TokenRefreshGate, path: &str) -> tokio::task::JoinHandle<Result<ApiResponse, ApiError>> {
        let gate = gate.clone();
        let request = ApiRequest::get(path);
        tokio::spawn(async move { gate.send(request).await })
    }

    // -------------------------------------------------------------------------
    // Single calls
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_attaches_current_token() {
        let h = harness(false, true);
        h.gate.state().token_refreshed(FRESH_TOKEN.to_string());

        let response = h.gate.send(ApiRequest::get("/jobs")).await.unwrap();
        assert_eq!(response.body, "ok /jobs");
        assert_eq!(h.exchange.calls(), 0);
        assert_eq!(h.transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_single_call_refreshes_and_retries() {
        let h = harness(false, true);

        let response = h.gate.send(ApiRequest::get("/dashboard")).await.unwrap();
        assert_eq!(response.body, "ok /dashboard");
        assert_eq!(h.exchange.calls(), 1);
        assert_eq!(h.gate.state().access_token().as_deref(), Some(FRESH_TOKEN));
        assert!(h.gate.state().is_authenticated());
        assert!(!h.gate.is_refreshing());
        assert_eq!(h.gate.pending_requests(), 0);
    }

    // -------------------------------------------------------------------------
    // Concurrent calls
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_concurrent_failures_share_one_refresh() {
        let h = harness(false, false);

        let handles: Vec<_> = (0..5)
            .map(|i| spawn_get(&h.gate, &format!("/jobs/{}", i)))
            .collect();
        wait_for_pending(&h.gate, 5).await;
        assert!(h.gate.is_refreshing());

        h.exchange.release();
        let results = futures::future::join_all(handles).await;
        for (i, result) in results.into_iter().enumerate() {
            let response = result.unwrap().unwrap();
            assert_eq!(response.body, format!("ok /jobs/{}", i));
        }
        assert_eq!(h.exchange.calls(), 1);
        assert_eq!(h.redirect.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_queued_calls_replay_in_order() {
        let h = harness(false, false);

        let mut handles = Vec::new();
        for (n, path) in ["/trigger", "/a", "/b", "/c"].iter().enumerate() {
            handles.push(spawn_get(&h.gate, path));
            wait_for_pending(&h.gate, n + 1).await;
        }

        h.exchange.release();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(h.transport.retries(), vec!["/trigger", "/a", "/b", "/c"]);
    }

    #[tokio::test]
    async fn test_refresh_failure_rejects_everyone_and_redirects_once() {
        let h = harness(true, false);

        let handles: Vec<_> = (0..4).map(|i| spawn_get(&h.gate, &format!("/r/{}", i))).collect();
        wait_for_pending(&h.gate, 4).await;
        h.exchange.release();

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, ApiError::RefreshFailed(_)), "got {:?}", err);
        }
        assert_eq!(h.exchange.calls(), 1);
        assert_eq!(h.redirect.0.load(Ordering::SeqCst), 1);
        assert!(!h.gate.is_refreshing());
        assert_eq!(h.gate.pending_requests(), 0);
        // No retries were sent
        assert_eq!(h.transport.calls(), 4);
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_terminal() {
        let h = harness(false, true);

        let err = h.gate.send(ApiRequest::get("/always-401")).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(h.exchange.calls(), 1);
        assert_eq!(h.transport.calls(), 2);
        assert_eq!(h.redirect.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_other_errors_pass_through_without_refresh() {
        let h = harness(false, true);

        let err = h.gate.send(ApiRequest::get("/broken")).await.unwrap_err();
        assert!(matches!(err, ApiError::ServerError(ref body) if body == "boom"));

        let err = h.gate.send(ApiRequest::get("/offline")).await.unwrap_err();
        assert!(matches!(err, ApiError::NetworkError(_)));

        assert_eq!(h.exchange.calls(), 0);
    }

    #[tokio::test]
    async fn test_dropped_trigger_does_not_strand_queue() {
        let h = harness(false, false);

        let trigger = spawn_get(&h.gate, "/trigger");
        wait_for_pending(&h.gate, 1).await;
        let follower = spawn_get(&h.gate, "/follower");
        wait_for_pending(&h.gate, 2).await;

        trigger.abort();
        let _ = trigger.await;
        h.exchange.release();

        let response = follower.await.unwrap().unwrap();
        assert_eq!(response.body, "ok /follower");
        assert_eq!(h.exchange.calls(), 1);
    }

    #[tokio::test]
    async fn test_new_episode_after_settle() {
        let h = harness(false, true);

        h.gate.send(ApiRequest::get("/first")).await.unwrap();
        // Token goes stale again
        h.gate.state().token_refreshed("stale-again".to_string());
        h.gate.send(ApiRequest::get("/second")).await.unwrap();

        assert_eq!(h.exchange.calls(), 2);
    }
}
