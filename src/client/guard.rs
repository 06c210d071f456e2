//! Session guard: attaches the access token to every request and recovers
//! from an expired token by refreshing it once and replaying.
//!
//! Requests that see `token.expired` while a refresh is outstanding wait in
//! a FIFO queue instead of starting another refresh. When the refresh
//! resolves the queue is drained in order: replayed with the new token on
//! success, failed with the refresh error otherwise.

use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};

use super::error::{ClientError, RefreshError};
use super::session::{REFRESH_TOKEN_KEY, SessionStore, TOKEN_KEY};
use super::transport::{ApiRequest, ApiResponse, Transport};
use crate::auth::TOKEN_EXPIRED_CODE;

pub const REFRESH_PATH: &str = "/users/refresh";

type Reply = oneshot::Sender<Result<ApiResponse, ClientError>>;

struct PendingRequest {
    request: ApiRequest,
    reply: Reply,
}

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    pending: VecDeque<PendingRequest>,
}

struct Inner<T> {
    transport: T,
    store: Arc<dyn SessionStore>,
    state: Mutex<RefreshState>,
}

/// Cheap to clone; clones share the refresh state.
pub struct SessionGuard<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SessionGuard<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[derive(Deserialize)]
struct RenewedTokens {
    newtoken: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl<T: Transport> SessionGuard<T> {
    pub fn new(transport: T, store: Arc<dyn SessionStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                store,
                state: Mutex::new(RefreshState::default()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.inner.store
    }

    /// Number of requests waiting for the current refresh.
    pub async fn pending_len(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }

    pub async fn is_refreshing(&self) -> bool {
        self.inner.state.lock().await.refreshing
    }

    /// Send a request with the current access token.
    ///
    /// An expired token is recovered transparently. Any other error status
    /// clears the session and is returned as [`ClientError::Status`].
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let mut request = request;
        let sent_with = self.inner.store.access_token();
        request.bearer = sent_with.clone();

        let response = self.inner.transport.send(request.clone()).await?;

        if response.is_success() {
            return Ok(response);
        }

        if response.error_code() == Some(TOKEN_EXPIRED_CODE) {
            return self.recover(request, sent_with).await;
        }

        Err(self.reject(response))
    }

    async fn recover(
        &self,
        request: ApiRequest,
        sent_with: Option<String>,
    ) -> Result<ApiResponse, ClientError> {
        let (reply, waiter) = oneshot::channel();

        {
            let mut state = self.inner.state.lock().await;

            if !state.refreshing {
                let current = self.inner.store.access_token();
                if current.is_some() && current != sent_with {
                    drop(state);
                    debug!(path = %request.path, "Token renewed while in flight, replaying");
                    return self.replay(request).await;
                }

                state.refreshing = true;
                let guard = self.clone();
                tokio::spawn(async move { guard.run_refresh().await });
            }

            state.pending.push_back(PendingRequest { request, reply });
        }

        waiter.await.unwrap_or(Err(ClientError::Aborted))
    }

    async fn run_refresh(self) {
        let outcome = self.request_new_token().await;

        if outcome.is_err() {
            self.inner.store.clear_session();
        }

        let pending = {
            let mut state = self.inner.state.lock().await;
            state.refreshing = false;
            std::mem::take(&mut state.pending)
        };

        match outcome {
            Ok(()) => {
                info!(queued = pending.len(), "Access token renewed");
                for entry in pending {
                    let result = self.replay(entry.request).await;
                    // The caller may have stopped waiting.
                    let _ = entry.reply.send(result);
                }
            }
            Err(e) => {
                warn!(queued = pending.len(), error = %e, "Token refresh failed, session cleared");
                for entry in pending {
                    let _ = entry.reply.send(Err(ClientError::RefreshFailed(e.clone())));
                }
            }
        }
    }

    /// Exactly one refresh call, straight on the transport.
    async fn request_new_token(&self) -> Result<(), RefreshError> {
        let refresh_token = self.inner.store.refresh_token().ok_or_else(|| RefreshError {
            status: None,
            message: "No refresh token stored".to_string(),
        })?;

        let request = ApiRequest::post(REFRESH_PATH, json!({ "refresh_token": refresh_token }));
        let response = self
            .inner
            .transport
            .send(request)
            .await
            .map_err(|e| RefreshError {
                status: None,
                message: e.to_string(),
            })?;

        if !response.is_success() {
            return Err(RefreshError {
                status: Some(response.status),
                message: response
                    .message()
                    .unwrap_or("Refresh token rejected")
                    .to_string(),
            });
        }

        let status = response.status;
        let renewed: RenewedTokens =
            serde_json::from_value(response.body).map_err(|e| RefreshError {
                status: Some(status),
                message: format!("Unexpected refresh response: {}", e),
            })?;

        self.inner.store.set(TOKEN_KEY, &renewed.newtoken);
        if let Some(refresh_token) = renewed.refresh_token {
            self.inner.store.set(REFRESH_TOKEN_KEY, &refresh_token);
        }

        Ok(())
    }

    /// Resend with the current token. A failure here is final.
    async fn replay(&self, mut request: ApiRequest) -> Result<ApiResponse, ClientError> {
        request.bearer = self.inner.store.access_token();
        let response = self.inner.transport.send(request).await?;

        if response.is_success() {
            Ok(response)
        } else {
            Err(self.reject(response))
        }
    }

    fn reject(&self, response: ApiResponse) -> ClientError {
        debug!(status = response.status, "Request failed, clearing session");
        self.inner.store.clear_session();
        ClientError::Status {
            status: response.status,
            body: response.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::error::TransportError;
    use crate::client::session::{MemorySessionStore, USER_KEY};
    use reqwest::header::{HeaderName, HeaderValue};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    const STALE: &str = "stale-access";
    const VALID: &str = "fresh-access";

    /// In-process server: accepts only `VALID`, answers refresh after the
    /// gate opens.
    struct Script {
        store: Arc<MemorySessionStore>,
        renewed_token: String,
        refresh_succeeds: bool,
        refresh_calls: AtomicUsize,
        gate: Semaphore,
        log: StdMutex<Vec<(String, Option<String>)>>,
        request_ids: StdMutex<Vec<Option<String>>>,
    }

    #[derive(Clone)]
    struct ScriptedTransport(Arc<Script>);

    impl Transport for ScriptedTransport {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
            let script = &self.0;

            if request.path == REFRESH_PATH {
                script.refresh_calls.fetch_add(1, Ordering::SeqCst);
                script.gate.acquire().await.unwrap().forget();
                return Ok(if script.refresh_succeeds {
                    ApiResponse {
                        status: 200,
                        body: json!({ "newtoken": script.renewed_token }),
                    }
                } else {
                    ApiResponse {
                        status: 401,
                        body: json!({ "code": "token.invalid", "message": "Refresh token invalid." }),
                    }
                });
            }

            script
                .log
                .lock()
                .unwrap()
                .push((request.path.clone(), request.bearer.clone()));
            script.request_ids.lock().unwrap().push(
                request
                    .headers
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
            );

            match request.path.as_str() {
                "/down" => return Err(TransportError("connection refused".into())),
                "/invalid" => {
                    return Ok(ApiResponse {
                        status: 400,
                        body: json!({ "message": "Schedule date is not available" }),
                    });
                }
                // Another refresh lands while this request is in flight.
                "/race" if request.bearer.as_deref() == Some(STALE) => {
                    script.store.set(TOKEN_KEY, VALID);
                }
                _ => {}
            }

            Ok(match request.bearer.as_deref() {
                Some(VALID) => ApiResponse {
                    status: 200,
                    body: json!({ "path": request.path }),
                },
                Some(_) => ApiResponse {
                    status: 401,
                    body: json!({ "code": "token.expired", "message": "Token expired." }),
                },
                None => ApiResponse {
                    status: 401,
                    body: json!({ "code": "token.missing", "message": "Token missing" }),
                },
            })
        }
    }

    struct Harness {
        script: Arc<Script>,
        store: Arc<MemorySessionStore>,
        guard: SessionGuard<ScriptedTransport>,
    }

    impl Harness {
        fn new(access_token: &str, refresh_succeeds: bool, gate_open: bool) -> Self {
            Self::with_renewed(access_token, VALID, refresh_succeeds, gate_open)
        }

        fn with_renewed(
            access_token: &str,
            renewed_token: &str,
            refresh_succeeds: bool,
            gate_open: bool,
        ) -> Self {
            let store = Arc::new(MemorySessionStore::new());
            store.set(TOKEN_KEY, access_token);
            store.set(REFRESH_TOKEN_KEY, "refresh");
            store.set(
                USER_KEY,
                r#"{"name":"Ana","email":"ana@example.com","avatar_url":null}"#,
            );

            let script = Arc::new(Script {
                store: store.clone(),
                renewed_token: renewed_token.to_string(),
                refresh_succeeds,
                refresh_calls: AtomicUsize::new(0),
                gate: Semaphore::new(if gate_open { Semaphore::MAX_PERMITS } else { 0 }),
                log: StdMutex::new(Vec::new()),
                request_ids: StdMutex::new(Vec::new()),
            });

            let guard = SessionGuard::new(ScriptedTransport(script.clone()), store.clone());
            Self {
                script,
                store,
                guard,
            }
        }

        fn refresh_calls(&self) -> usize {
            self.script.refresh_calls.load(Ordering::SeqCst)
        }

        fn log(&self) -> Vec<(String, Option<String>)> {
            self.script.log.lock().unwrap().clone()
        }

        async fn wait_for_pending(&self, count: usize) {
            tokio::time::timeout(Duration::from_secs(5), async {
                while self.guard.pending_len().await < count {
                    tokio::task::yield_now().await;
                }
            })
            .await
            .expect("requests never queued");
        }
    }

    #[tokio::test]
    async fn test_valid_token_skips_refresh() {
        let h = Harness::new(VALID, true, true);

        let response = h.guard.send(ApiRequest::get("/items")).await.unwrap();

        assert_eq!(response.body["path"], "/items");
        assert_eq!(h.refresh_calls(), 0);
        assert!(!h.guard.is_refreshing().await);
        assert_eq!(h.log(), vec![("/items".to_string(), Some(VALID.to_string()))]);
    }

    #[tokio::test]
    async fn test_token_read_at_send_time() {
        let h = Harness::new(VALID, true, true);

        let mut request = ApiRequest::get("/items");
        request.bearer = Some("built-earlier".into());
        h.guard.send(request).await.unwrap();

        assert_eq!(h.log()[0].1.as_deref(), Some(VALID));
    }

    #[tokio::test]
    async fn test_replay_keeps_request_headers() {
        let h = Harness::new(STALE, true, true);

        let request = ApiRequest::get("/items").with_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("42"),
        );
        h.guard.send(request).await.unwrap();

        assert_eq!(
            h.log(),
            vec![
                ("/items".to_string(), Some(STALE.to_string())),
                ("/items".to_string(), Some(VALID.to_string())),
            ]
        );
        let ids = h.script.request_ids.lock().unwrap().clone();
        assert_eq!(ids, vec![Some("42".to_string()), Some("42".to_string())]);
    }

    #[tokio::test]
    async fn test_concurrent_expiry_single_refresh_fifo_replay() {
        let h = Harness::new(STALE, true, false);
        const N: usize = 5;

        let mut handles = Vec::new();
        for i in 0..N {
            let guard = h.guard.clone();
            handles.push(tokio::spawn(async move {
                guard.send(ApiRequest::get(format!("/items/{}", i))).await
            }));
        }

        h.wait_for_pending(N).await;
        assert!(h.guard.is_refreshing().await);

        h.script.gate.add_permits(1);

        for (i, handle) in handles.into_iter().enumerate() {
            let response = handle.await.unwrap().unwrap();
            assert_eq!(response.body["path"], format!("/items/{}", i));
        }

        assert_eq!(h.refresh_calls(), 1);
        assert_eq!(h.guard.pending_len().await, 0);
        assert!(!h.guard.is_refreshing().await);
        assert_eq!(h.store.access_token().as_deref(), Some(VALID));

        let replays: Vec<_> = h
            .log()
            .into_iter()
            .filter(|(_, bearer)| bearer.as_deref() == Some(VALID))
            .map(|(path, _)| path)
            .collect();
        let expected: Vec<_> = (0..N).map(|i| format!("/items/{}", i)).collect();
        assert_eq!(replays, expected);
    }

    #[tokio::test]
    async fn test_refresh_failure_rejects_all_and_clears_session() {
        let h = Harness::new(STALE, false, false);
        const N: usize = 3;

        let mut handles = Vec::new();
        for i in 0..N {
            let guard = h.guard.clone();
            handles.push(tokio::spawn(async move {
                guard.send(ApiRequest::get(format!("/items/{}", i))).await
            }));
        }

        h.wait_for_pending(N).await;
        h.script.gate.add_permits(1);

        for handle in handles {
            match handle.await.unwrap() {
                Err(ClientError::RefreshFailed(e)) => {
                    assert_eq!(e.status, Some(401));
                    assert_eq!(e.message, "Refresh token invalid.");
                }
                other => panic!("expected refresh failure, got {:?}", other),
            }
        }

        assert_eq!(h.refresh_calls(), 1);
        assert_eq!(h.guard.pending_len().await, 0);
        assert!(h.store.access_token().is_none());
        assert!(h.store.refresh_token().is_none());
        assert!(h.store.user().is_none());
    }

    #[tokio::test]
    async fn test_missing_refresh_token_fails_without_call() {
        let h = Harness::new(STALE, true, true);
        h.store.remove(REFRESH_TOKEN_KEY);

        let err = h.guard.send(ApiRequest::get("/items")).await.unwrap_err();

        assert!(matches!(err, ClientError::RefreshFailed(RefreshError { status: None, .. })));
        assert_eq!(h.refresh_calls(), 0);
        assert!(h.store.access_token().is_none());
    }

    #[tokio::test]
    async fn test_non_expiry_error_never_queued() {
        let h = Harness::new(VALID, true, true);

        let err = h
            .guard
            .send(ApiRequest::post("/invalid", json!({})))
            .await
            .unwrap_err();

        match err {
            ClientError::Status { status, ref body } => {
                assert_eq!(status, 400);
                assert_eq!(body["message"], "Schedule date is not available");
            }
            ref other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.message(), "Schedule date is not available");
        assert_eq!(h.refresh_calls(), 0);
        assert_eq!(h.guard.pending_len().await, 0);
        assert!(h.store.access_token().is_none());
    }

    #[tokio::test]
    async fn test_missing_token_code_does_not_refresh() {
        let h = Harness::new(VALID, true, true);
        h.store.remove(TOKEN_KEY);

        let err = h.guard.send(ApiRequest::get("/items")).await.unwrap_err();

        assert_eq!(err.code(), Some("token.missing"));
        assert_eq!(h.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_keeps_session() {
        let h = Harness::new(VALID, true, true);

        let err = h.guard.send(ApiRequest::get("/down")).await.unwrap_err();

        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(h.store.access_token().as_deref(), Some(VALID));
        assert!(h.store.refresh_token().is_some());
    }

    #[tokio::test]
    async fn test_expiry_after_refresh_replays_without_new_refresh() {
        let h = Harness::new(STALE, true, true);

        let response = h.guard.send(ApiRequest::get("/race")).await.unwrap();

        assert_eq!(response.body["path"], "/race");
        assert_eq!(h.refresh_calls(), 0);
        assert_eq!(
            h.log(),
            vec![
                ("/race".to_string(), Some(STALE.to_string())),
                ("/race".to_string(), Some(VALID.to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_replay_is_final() {
        let h = Harness::with_renewed(STALE, "also-rejected", true, true);

        let err = h.guard.send(ApiRequest::get("/items")).await.unwrap_err();

        assert_eq!(err.code(), Some("token.expired"));
        assert_eq!(h.refresh_calls(), 1);
        assert!(!h.guard.is_refreshing().await);
        assert!(h.store.access_token().is_none());
    }

    #[tokio::test]
    async fn test_new_episode_after_refresh() {
        let h = Harness::new(STALE, true, true);

        h.guard.send(ApiRequest::get("/a")).await.unwrap();
        h.store.set(TOKEN_KEY, STALE);
        h.guard.send(ApiRequest::get("/b")).await.unwrap();

        assert_eq!(h.refresh_calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_expiry_multi_thread() {
        let h = Harness::new(STALE, true, false);
        const N: usize = 16;

        let handles: Vec<_> = (0..N)
            .map(|i| {
                let guard = h.guard.clone();
                tokio::spawn(async move { guard.send(ApiRequest::get(format!("/items/{}", i))).await })
            })
            .collect();

        h.wait_for_pending(N).await;
        h.script.gate.add_permits(1);

        for handle in handles {
            let response = handle.await.unwrap().unwrap();
            assert!(response.body["path"].as_str().unwrap().starts_with("/items/"));
        }

        assert_eq!(h.refresh_calls(), 1);
        assert_eq!(h.guard.pending_len().await, 0);
    }
}
