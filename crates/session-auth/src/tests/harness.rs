//! Test harness for session lifecycle tests.
//!
//! Provides:
//! - MockTransport: scripted HTTP responses, records every request
//! - MockAuthApi: scripted login/refresh endpoints with a refresh gate
//! - TestSession: a SessionManager over in-memory storage and a manual clock
//!   that moves together with tokio's paused clock

use crate::account::AccountClient;
use crate::api::{AuthApi, LoginResponse, RefreshResponse};
use crate::client::AuthenticatedClient;
use crate::error::{RefreshError, SessionEndReason};
use crate::session::{Renewal, SessionManager};
use crate::transport::{ApiRequest, ApiResponse, Transport, TransportError};
use crate::{AuthError, AuthResult, SessionState};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use token_storage::{KeyValueStorage, ManualClock, MemoryStorage, StorageKeys, TokenStore};
use tokio::sync::watch;

pub const MINUTE: Duration = Duration::from_secs(60);
pub const REFRESH_WINDOW: Duration = Duration::from_secs(10 * 60);

// =============================================================================
// MockTransport
// =============================================================================

type Reply = Result<ApiResponse, TransportError>;

/// Transport that replays queued replies in order.
pub struct MockTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_json(&self, status: StatusCode, body: serde_json::Value) {
        self.replies
            .lock()
            .push_back(Ok(ApiResponse::json(status, &body)));
    }

    pub fn push_ok(&self) {
        self.push_json(StatusCode::OK, json!({ "ok": true }));
    }

    pub fn push_unauthorized(&self) {
        self.push_json(
            StatusCode::UNAUTHORIZED,
            json!({ "detail": "Could not validate credentials" }),
        );
    }

    /// The next request gets no response at all.
    pub fn push_no_response(&self, detail: &str) {
        self.replies
            .lock()
            .push_back(Err(TransportError::NoResponse(detail.to_string())));
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    /// Bearer tokens of the recorded requests, in order.
    pub fn bearers(&self) -> Vec<Option<String>> {
        self.requests
            .lock()
            .iter()
            .map(|r| r.bearer_token().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests.lock().push(request);
        tokio::task::yield_now().await;
        self.replies.lock().pop_front().unwrap_or_else(|| {
            Ok(ApiResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                &json!({ "detail": "no scripted response" }),
            ))
        })
    }
}

// =============================================================================
// MockAuthApi
// =============================================================================

/// Login/refresh endpoints with scripted outcomes.
///
/// Unscripted refreshes succeed with `access-<n>` where `n` counts from 2, and
/// the default lifetime set by [`set_refresh_lifetime`](Self::set_refresh_lifetime).
pub struct MockAuthApi {
    login_grant: Mutex<Option<LoginResponse>>,
    refresh_outcomes: Mutex<VecDeque<Result<RefreshResponse, RefreshError>>>,
    refresh_lifetime_minutes: Mutex<i64>,
    refresh_calls: AtomicUsize,
    refresh_tokens_seen: Mutex<Vec<String>>,
    hold: watch::Sender<bool>,
    crash_next_refresh: AtomicBool,
}

impl MockAuthApi {
    pub fn new() -> Self {
        let (hold, _) = watch::channel(false);
        Self {
            login_grant: Mutex::new(Some(grant("access-1", "refresh-1", 15))),
            refresh_outcomes: Mutex::new(VecDeque::new()),
            refresh_lifetime_minutes: Mutex::new(15),
            refresh_calls: AtomicUsize::new(0),
            refresh_tokens_seen: Mutex::new(Vec::new()),
            hold,
            crash_next_refresh: AtomicBool::new(false),
        }
    }

    pub fn reject_logins(&self) {
        *self.login_grant.lock() = None;
    }

    pub fn set_refresh_lifetime(&self, minutes: i64) {
        *self.refresh_lifetime_minutes.lock() = minutes;
    }

    pub fn push_refresh(&self, outcome: Result<RefreshResponse, RefreshError>) {
        self.refresh_outcomes.lock().push_back(outcome);
    }

    pub fn push_refresh_rejection(&self) {
        self.push_refresh(Err(RefreshError::Rejected {
            status: 401,
            body: "Invalid refresh token".to_string(),
        }));
    }

    /// The next refresh call panics instead of answering.
    pub fn crash_next_refresh(&self) {
        self.crash_next_refresh.store(true, Ordering::SeqCst);
    }

    /// Refresh calls started from now on wait until [`release_refreshes`](Self::release_refreshes).
    pub fn hold_refreshes(&self) {
        self.hold.send_replace(true);
    }

    pub fn release_refreshes(&self) {
        self.hold.send_replace(false);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.refresh_tokens_seen.lock().clone()
    }
}

#[async_trait]
impl AuthApi for MockAuthApi {
    async fn login(&self, _email: &str, _password: &str) -> AuthResult<LoginResponse> {
        tokio::task::yield_now().await;
        self.login_grant
            .lock()
            .clone()
            .ok_or_else(|| AuthError::InvalidCredentials("HTTP 401".to_string()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, RefreshError> {
        let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.refresh_tokens_seen
            .lock()
            .push(refresh_token.to_string());

        let mut gate = self.hold.subscribe();
        loop {
            let held = *gate.borrow_and_update();
            if !held || gate.changed().await.is_err() {
                break;
            }
        }
        // Let concurrent callers pile onto the in-flight refresh.
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        if self.crash_next_refresh.swap(false, Ordering::SeqCst) {
            panic!("refresh handler crashed");
        }

        let scripted = self.refresh_outcomes.lock().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(RefreshResponse {
                access_token: format!("access-{}", call + 1),
                token_type: "bearer".to_string(),
                expires_in: *self.refresh_lifetime_minutes.lock(),
            })
        })
    }
}

pub fn grant(access: &str, refresh: &str, minutes: i64) -> LoginResponse {
    LoginResponse {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
        token_type: "bearer".to_string(),
        expires_in: minutes,
        is_superuser: false,
    }
}

// =============================================================================
// TestSession
// =============================================================================

/// A session manager wired to mocks, with recorded callbacks.
pub struct TestSession {
    pub clock: Arc<ManualClock>,
    pub storage: Arc<MemoryStorage>,
    pub api: Arc<MockAuthApi>,
    pub transport: Arc<MockTransport>,
    pub manager: SessionManager,
    pub client: AuthenticatedClient,
    ended: Arc<Mutex<Vec<SessionEndReason>>>,
    states: Arc<Mutex<Vec<SessionState>>>,
}

impl TestSession {
    pub fn new() -> Self {
        Self::build(
            Arc::new(ManualClock::new(Utc::now())),
            Arc::new(MemoryStorage::new()),
            MockAuthApi::new(),
        )
    }

    fn build(clock: Arc<ManualClock>, storage: Arc<MemoryStorage>, api: MockAuthApi) -> Self {
        let api = Arc::new(api);
        let transport = Arc::new(MockTransport::new());
        let store = TokenStore::load(Box::new(storage.clone()), clock.clone(), REFRESH_WINDOW);
        let manager = SessionManager::new(store, api.clone());
        let client = AuthenticatedClient::new(manager.clone(), transport.clone());

        let ended = Arc::new(Mutex::new(Vec::new()));
        let sink = ended.clone();
        manager.set_session_ended_callback(Box::new(move |reason| sink.lock().push(reason)));

        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = states.clone();
        manager.set_state_callback(Box::new(move |payload| sink.lock().push(payload.state)));

        Self {
            clock,
            storage,
            api,
            transport,
            manager,
            client,
            ended,
            states,
        }
    }

    /// A new manager over the same storage and clock, as after a restart.
    pub fn reopen(&self, api: MockAuthApi) -> Self {
        Self::build(self.clock.clone(), self.storage.clone(), api)
    }

    /// Write a session straight into storage.
    pub fn seed_store(&self, access: &str, refresh: &str, minutes: i64) {
        let mut store = TokenStore::load(
            Box::new(self.storage.clone()),
            self.clock.clone(),
            REFRESH_WINDOW,
        );
        store.save(access, refresh, minutes).unwrap();
    }

    /// Log in as `access-1`/`refresh-1` with the given lifetime.
    pub async fn login(&self, minutes: i64) -> Renewal {
        self.login_as("access-1", "refresh-1", minutes).await
    }

    pub async fn login_as(&self, access: &str, refresh: &str, minutes: i64) -> Renewal {
        self.manager
            .establish(&grant(access, refresh, minutes))
            .await
            .unwrap()
    }

    pub fn accounts(&self) -> AccountClient {
        AccountClient::new(self.client.clone())
    }

    /// Move wall-clock and tokio time forward together, then let woken tasks
    /// run.
    pub async fn advance(&self, by: Duration) {
        self.clock.advance(chrono::Duration::from_std(by).unwrap());
        tokio::time::advance(by).await;
        settle().await;
    }

    /// Move only the wall clock, leaving timers where they are.
    pub fn advance_wall_clock(&self, by: Duration) {
        self.clock.advance(chrono::Duration::from_std(by).unwrap());
    }

    pub fn stored(&self, key: &str) -> Option<String> {
        self.storage.get(key).unwrap()
    }

    pub fn session_keys_absent(&self) -> bool {
        StorageKeys::SESSION_KEYS
            .iter()
            .all(|key| !self.storage.has(key).unwrap())
    }

    pub fn ended_reasons(&self) -> Vec<SessionEndReason> {
        self.ended.lock().clone()
    }

    pub fn states(&self) -> Vec<SessionState> {
        self.states.lock().clone()
    }
}

/// Yield until spawned tasks have had a chance to run to their next wait.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
