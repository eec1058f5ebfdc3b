//! Session lifecycle with proactive renewal.
//!
//! `SessionManager` owns the [`TokenStore`] and the session FSM. It keeps at
//! most one renewal timer armed and at most one refresh call in flight; every
//! caller that needs a fresh token while a refresh is outstanding awaits that
//! same refresh.
//!
//! A session epoch is bumped whenever the session is replaced or torn down.
//! Refresh results carry the epoch they started in and are dropped if it no
//! longer matches, so a refresh that finishes after logout cannot bring the
//! session back.

use crate::api::{AuthApi, LoginResponse, RefreshResponse};
use crate::auth_fsm::{SessionMachine, SessionMachineInput, SessionState, StateChangedPayload};
use crate::error::{RefreshError, SessionEndReason};
use crate::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use token_storage::TokenStore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lower bound for the delay between consecutive renewals.
pub const MIN_RENEWAL_DELAY: Duration = Duration::from_secs(30);

/// Callback type for session state change notifications.
pub type StateCallback = Box<dyn Fn(StateChangedPayload) + Send + Sync>;

/// Callback type for involuntary session teardown.
pub type SessionEndedCallback = Box<dyn Fn(SessionEndReason) + Send + Sync>;

type RefreshFuture = Shared<BoxFuture<'static, Result<String, RefreshError>>>;

/// What [`SessionManager::schedule_renewal`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renewal {
    /// Nothing to renew.
    NoSession,
    /// A timer will refresh the token after `delay`.
    Scheduled { delay: Duration },
    /// The token was already inside the refresh window and has been
    /// refreshed; the next renewal fires after `next_in`.
    RefreshedImmediately { next_in: Duration },
}

/// Point-in-time view of the session for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub has_session: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub expires_in_secs: u64,
    pub is_expired: bool,
    pub should_refresh: bool,
    pub renewal_armed: bool,
}

struct PendingRefresh {
    epoch: u64,
    future: RefreshFuture,
}

struct SessionCore {
    store: TokenStore,
    fsm: SessionMachine,
    epoch: u64,
    pending_refresh: Option<PendingRefresh>,
    renewal_timer: Option<JoinHandle<()>>,
}

impl SessionCore {
    fn state(&self) -> SessionState {
        SessionState::from(self.fsm.state())
    }

    /// Apply `input`, returning the payload to publish if the state changed.
    fn apply(&mut self, input: &SessionMachineInput) -> AuthResult<Option<StateChangedPayload>> {
        let old_state = self.state();

        self.fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input, old_state
            ))
        })?;

        let new_state = self.state();
        if old_state == new_state {
            return Ok(None);
        }

        debug!(
            old_state = ?old_state,
            new_state = ?new_state,
            "Session state transition"
        );
        Ok(Some(StateChangedPayload {
            state: new_state,
            expires_at: self
                .store
                .expires_at()
                .filter(|_| new_state.has_session())
                .map(|t| t.to_rfc3339()),
        }))
    }

    fn apply_or_warn(&mut self, input: &SessionMachineInput) -> Option<StateChangedPayload> {
        self.apply(input).unwrap_or_else(|e| {
            warn!(error = %e, "Session state transition refused");
            None
        })
    }

    fn renewal_delay(&self) -> Duration {
        self.store
            .time_until_expiry()
            .saturating_sub(self.store.refresh_window())
    }
}

struct Inner {
    api: Arc<dyn AuthApi>,
    core: Mutex<SessionCore>,
    state_callback: Mutex<Option<Arc<dyn Fn(StateChangedPayload) + Send + Sync>>>,
    ended_callback: Mutex<Option<Arc<dyn Fn(SessionEndReason) + Send + Sync>>>,
}

/// Shared handle to the session. Clones refer to the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Wrap a loaded token store. A complete stored session puts the manager
    /// in `Active`; call [`resume`](Self::resume) to arm renewal for it.
    pub fn new(mut store: TokenStore, api: Arc<dyn AuthApi>) -> Self {
        let mut fsm = SessionMachine::new();
        if store.has_session() {
            let _ = fsm.consume(&SessionMachineInput::SessionRestored);
        } else {
            // Half a session is no session.
            store.clear();
        }

        Self {
            inner: Arc::new(Inner {
                api,
                core: Mutex::new(SessionCore {
                    store,
                    fsm,
                    epoch: 0,
                    pending_refresh: None,
                    renewal_timer: None,
                }),
                state_callback: Mutex::new(None),
                ended_callback: Mutex::new(None),
            }),
        }
    }

    /// Set a callback to be notified of state changes.
    pub fn set_state_callback(&self, callback: StateCallback) {
        *self.inner.state_callback.lock() = Some(Arc::from(callback));
    }

    /// Set a callback fired once whenever a session ends for any reason other
    /// than an explicit logout.
    pub fn set_session_ended_callback(&self, callback: SessionEndedCallback) {
        *self.inner.ended_callback.lock() = Some(Arc::from(callback));
    }

    pub fn state(&self) -> SessionState {
        self.inner.core.lock().state()
    }

    /// Current access token for an `Authorization: Bearer` header.
    pub fn access_token(&self) -> Option<String> {
        self.inner.core.lock().store.access_token().map(str::to_string)
    }

    pub fn has_session(&self) -> bool {
        self.inner.core.lock().store.has_session()
    }

    pub fn has_refresh_token(&self) -> bool {
        self.inner.core.lock().store.refresh_token().is_some()
    }

    pub fn is_expired(&self) -> bool {
        self.inner.core.lock().store.is_expired()
    }

    pub fn should_proactively_refresh(&self) -> bool {
        self.inner.core.lock().store.should_proactively_refresh()
    }

    pub fn time_until_expiry(&self) -> Duration {
        self.inner.core.lock().store.time_until_expiry()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.inner.core.lock().store.expires_at()
    }

    pub fn refresh_window(&self) -> Duration {
        self.inner.core.lock().store.refresh_window()
    }

    /// A renewal timer is armed and has not fired its last refresh.
    pub fn has_pending_renewal(&self) -> bool {
        self.inner
            .core
            .lock()
            .renewal_timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let core = self.inner.core.lock();
        SessionSnapshot {
            state: core.state(),
            has_session: core.store.has_session(),
            expires_at: core.store.expires_at(),
            expires_in_secs: core.store.time_until_expiry().as_secs(),
            is_expired: core.store.is_expired(),
            should_refresh: core.store.should_proactively_refresh(),
            renewal_armed: core
                .renewal_timer
                .as_ref()
                .is_some_and(|timer| !timer.is_finished()),
        }
    }

    /// Startup: arm renewal for a restored session.
    ///
    /// Returns:
    /// - `Ok(true)` if a session is live (renewal armed, or refreshed now)
    /// - `Ok(false)` if no session was stored
    /// - `Err(...)` if the stored session needed a refresh that failed; the
    ///   session has been cleared
    pub async fn resume(&self) -> AuthResult<bool> {
        if !self.has_session() {
            info!("No stored session found on startup");
            return Ok(false);
        }

        info!(expires_at = ?self.expires_at(), "Resuming stored session");
        match self.schedule_renewal().await? {
            Renewal::NoSession => Ok(false),
            Renewal::Scheduled { .. } | Renewal::RefreshedImmediately { .. } => Ok(true),
        }
    }

    /// Log in with email and password and start a session.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<Renewal> {
        let grant = self.inner.api.login(email, password).await?;
        self.establish(&grant).await
    }

    /// Start a session from a login grant, replacing any current one.
    pub async fn establish(&self, grant: &LoginResponse) -> AuthResult<Renewal> {
        let (change, stale_timer) = {
            let mut core = self.inner.core.lock();
            core.store
                .save(&grant.access_token, &grant.refresh_token, grant.expires_in)
                .map_err(|e| AuthError::InvalidGrant(e.to_string()))?;
            core.epoch += 1;
            if core.pending_refresh.take().is_some() {
                debug!("Discarding refresh started by the previous session");
            }
            let stale_timer = core.renewal_timer.take();
            let change = core.apply(&SessionMachineInput::LoginSucceeded)?;
            (change, stale_timer)
        };

        if let Some(timer) = stale_timer {
            timer.abort();
        }
        self.notify_state_change(change);
        info!(expires_in_minutes = grant.expires_in, "Session established");

        self.schedule_renewal().await
    }

    /// Explicit logout: cancel renewal, drop any in-flight refresh result and
    /// clear stored tokens.
    pub fn logout(&self) {
        self.end_session(SessionEndReason::Logout);
    }

    /// (Re)arm the single renewal timer for the current expiry.
    ///
    /// The timer fires `refresh_window` before expiry. If that moment has
    /// already passed, the refresh runs now and the timer is armed only once
    /// it has succeeded.
    pub async fn schedule_renewal(&self) -> AuthResult<Renewal> {
        let (delay, epoch) = {
            let mut core = self.inner.core.lock();
            if let Some(timer) = core.renewal_timer.take() {
                timer.abort();
            }
            if !core.store.has_session() {
                return Ok(Renewal::NoSession);
            }
            (core.renewal_delay(), core.epoch)
        };

        if !delay.is_zero() {
            self.arm_renewal_timer(delay, epoch);
            info!(delay_secs = delay.as_secs(), "Token renewal scheduled");
            return Ok(Renewal::Scheduled { delay });
        }

        info!("Access token inside refresh window, refreshing now");
        self.refresh().await?;

        let next_in = self.next_renewal_delay();
        self.arm_renewal_timer(next_in, epoch);
        info!(delay_secs = next_in.as_secs(), "Token renewal scheduled");
        Ok(Renewal::RefreshedImmediately { next_in })
    }

    /// Refresh the access token, joining the in-flight refresh if there is one.
    ///
    /// A failed refresh ends the session before this returns.
    pub async fn refresh(&self) -> Result<String, RefreshError> {
        let (future, change) = {
            let mut core = self.inner.core.lock();
            let in_flight = core.pending_refresh.as_ref().map(|p| p.future.clone());
            match in_flight {
                Some(future) => {
                    debug!("Joining in-flight token refresh");
                    (future, None)
                }
                None => {
                    let Some(refresh_token) = core.store.refresh_token().map(str::to_string)
                    else {
                        drop(core);
                        warn!("Token refresh needed but no refresh token is stored");
                        self.end_session(SessionEndReason::NoCredentials);
                        return Err(RefreshError::NoCredentials);
                    };
                    let epoch = core.epoch;
                    let change = match core.apply(&SessionMachineInput::RefreshStarted) {
                        Ok(change) => change,
                        Err(e) => {
                            drop(core);
                            warn!(error = %e, "Cannot start token refresh");
                            return Err(RefreshError::InvalidState(e.to_string()));
                        }
                    };
                    let future = self.spawn_refresh(refresh_token, epoch);
                    core.pending_refresh = Some(PendingRefresh {
                        epoch,
                        future: future.clone(),
                    });
                    (future, change)
                }
            }
        };

        self.notify_state_change(change);

        match future.await {
            // A newer login replaced the session this refresh belonged to.
            Err(RefreshError::Superseded) => self.access_token().ok_or(RefreshError::Superseded),
            outcome => outcome,
        }
    }

    /// Token to attach to a request about to be sent.
    ///
    /// Waits for an in-flight refresh, and refreshes first when the token is
    /// expired or inside the refresh window.
    pub async fn ensure_fresh(&self) -> AuthResult<String> {
        let (pending, needs_refresh, token) = {
            let core = self.inner.core.lock();
            (
                core.pending_refresh.is_some(),
                core.store.is_expired() || core.store.should_proactively_refresh(),
                core.store.access_token().map(str::to_string),
            )
        };

        if pending || needs_refresh {
            return self.refresh().await.map_err(AuthError::from);
        }

        match token {
            Some(token) => Ok(token),
            None => {
                self.end_session(SessionEndReason::NoCredentials);
                Err(AuthError::NoCredentials)
            }
        }
    }

    /// Token to retry with after `rejected_token` drew a 401.
    ///
    /// If another caller has already replaced the rejected token, that token is
    /// returned without a second refresh.
    pub async fn refresh_after_rejection(
        &self,
        rejected_token: &str,
    ) -> Result<String, RefreshError> {
        let current = {
            let core = self.inner.core.lock();
            if core.pending_refresh.is_some() {
                None
            } else {
                core.store
                    .access_token()
                    .filter(|token| *token != rejected_token)
                    .map(str::to_string)
            }
        };

        if let Some(token) = current {
            debug!("Rejected token already replaced, retrying with current token");
            return Ok(token);
        }
        self.refresh().await
    }

    /// Tear the session down. Idempotent.
    ///
    /// The session-ended callback fires once per session for every reason
    /// except [`SessionEndReason::Logout`].
    pub fn end_session(&self, reason: SessionEndReason) {
        let (had_session, timer, change) = {
            let mut core = self.inner.core.lock();
            let had_session = core.state().has_session();

            core.epoch += 1;
            core.pending_refresh = None;
            let timer = core.renewal_timer.take();
            core.store.clear();

            let input = match (reason, core.state()) {
                (SessionEndReason::Logout, _) => SessionMachineInput::LogoutRequested,
                (
                    SessionEndReason::RefreshRejected | SessionEndReason::RefreshNetworkFailure,
                    SessionState::RefreshInFlight,
                ) => SessionMachineInput::RefreshFailed,
                _ => SessionMachineInput::SessionEnded,
            };
            let change = if had_session {
                core.apply_or_warn(&input)
            } else {
                None
            };
            (had_session, timer, change)
        };

        if let Some(timer) = timer {
            timer.abort();
        }
        self.notify_state_change(change);

        if !had_session {
            return;
        }
        if reason.is_logout() {
            info!("Logged out");
        } else {
            warn!(reason = ?reason, "Session ended");
            self.notify_session_ended(reason);
        }
    }

    fn next_renewal_delay(&self) -> Duration {
        let core = self.inner.core.lock();
        let delay = core.renewal_delay();
        if !delay.is_zero() {
            return delay;
        }
        // Fresh lifetime already inside the window: wait half of it, but at
        // least MIN_RENEWAL_DELAY.
        (core.store.time_until_expiry() / 2).max(MIN_RENEWAL_DELAY)
    }

    fn arm_renewal_timer(&self, first_delay: Duration, epoch: u64) {
        let mut core = self.inner.core.lock();
        if core.epoch != epoch || !core.store.has_session() {
            debug!("Session changed before renewal could be armed");
            return;
        }

        let timer = tokio::spawn(renewal_loop(Arc::downgrade(&self.inner), first_delay));
        if let Some(previous) = core.renewal_timer.replace(timer) {
            previous.abort();
        }
    }

    fn spawn_refresh(&self, refresh_token: String, epoch: u64) -> RefreshFuture {
        let api = self.inner.api.clone();
        let inner = Arc::downgrade(&self.inner);

        let task_inner = inner.clone();
        let task = tokio::spawn(async move {
            debug!("Refreshing access token");
            let outcome = api.refresh(&refresh_token).await;
            match task_inner.upgrade() {
                Some(inner) => SessionManager { inner }.complete_refresh(epoch, outcome),
                None => Err(RefreshError::Superseded),
            }
        });

        // A panicked task never reached complete_refresh; settle it here.
        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let error = RefreshError::Network(format!("Refresh task failed: {}", e));
                    match inner.upgrade() {
                        Some(inner) => {
                            SessionManager { inner }.complete_refresh(epoch, Err(error))
                        }
                        None => Err(error),
                    }
                }
            }
        }
        .boxed()
        .shared()
    }

    fn complete_refresh(
        &self,
        epoch: u64,
        outcome: Result<RefreshResponse, RefreshError>,
    ) -> Result<String, RefreshError> {
        let mut core = self.inner.core.lock();
        if core.epoch != epoch {
            debug!("Discarding refresh result for a session that no longer exists");
            return Err(RefreshError::Superseded);
        }
        if core
            .pending_refresh
            .as_ref()
            .is_some_and(|pending| pending.epoch == epoch)
        {
            core.pending_refresh = None;
        }

        let outcome = outcome.and_then(|grant| {
            core.store
                .update_access_token(&grant.access_token, grant.expires_in)
                .map(|()| grant)
                .map_err(|e| RefreshError::Network(format!("Malformed refresh response: {}", e)))
        });

        match outcome {
            Ok(grant) => {
                let change = core.apply_or_warn(&SessionMachineInput::RefreshSucceeded);
                let expires_at = core.store.expires_at();
                drop(core);

                self.notify_state_change(change);
                info!(expires_at = ?expires_at, "Access token refreshed");
                Ok(grant.access_token)
            }
            Err(error) => {
                drop(core);
                warn!(error = %error, "Token refresh failed");
                self.end_session(SessionEndReason::from(&error));
                Err(error)
            }
        }
    }

    fn notify_state_change(&self, change: Option<StateChangedPayload>) {
        let Some(payload) = change else {
            return;
        };
        let callback = self.inner.state_callback.lock().clone();
        if let Some(callback) = callback {
            callback(payload);
        }
    }

    fn notify_session_ended(&self, reason: SessionEndReason) {
        let callback = self.inner.ended_callback.lock().clone();
        if let Some(callback) = callback {
            callback(reason);
        }
    }
}

/// Body of the renewal timer task: sleep, refresh, re-arm from the new expiry.
async fn renewal_loop(inner: Weak<Inner>, first_delay: Duration) {
    let mut delay = first_delay;
    loop {
        tokio::time::sleep(delay).await;

        let Some(inner) = inner.upgrade() else {
            return;
        };
        let manager = SessionManager { inner };

        debug!("Renewal timer fired");
        if let Err(error) = manager.refresh().await {
            debug!(error = %error, "Renewal stopped");
            return;
        }

        delay = manager.next_renewal_delay();
        debug!(delay_secs = delay.as_secs(), "Next token renewal armed");
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.core.get_mut().renewal_timer.take() {
            timer.abort();
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
