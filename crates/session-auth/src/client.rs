//! Authenticated API client.
//!
//! Every request goes out with a token from [`SessionManager::ensure_fresh`].
//! A 401 earns exactly one refresh-and-retry; a second 401 ends the session.
//! A request that got no response at all may be a 401 hidden by the network
//! layer, so with `retry_masked_network_failures` it is treated the same way.

use crate::error::SessionEndReason;
use crate::session::SessionManager;
use crate::transport::{ApiRequest, ApiResponse, Transport, TransportError};
use crate::{AuthError, AuthResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Refresh-and-retry rounds allowed per request.
pub const MAX_AUTH_RETRIES: usize = 1;

/// Sends requests with the session's bearer token attached.
#[derive(Clone)]
pub struct AuthenticatedClient {
    session: SessionManager,
    transport: Arc<dyn Transport>,
    retry_masked_network_failures: bool,
}

impl AuthenticatedClient {
    pub fn new(session: SessionManager, transport: Arc<dyn Transport>) -> Self {
        Self {
            session,
            transport,
            retry_masked_network_failures: true,
        }
    }

    /// Treat a request that got no response as a possible hidden 401.
    pub fn with_masked_network_retry(mut self, enabled: bool) -> Self {
        self.retry_masked_network_failures = enabled;
        self
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Send without credentials. Public endpoints only.
    pub async fn send_public(&self, request: ApiRequest) -> AuthResult<ApiResponse> {
        self.transport.send(request).await.map_err(|e| {
            warn!(error = %e, "Request failed");
            AuthError::Network(e.to_string())
        })
    }

    /// Send with credentials and return the response, whatever its status
    /// other than 401.
    ///
    /// Every failure that ends the session comes back as
    /// [`AuthError::SessionExpired`].
    pub async fn execute(&self, request: ApiRequest) -> AuthResult<ApiResponse> {
        let mut token = self.session.ensure_fresh().await.map_err(|e| {
            debug!(error = %e, "No usable session for request");
            AuthError::SessionExpired
        })?;
        let mut attempt = 0;

        loop {
            let outcome = self
                .transport
                .send(request.clone().bearer(&token))
                .await;
            let retries_left = attempt < MAX_AUTH_RETRIES;

            match outcome {
                Ok(response) if response.is_unauthorized() => {
                    if !retries_left {
                        warn!(
                            path = %request.path,
                            "Request rejected again after token refresh"
                        );
                        self.session
                            .end_session(SessionEndReason::RequestAuthRejected);
                        return Err(AuthError::SessionExpired);
                    }
                    debug!(path = %request.path, "Request unauthorized, refreshing token");
                }
                Ok(response) => return Ok(response),
                Err(TransportError::NoResponse(detail)) => {
                    if !self.retry_masked_network_failures {
                        warn!(path = %request.path, error = %detail, "Request got no response");
                        return Err(AuthError::Network(detail));
                    }
                    if !retries_left || !self.session.has_refresh_token() {
                        warn!(
                            path = %request.path,
                            error = %detail,
                            "Request got no response after refresh-retry"
                        );
                        self.session
                            .end_session(SessionEndReason::AmbiguousNetworkFailure);
                        return Err(AuthError::SessionExpired);
                    }
                    debug!(
                        path = %request.path,
                        error = %detail,
                        "Request got no response, refreshing token before retry"
                    );
                }
                Err(TransportError::Body(detail)) => {
                    warn!(path = %request.path, error = %detail, "Failed to read response");
                    return Err(AuthError::Network(detail));
                }
            }

            token = self
                .session
                .refresh_after_rejection(&token)
                .await
                .map_err(|e| {
                    debug!(error = %e, "Refresh before retry failed");
                    AuthError::SessionExpired
                })?;
            attempt += 1;
        }
    }

    /// Send with credentials and decode a success body.
    pub async fn request<T: DeserializeOwned>(&self, request: ApiRequest) -> AuthResult<T> {
        self.execute(request).await?.error_for_status()?.decode()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> AuthResult<T> {
        self.request(ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> AuthResult<T> {
        self.request(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> AuthResult<T> {
        self.request(ApiRequest::put(path).json(body)?).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> AuthResult<T> {
        self.request(ApiRequest::patch(path).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> AuthResult<T> {
        self.request(ApiRequest::delete(path)).await
    }
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("session", &self.session)
            .field(
                "retry_masked_network_failures",
                &self.retry_masked_network_failures,
            )
            .finish_non_exhaustive()
    }
}
