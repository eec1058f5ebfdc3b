//! Login and refresh endpoints.

use crate::error::RefreshError;
use crate::transport::{ApiRequest, Transport, TransportError};
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use token_storage::expiry_after;
use tracing::{debug, info, warn};

/// Path prefix of the authentication endpoints.
pub const AUTH_PREFIX: &str = "/api/v1/auth";

fn default_token_type() -> String {
    "bearer".to_string()
}

/// `expires_in` minutes from now is a timestamp the token store can hold.
fn lifetime_in_range(expires_in: i64) -> bool {
    expiry_after(Utc::now(), expires_in).is_some()
}

/// Successful login. `expires_in` is the access-token lifetime in minutes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default)]
    pub is_superuser: bool,
}

/// Successful refresh. The refresh token itself is not rotated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: i64,
}

/// Token-issuing endpoints the session manager depends on.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange credentials for a token pair.
    async fn login(&self, email: &str, password: &str) -> AuthResult<LoginResponse>;

    /// Exchange a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, RefreshError>;
}

/// [`AuthApi`] over a [`Transport`].
#[derive(Clone)]
pub struct HttpAuthApi {
    transport: Arc<dyn Transport>,
}

impl HttpAuthApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, email: &str, password: &str) -> AuthResult<LoginResponse> {
        debug!(email = %email, "Attempting password login");

        let request = ApiRequest::post(format!("{}/login", AUTH_PREFIX))
            .form(&[("username", email), ("password", password)]);

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.is_success() {
            let status = response.status;
            warn!(status = %status, body = %response.body, "Login failed");
            return Err(AuthError::InvalidCredentials(format!(
                "HTTP {}: {}",
                status, response.body
            )));
        }

        let data: LoginResponse = response.decode()?;
        if !lifetime_in_range(data.expires_in) {
            warn!(expires_in = data.expires_in, "Login grant lifetime out of range");
            return Err(AuthError::InvalidGrant(format!(
                "expires_in out of range: {}",
                data.expires_in
            )));
        }
        info!(expires_in = data.expires_in, "Login accepted");
        Ok(data)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, RefreshError> {
        let request = ApiRequest::post(format!("{}/refresh", AUTH_PREFIX)).bearer(refresh_token);

        let response = self.transport.send(request).await.map_err(|e| match e {
            TransportError::NoResponse(detail) | TransportError::Body(detail) => {
                RefreshError::Network(detail)
            }
        })?;

        if !response.is_success() {
            let status = response.status;
            warn!(status = %status, body = %response.body, "Token refresh rejected");
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                body: response.body,
            });
        }

        let data = response.decode::<RefreshResponse>().map_err(|e| {
            warn!(error = %e, "Malformed refresh response");
            RefreshError::Network(format!("Malformed refresh response: {}", e))
        })?;
        if !lifetime_in_range(data.expires_in) {
            warn!(expires_in = data.expires_in, "Refresh grant lifetime out of range");
            return Err(RefreshError::Network(format!(
                "Malformed refresh response: expires_in out of range: {}",
                data.expires_in
            )));
        }
        Ok(data)
    }
}
