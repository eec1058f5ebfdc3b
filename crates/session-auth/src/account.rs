//! Account endpoints around the session: registration, activation, password
//! management and the current-user profile.

use crate::api::AUTH_PREFIX;
use crate::client::AuthenticatedClient;
use crate::transport::{ApiRequest, ApiResponse};
use crate::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub id: Uuid,
    pub email: String,
    pub is_active: bool,
    pub is_superuser: bool,
}

/// Acknowledgement returned by the activation and password endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
    #[serde(default)]
    pub success: bool,
}

/// The logged-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub is_superuser: bool,
    pub is_active: bool,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Account operations. Only [`update_password`](Self::update_password) and
/// [`me`](Self::me) need a session.
#[derive(Debug, Clone)]
pub struct AccountClient {
    client: AuthenticatedClient,
}

impl AccountClient {
    pub fn new(client: AuthenticatedClient) -> Self {
        Self { client }
    }

    pub async fn register(&self, email: &str, password: &str) -> AuthResult<RegisterResponse> {
        let request = ApiRequest::post(format!("{}/register", AUTH_PREFIX))
            .json(&json!({ "email": email, "password": password }))?;
        let response = self.client.send_public(request).await?;

        if response.status == StatusCode::CONFLICT {
            warn!(email = %email, "Registration conflict");
            return Err(AuthError::Api {
                status: response.status.as_u16(),
                body: "An account with this email already exists".to_string(),
            });
        }

        let created: RegisterResponse = decode_success(response)?;
        info!(user_id = %created.id, "Account registered");
        Ok(created)
    }

    pub async fn activate(&self, email: &str, activation_code: &str) -> AuthResult<MessageResponse> {
        let request = ApiRequest::post(format!("{}/activate", AUTH_PREFIX))
            .json(&json!({ "email": email, "activation_code": activation_code }))?;
        decode_success(self.client.send_public(request).await?)
    }

    pub async fn forgot_password(&self, email: &str) -> AuthResult<MessageResponse> {
        let request = ApiRequest::post(format!("{}/forgot-password", AUTH_PREFIX))
            .json(&json!({ "email": email }))?;
        decode_success(self.client.send_public(request).await?)
    }

    pub async fn reset_password(&self, code: &str, new_password: &str) -> AuthResult<MessageResponse> {
        let request = ApiRequest::post(format!("{}/reset-password", AUTH_PREFIX))
            .json(&json!({ "code": code, "new_password": new_password }))?;
        decode_success(self.client.send_public(request).await?)
    }

    pub async fn update_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<MessageResponse> {
        self.client
            .put(
                &format!("{}/password", AUTH_PREFIX),
                &json!({
                    "current_password": current_password,
                    "new_password": new_password
                }),
            )
            .await
    }

    pub async fn me(&self) -> AuthResult<MeResponse> {
        self.client.get(&format!("{}/me", AUTH_PREFIX)).await
    }
}

fn decode_success<T: DeserializeOwned>(response: ApiResponse) -> AuthResult<T> {
    if !response.is_success() {
        warn!(status = %response.status, body = %response.body, "Account request failed");
    }
    response.error_for_status()?.decode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::harness::TestSession;
    use crate::transport::RequestBody;
    use reqwest::Method;

    #[tokio::test]
    async fn test_register_is_public() {
        let session = TestSession::new();
        session.transport.push_json(
            StatusCode::OK,
            json!({
                "id": "5b0a1f0e-6c1d-4b8e-9c43-7a1e2f3d4c5b",
                "email": "new@example.com",
                "is_active": false,
                "is_superuser": false
            }),
        );

        let created = session
            .accounts()
            .register("new@example.com", "hunter22")
            .await
            .unwrap();
        assert_eq!(created.email, "new@example.com");
        assert!(!created.is_active);

        let sent = session.transport.requests();
        assert_eq!(sent[0].method, Method::POST);
        assert_eq!(sent[0].path, "/api/v1/auth/register");
        assert!(sent[0].bearer_token().is_none());
        assert_eq!(
            sent[0].body,
            RequestBody::Json(json!({ "email": "new@example.com", "password": "hunter22" }))
        );
    }

    #[tokio::test]
    async fn test_register_conflict() {
        let session = TestSession::new();
        session
            .transport
            .push_json(StatusCode::CONFLICT, json!({ "detail": "exists" }));

        match session.accounts().register("dup@example.com", "pw").await {
            Err(AuthError::Api { status, body }) => {
                assert_eq!(status, 409);
                assert!(body.contains("already exists"));
            }
            other => panic!("Expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_activate_failure_surfaces_api_error() {
        let session = TestSession::new();
        session
            .transport
            .push_json(StatusCode::BAD_REQUEST, json!({ "detail": "Invalid code" }));

        let err = session
            .accounts()
            .activate("a@example.com", "000000")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert!(!err.is_session_ended());
    }

    #[tokio::test(start_paused = true)]
    async fn test_me_is_authenticated() {
        let session = TestSession::new();
        session.login(15).await;
        session.transport.push_json(
            StatusCode::OK,
            json!({
                "id": "5b0a1f0e-6c1d-4b8e-9c43-7a1e2f3d4c5b",
                "email": "user@example.com",
                "is_superuser": false,
                "is_active": true,
                "last_connected_at": null,
                "created_at": "2024-01-01T00:00:00Z",
                "updated_at": "2024-01-02T00:00:00Z"
            }),
        );

        let me = session.accounts().me().await.unwrap();
        assert_eq!(me.email, "user@example.com");
        assert!(me.last_connected_at.is_none());

        let sent = session.transport.requests();
        assert_eq!(sent[0].path, "/api/v1/auth/me");
        assert_eq!(sent[0].bearer_token(), Some("access-1"));
    }

    #[tokio::test]
    async fn test_update_password_without_session() {
        let session = TestSession::new();

        let err = session
            .accounts()
            .update_password("old", "new")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SessionExpired));
        assert!(session.transport.requests().is_empty());
    }
}
