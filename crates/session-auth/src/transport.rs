//! HTTP transport seam.
//!
//! [`Transport`] moves one request to the backend and brings back whatever
//! response arrived. It knows nothing about sessions: credentials are
//! attached by the caller through [`ApiRequest::bearer`].

use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use client_config_and_utils::Config;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Request body encodings used by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

/// A request relative to the API base URL.
#[derive(Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path beginning with `/`, e.g. `/api/v1/auth/me`.
    pub path: String,
    pub body: RequestBody,
    pub headers: Vec<(String, String)>,
    bearer: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RequestBody::Empty,
            headers: Vec::new(),
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> AuthResult<Self> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        self.body = RequestBody::Form(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Attach `Authorization: Bearer <token>`, replacing any earlier token.
    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer.as_deref()
    }
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("authenticated", &self.bearer.is_some())
            .finish_non_exhaustive()
    }
}

/// A response that made it back from the server, whatever its status.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, content_type: Option<&str>, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body: body.into(),
        }
    }

    /// A JSON response with the given status.
    pub fn json(status: StatusCode, body: &serde_json::Value) -> Self {
        Self::new(status, Some("application/json"), body.to_string())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("application/json"))
    }

    /// Turn a non-success status into [`AuthError::Api`].
    pub fn error_for_status(self) -> AuthResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(AuthError::Api {
                status: self.status.as_u16(),
                body: self.body,
            })
        }
    }

    /// Decode the body.
    ///
    /// 204/205 and empty bodies decode as JSON `null`, so `()` and `Option<T>`
    /// work for endpoints without content. Non-JSON bodies decode as a JSON
    /// string.
    pub fn decode<T: DeserializeOwned>(&self) -> AuthResult<T> {
        let no_content = matches!(
            self.status,
            StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT
        );
        if no_content || self.body.trim().is_empty() {
            return Ok(serde_json::from_value(serde_json::Value::Null)?);
        }
        if self.is_json() {
            return Ok(serde_json::from_str(&self.body)?);
        }
        Ok(serde_json::from_value(serde_json::Value::String(
            self.body.clone(),
        ))?)
    }
}

/// Transport-level failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request produced no HTTP response at all (connection refused,
    /// reset, DNS, TLS, timeout, or a browser-style CORS block hiding a 401).
    #[error("No response: {0}")]
    NoResponse(String),

    /// A response arrived but its body could not be read.
    #[error("Failed to read response body: {0}")]
    Body(String),
}

/// Sends API requests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// [`Transport`] over reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
    http_client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout: Duration) -> AuthResult<Self> {
        url::Url::parse(base_url)?;
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> AuthResult<Self> {
        Self::new(&config.api_origin(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self.http_client.request(request.method.clone(), &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = request.bearer_token() {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(fields) => builder.form(fields),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::NoResponse(e.to_string()))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        debug!(status = %status, url = %url, "Received response");

        Ok(ApiResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    #[test]
    fn test_decode_json() {
        let response = ApiResponse::json(StatusCode::OK, &serde_json::json!({ "id": 7 }));
        let item: Item = response.decode().unwrap();
        assert_eq!(item, Item { id: 7 });
    }

    #[test]
    fn test_decode_no_content() {
        let response = ApiResponse::new(StatusCode::NO_CONTENT, None, "");
        let _: () = response.decode().unwrap();

        let response = ApiResponse::new(StatusCode::RESET_CONTENT, None, "ignored");
        let nothing: Option<Item> = response.decode().unwrap();
        assert!(nothing.is_none());
    }

    #[test]
    fn test_decode_text_body() {
        let response = ApiResponse::new(StatusCode::OK, Some("text/plain"), "pong");
        let text: String = response.decode().unwrap();
        assert_eq!(text, "pong");
    }

    #[test]
    fn test_error_for_status() {
        let response = ApiResponse::new(StatusCode::CONFLICT, Some("application/json"), "{}");
        match response.error_for_status() {
            Err(AuthError::Api { status, .. }) => assert_eq!(status, 409),
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn test_request_debug_hides_token() {
        let request = ApiRequest::get("/api/v1/auth/me").bearer("very-secret");
        let debug = format!("{:?}", request);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("authenticated: true"));
        assert_eq!(request.bearer_token(), Some("very-secret"));
    }

    #[test]
    fn test_form_body() {
        let request = ApiRequest::post("/login").form(&[("username", "a@b.c"), ("password", "pw")]);
        assert_eq!(
            request.body,
            RequestBody::Form(vec![
                ("username".to_string(), "a@b.c".to_string()),
                ("password".to_string(), "pw".to_string()),
            ])
        );
    }

    #[test]
    fn test_transport_rejects_invalid_base_url() {
        assert!(matches!(
            ReqwestTransport::new("not a url", Duration::from_secs(1)),
            Err(AuthError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_transport_trims_trailing_slash() {
        let transport = ReqwestTransport::new("http://localhost:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(transport.base_url(), "http://localhost:8000");
    }
}
