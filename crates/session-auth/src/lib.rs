//! Session and token lifecycle for the API client.
//!
//! - [`SessionManager`] drives the session state machine, keeps one renewal
//!   timer armed ahead of access-token expiry and runs at most one refresh at a
//!   time.
//! - [`AuthenticatedClient`] attaches the bearer token to requests and gives
//!   each request one refresh-and-retry on a 401.
//! - [`SessionRuntime`] builds all of it from a [`client_config_and_utils::Config`].

mod account;
mod api;
mod auth_fsm;
mod client;
mod error;
mod runtime;
mod session;
mod transport;

#[cfg(test)]
mod tests;

pub use account::{AccountClient, MeResponse, MessageResponse, RegisterResponse};
pub use api::{AuthApi, HttpAuthApi, LoginResponse, RefreshResponse, AUTH_PREFIX};
pub use auth_fsm::{SessionState, StateChangedPayload};
pub use client::{AuthenticatedClient, MAX_AUTH_RETRIES};
pub use error::{AuthError, AuthResult, RefreshError, SessionEndReason};
pub use runtime::SessionRuntime;
pub use session::{
    Renewal, SessionEndedCallback, SessionManager, SessionSnapshot, StateCallback,
    MIN_RENEWAL_DELAY,
};
pub use transport::{
    ApiRequest, ApiResponse, RequestBody, ReqwestTransport, Transport, TransportError,
};
