//! Wiring from configuration to a ready-to-use session.
//!
//! `SessionRuntime` is the one place that knows how the pieces fit together:
//! file storage under the base dir, a token store on the system clock, the
//! HTTP transport, the auth endpoints, the session manager and the clients
//! that depend on it.

use crate::account::AccountClient;
use crate::api::{AuthApi, HttpAuthApi};
use crate::client::AuthenticatedClient;
use crate::session::{Renewal, SessionManager, SessionSnapshot};
use crate::transport::{ReqwestTransport, Transport};
use crate::AuthResult;
use client_config_and_utils::{Config, Paths};
use std::sync::Arc;
use token_storage::{create_storage, KeyValueStorage, SystemClock, TokenStore};
use tracing::{debug, info};

/// Shared session runtime for a client process.
#[derive(Clone)]
pub struct SessionRuntime {
    session: SessionManager,
    client: AuthenticatedClient,
    accounts: AccountClient,
}

impl SessionRuntime {
    /// Build the runtime from config, persisting tokens under `paths`.
    pub fn from_config(config: &Config, paths: &Paths) -> AuthResult<Self> {
        paths.ensure_dirs()?;
        let storage = create_storage(&paths.session_store_file())?;
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::from_config(config)?);

        debug!(
            api_base_url = %config.api_base_url,
            session_file = %paths.session_store_file().display(),
            "Building session runtime"
        );
        Ok(Self::with_parts(config, storage, transport))
    }

    /// Assemble the runtime over an explicit storage and transport.
    pub fn with_parts(
        config: &Config,
        storage: Box<dyn KeyValueStorage>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let store = TokenStore::load(storage, Arc::new(SystemClock), config.refresh_window());
        let api: Arc<dyn AuthApi> = Arc::new(HttpAuthApi::new(transport.clone()));
        let session = SessionManager::new(store, api);
        let client = AuthenticatedClient::new(session.clone(), transport)
            .with_masked_network_retry(config.retry_masked_network_failures);
        let accounts = AccountClient::new(client.clone());

        Self {
            session,
            client,
            accounts,
        }
    }

    /// Arm renewal for a persisted session. Returns whether one is live.
    pub async fn start(&self) -> AuthResult<bool> {
        let live = self.session.resume().await?;
        info!(live, "Session runtime started");
        Ok(live)
    }

    pub async fn login(&self, email: &str, password: &str) -> AuthResult<Renewal> {
        self.session.login(email, password).await
    }

    pub fn logout(&self) {
        self.session.logout();
    }

    pub fn status(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    pub fn accounts(&self) -> &AccountClient {
        &self.accounts
    }
}

impl std::fmt::Debug for SessionRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRuntime")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
