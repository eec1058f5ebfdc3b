//! In-memory session tokens with write-through persistence.

use crate::{Clock, KeyValueStorage, StorageError, StorageKeys, StorageResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Renew once less than this much access-token lifetime remains.
pub const DEFAULT_REFRESH_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Delete keys written by the old snake_case layout. Safe to run repeatedly.
pub fn migrate_legacy_keys(storage: &dyn KeyValueStorage) {
    for key in StorageKeys::LEGACY_KEYS {
        match storage.delete(key) {
            Ok(true) => debug!(key, "Removed legacy storage key"),
            Ok(false) => {}
            Err(e) => warn!(key, error = %e, "Failed to remove legacy storage key"),
        }
    }
}

/// `now + lifetime_minutes`, or `None` if that instant is not representable.
pub fn expiry_after(now: DateTime<Utc>, lifetime_minutes: i64) -> Option<DateTime<Utc>> {
    ChronoDuration::try_minutes(lifetime_minutes)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
}

/// Access token, refresh token and access-token expiry.
///
/// Every mutation is mirrored to the backing storage before it returns.
/// Storage failures are logged and do not fail the caller; the in-memory
/// values stay authoritative for the life of the process.
pub struct TokenStore {
    storage: Box<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    refresh_window: Duration,
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenStore {
    /// Remove legacy keys, then restore whatever session the storage holds.
    pub fn load(
        storage: Box<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
        refresh_window: Duration,
    ) -> Self {
        migrate_legacy_keys(storage.as_ref());

        let access_token = read_key(storage.as_ref(), StorageKeys::ACCESS_TOKEN);
        let refresh_token = read_key(storage.as_ref(), StorageKeys::REFRESH_TOKEN);
        let expires_at = read_key(storage.as_ref(), StorageKeys::ACCESS_TOKEN_EXPIRES_AT)
            .and_then(|raw| match DateTime::parse_from_rfc3339(&raw) {
                Ok(parsed) => Some(parsed.with_timezone(&Utc)),
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed access token expiry");
                    None
                }
            });

        let store = Self {
            storage,
            clock,
            refresh_window,
            access_token,
            refresh_token,
            expires_at,
        };
        debug!(
            has_session = store.has_session(),
            expires_at = ?store.expires_at,
            "Token store loaded"
        );
        store
    }

    /// Replace the whole session. `lifetime_minutes` counts from now and may be
    /// zero or negative, which yields an already-expired token.
    ///
    /// A lifetime with no representable expiry is refused and nothing changes.
    pub fn save(
        &mut self,
        access_token: &str,
        refresh_token: &str,
        lifetime_minutes: i64,
    ) -> StorageResult<()> {
        let expires_at = self.expiry_from_now(lifetime_minutes)?;

        self.access_token = Some(access_token.to_string());
        self.refresh_token = Some(refresh_token.to_string());
        self.expires_at = Some(expires_at);

        self.write(StorageKeys::ACCESS_TOKEN, access_token);
        self.write(StorageKeys::REFRESH_TOKEN, refresh_token);
        self.write(StorageKeys::ACCESS_TOKEN_EXPIRES_AT, &expires_at.to_rfc3339());
        Ok(())
    }

    /// Replace the access token and its expiry. The refresh token is kept.
    pub fn update_access_token(
        &mut self,
        access_token: &str,
        lifetime_minutes: i64,
    ) -> StorageResult<()> {
        let expires_at = self.expiry_from_now(lifetime_minutes)?;

        self.access_token = Some(access_token.to_string());
        self.expires_at = Some(expires_at);

        self.write(StorageKeys::ACCESS_TOKEN, access_token);
        self.write(StorageKeys::ACCESS_TOKEN_EXPIRES_AT, &expires_at.to_rfc3339());
        Ok(())
    }

    /// Forget the session in memory and in storage.
    pub fn clear(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.expires_at = None;

        for key in StorageKeys::SESSION_KEYS {
            if let Err(e) = self.storage.delete(key) {
                warn!(key, error = %e, "Failed to delete session key");
            }
        }
    }

    /// Both tokens are present. A half-populated session counts as none.
    pub fn has_session(&self) -> bool {
        is_present(&self.access_token) && is_present(&self.refresh_token)
    }

    /// The access token, if a complete session exists.
    pub fn access_token(&self) -> Option<&str> {
        if self.has_session() {
            self.access_token.as_deref()
        } else {
            None
        }
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn refresh_window(&self) -> Duration {
        self.refresh_window
    }

    /// No expiry is known, or it has passed.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => self.clock.now() >= expires_at,
            None => true,
        }
    }

    /// Remaining access-token lifetime, zero once expired or unknown.
    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at
            .and_then(|expires_at| (expires_at - self.clock.now()).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    /// Still valid, but inside the refresh window.
    pub fn should_proactively_refresh(&self) -> bool {
        let remaining = self.time_until_expiry();
        !remaining.is_zero() && remaining < self.refresh_window
    }

    fn expiry_from_now(&self, lifetime_minutes: i64) -> StorageResult<DateTime<Utc>> {
        expiry_after(self.clock.now(), lifetime_minutes)
            .ok_or(StorageError::LifetimeOutOfRange(lifetime_minutes))
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set(key, value) {
            warn!(key, error = %e, "Failed to persist session key");
        }
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("has_session", &self.has_session())
            .field("expires_at", &self.expires_at)
            .field("refresh_window", &self.refresh_window)
            .finish_non_exhaustive()
    }
}

fn read_key(storage: &dyn KeyValueStorage, key: &str) -> Option<String> {
    match storage.get(key) {
        Ok(value) => value.filter(|v| !v.is_empty()),
        Err(e) => {
            warn!(key, error = %e, "Failed to read session key");
            None
        }
    }
}

fn is_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}
