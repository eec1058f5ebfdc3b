//! Storage key constants.

/// Keys under which the session is persisted.
pub struct StorageKeys;

impl StorageKeys {
    /// Access token
    pub const ACCESS_TOKEN: &'static str = "accessToken";

    /// Refresh token
    pub const REFRESH_TOKEN: &'static str = "refreshToken";

    /// Access token expiry (RFC 3339)
    pub const ACCESS_TOKEN_EXPIRES_AT: &'static str = "accessTokenExpiresAt";

    /// Access token under the old snake_case layout. Deleted on load.
    pub const LEGACY_ACCESS_TOKEN: &'static str = "access_token";

    /// Refresh token under the old snake_case layout. Deleted on load.
    pub const LEGACY_REFRESH_TOKEN: &'static str = "refresh_token";

    /// Keys written by the current layout.
    pub const SESSION_KEYS: [&'static str; 3] = [
        Self::ACCESS_TOKEN,
        Self::REFRESH_TOKEN,
        Self::ACCESS_TOKEN_EXPIRES_AT,
    ];

    pub const LEGACY_KEYS: [&'static str; 2] =
        [Self::LEGACY_ACCESS_TOKEN, Self::LEGACY_REFRESH_TOKEN];
}
