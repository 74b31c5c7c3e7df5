//! Access-token persistence.
//!
//! Pure storage with no policy: the session manager decides when to write or
//! clear. Reads never fail; a storage problem is logged and reported as an
//! absent credential. Tokens are never logged in full.

use std::sync::Arc;
use std::time::Duration;

use docdesk_types::UserProfile;
use mockable::{Clock, DefaultClock};
use serde_json::Value;

use crate::storage::SessionStorage;

const ACCESS_TOKEN_KEY: &str = "access_token";
const TOKEN_EXPIRY_KEY: &str = "token_expiry";
const REFRESH_TOKEN_KEY: &str = "refresh_token";
const USER_DATA_KEY: &str = "user_data";

/// Remaining lifetime below which a token counts as expiring soon.
pub const EXPIRING_SOON_THRESHOLD: Duration = Duration::from_millis(300_000);

/// A stored access token and the instant it stops being valid.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at_ms: u64,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &mask_token(&self.token))
            .field("expires_at_ms", &self.expires_at_ms)
            .finish()
    }
}

/// Why a cached identity could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    Missing,
    Unreadable(String),
}

#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn SessionStorage>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self::with_clock(storage, Arc::new(DefaultClock))
    }

    pub fn with_clock(
        storage: Arc<dyn SessionStorage>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self { storage, clock }
    }

    /// The stored credential, or `None` when absent or expired.
    ///
    /// An expired credential is cleared as a side effect.
    pub fn get(&self) -> Option<Credential> {
        let token = self.read(ACCESS_TOKEN_KEY)?;
        let expiry = self.read(TOKEN_EXPIRY_KEY)?;
        if token.is_empty() {
            return None;
        }

        let Ok(expires_at_ms) = expiry.trim().parse::<u64>() else {
            tracing::warn!("stored token expiry is not a number; discarding credential");
            self.clear();
            return None;
        };

        if expires_at_ms <= self.now_ms() {
            tracing::debug!(token = %mask_token(&token), "stored credential expired");
            self.clear();
            return None;
        }

        Some(Credential {
            token,
            expires_at_ms,
        })
    }

    /// Stores `token`, valid for `ttl` from now. Replaces any previous one.
    pub fn set(&self, token: &str, ttl: Duration) -> anyhow::Result<Credential> {
        let expires_at_ms = self
            .now_ms()
            .saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX));
        self.storage.set(ACCESS_TOKEN_KEY, token)?;
        self.storage
            .set(TOKEN_EXPIRY_KEY, &expires_at_ms.to_string())?;
        tracing::debug!(token = %mask_token(token), expires_at_ms, "stored credential");
        Ok(Credential {
            token: token.to_string(),
            expires_at_ms,
        })
    }

    /// Removes the token, its expiry, any refresh token and the cached
    /// identity. Safe to call repeatedly.
    pub fn clear(&self) {
        for key in [
            ACCESS_TOKEN_KEY,
            TOKEN_EXPIRY_KEY,
            REFRESH_TOKEN_KEY,
            USER_DATA_KEY,
        ] {
            if let Err(e) = self.storage.remove(key) {
                tracing::warn!("failed to clear {key}: {e:#}");
            }
        }
    }

    /// True when less than five minutes remain, or nothing is stored.
    pub fn is_expiring_soon(&self) -> bool {
        let Some(expiry) = self.read(TOKEN_EXPIRY_KEY) else {
            return true;
        };
        let Ok(expires_at_ms) = expiry.trim().parse::<u64>() else {
            return true;
        };
        let threshold = EXPIRING_SOON_THRESHOLD.as_millis() as u64;
        expires_at_ms.saturating_sub(self.now_ms()) < threshold
    }

    /// The identity cached at login.
    pub fn identity(&self) -> Result<UserProfile, IdentityError> {
        let raw = self.read(USER_DATA_KEY).ok_or(IdentityError::Missing)?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| IdentityError::Unreadable(e.to_string()))?;
        if !value.is_object() {
            return Err(IdentityError::Unreadable("not a JSON object".to_string()));
        }
        serde_json::from_value(value).map_err(|e| IdentityError::Unreadable(e.to_string()))
    }

    pub fn set_identity(&self, user: &UserProfile) -> anyhow::Result<()> {
        let raw = serde_json::to_string(user)?;
        self.storage.set(USER_DATA_KEY, &raw)
    }

    // Epoch milliseconds; a clock before 1970 reads as 0.
    fn now_ms(&self) -> u64 {
        u64::try_from(self.clock.utc().timestamp_millis()).unwrap_or(0)
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("failed to read {key} from session storage: {e:#}");
                None
            }
        }
    }
}

/// Masks a token for display, showing only the first and last 4 characters.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
