use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::warn;

const SERVICE_NAME: &str = "billman";

/// Single keyring entry holding the serialized token pair. Storing both
/// tokens as one value keeps the persisted pair both-or-never partial.
const TOKENS_KEY: &str = "session-tokens";

/// Buffer subtracted from the server-reported expiry before a token is
/// treated as expired, covering clock skew and request latency.
const EXPIRY_BUFFER_SECS: i64 = 30;

/// Access/refresh token pair with the access token's expiry.
///
/// The refresh token is single-use: the server rotates it on every
/// exchange, so a stale pair can never be partially reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Derived from the server's `expires_in` at issue time; `None` when
    /// the server did not report one.
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenPair {
    pub fn issued(access_token: String, refresh_token: String, expires_in: Option<i64>) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }

    /// Check whether the access token is past (or within the buffer of)
    /// its expiry. Pairs without an expiry are never considered expired;
    /// the server's 401 is authoritative for those.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() + Duration::seconds(EXPIRY_BUFFER_SECS) > at,
            None => false,
        }
    }
}

/// At-rest storage for the token pair.
///
/// The session manager is the only caller; everything else reads tokens
/// through the manager's accessors.
pub trait CredentialStore: Send + Sync {
    fn store_tokens(&self, tokens: &TokenPair) -> Result<()>;
    fn load_tokens(&self) -> Result<Option<TokenPair>>;
    fn clear_tokens(&self) -> Result<()>;
}

/// OS keychain storage via `keyring` - the strictest at-rest protection
/// available without managing key material ourselves.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    /// Use a non-default service name, e.g. to separate staging and
    /// production sessions on one machine.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, TOKENS_KEY).context("Failed to create keyring entry")
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStore {
    fn store_tokens(&self, tokens: &TokenPair) -> Result<()> {
        let payload = serde_json::to_string(tokens).context("Failed to serialize token pair")?;
        self.entry()?
            .set_password(&payload)
            .context("Failed to store tokens in keychain")
    }

    fn load_tokens(&self) -> Result<Option<TokenPair>> {
        let entry = self.entry()?;
        let payload = match entry.get_password() {
            Ok(payload) => payload,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(e).context("Failed to read tokens from keychain"),
        };
        match serde_json::from_str(&payload) {
            Ok(tokens) => Ok(Some(tokens)),
            Err(error) => {
                // A corrupt entry reads as "no session", not a fatal error.
                warn!(%error, "Stored token payload unreadable, discarding");
                let _ = entry.delete_credential();
                Ok(None)
            }
        }
    }

    fn clear_tokens(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete tokens from keychain"),
        }
    }
}

/// In-process store for tests and local development, where the OS
/// keychain is unavailable or undesirable.
#[derive(Default)]
pub struct MemoryStore {
    tokens: std::sync::Mutex<Option<TokenPair>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a pre-seeded pair, as if a previous run had persisted it.
    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            tokens: std::sync::Mutex::new(Some(tokens)),
        }
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, Option<TokenPair>>> {
        self.tokens.lock().map_err(|_| anyhow!("token store poisoned"))
    }
}

impl CredentialStore for MemoryStore {
    fn store_tokens(&self, tokens: &TokenPair) -> Result<()> {
        *self.guard()? = Some(tokens.clone());
        Ok(())
    }

    fn load_tokens(&self) -> Result<Option<TokenPair>> {
        Ok(self.guard()?.clone())
    }

    fn clear_tokens(&self) -> Result<()> {
        *self.guard()? = None;
        Ok(())
    }
}
