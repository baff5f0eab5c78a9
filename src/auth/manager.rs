//! The session manager: sole owner of token state and the authenticated
//! identity bootstrap.
//!
//! All protected traffic funnels through the request chokepoint, which
//! attaches the bearer token, and on an unauthorized response runs one
//! deduplicated refresh exchange and one replay. Conceptually the session
//! moves through no-session -> authenticated -> refreshing and back, with
//! a terminal branch that clears storage and notifies the registered
//! auth-error handler exactly once.

use std::sync::Arc;

use anyhow::Result;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::api::{ApiError, LoginError};
use crate::auth::credentials::{CredentialStore, TokenPair};
use crate::auth::session::SessionData;
use crate::config::Config;
use crate::models::{CurrentUserReply, DatabaseSummary, ServerMode};

// ============================================================================
// Constants
// ============================================================================

const LOGIN_PATH: &str = "/api/v2/auth/login";
const REFRESH_PATH: &str = "/api/v2/auth/refresh";
const LOGOUT_PATH: &str = "/api/v2/auth/logout";
const ME_PATH: &str = "/api/v2/me";

/// Header carrying the selected database on protected requests.
const DATABASE_HEADER: &str = "X-Database";

/// Server-recognized selector for the all-databases view.
pub const ALL_DATABASES: &str = "_all_";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Outcomes
// ============================================================================

/// Result of `initialize()`: a definite outcome, never an error.
#[derive(Debug, Clone)]
pub enum Bootstrap {
    Session(SessionData),
    NoSession,
}

/// Result of one refresh exchange.
///
/// `Rejected` means the server refused the refresh token itself - the
/// session is terminated. `TransportError` mutates nothing; the
/// triggering request fails retryably.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    Rejected,
    TransportError,
}

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;
type AuthErrorHandler = Arc<dyn Fn() + Send + Sync>;

// ============================================================================
// Wire types
// ============================================================================

/// `{success, data, error}` envelope wrapping v2 responses.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    databases: Vec<DatabaseSummary>,
}

#[derive(Debug, Deserialize)]
struct RefreshData {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

fn extract_error(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("error")?.as_str().map(|s| s.to_string())
}

// ============================================================================
// Session manager
// ============================================================================

struct Inner {
    http: Client,
    base_url: String,
    store: Arc<dyn CredentialStore>,
    config: Mutex<Config>,
    tokens: RwLock<Option<TokenPair>>,
    session: RwLock<Option<SessionData>>,
    current_db: RwLock<Option<String>>,
    /// Single-flight cell: concurrent refresh demands attach to the same
    /// in-flight exchange instead of issuing their own.
    refresh_cell: Mutex<Option<SharedRefresh>>,
    handler: Mutex<Option<AuthErrorHandler>>,
}

/// Owner of the token pair, the identity snapshot, and the current
/// database selection. The credential store is written from here and
/// nowhere else.
///
/// Clone is cheap - clones share the same session state and the same
/// reqwest connection pool.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(config: Config, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let base_url = config.server_url.trim_end_matches('/').to_string();
        let current_db = config.current_db.clone();

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                store,
                config: Mutex::new(config),
                tokens: RwLock::new(None),
                session: RwLock::new(None),
                current_db: RwLock::new(current_db),
                refresh_cell: Mutex::new(None),
                handler: Mutex::new(None),
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    // ===== Lifecycle Operations =====

    /// Rehydrate the session persisted by a previous run.
    ///
    /// Resolves to a definite outcome: a verified session, or no session.
    /// Persisted tokens are cleared only when the server rejects them; an
    /// unreachable server leaves them for the next launch.
    pub async fn initialize(&self) -> Bootstrap {
        let pair = match self.inner.store.load_tokens() {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                debug!("no persisted session");
                return Bootstrap::NoSession;
            }
            Err(error) => {
                warn!(%error, "credential store unreadable, starting signed out");
                return Bootstrap::NoSession;
            }
        };

        info!("persisted session found, verifying");
        *self.inner.tokens.write().await = Some(pair);

        match self.fetch_current_user().await {
            Ok(session) => {
                info!(username = %session.user.username, "session restored");
                Bootstrap::Session(session)
            }
            Err(ApiError::Unauthorized) | Err(ApiError::AccessDenied(_)) => {
                // The chokepoint already gave the refresh token its one
                // chance; this is a dead session.
                self.terminate_session().await;
                Bootstrap::NoSession
            }
            Err(error) => {
                // Unreachable or misbehaving server: keep the persisted
                // pair for the next launch, start this one signed out.
                warn!(%error, "identity verification unavailable, starting signed out");
                self.inner.tokens.write().await.take();
                *self.inner.session.write().await = None;
                Bootstrap::NoSession
            }
        }
    }

    /// Authenticate with username/password, replacing any prior session.
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionData, LoginError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(LoginError::InvalidCredentials(
                "Username and password are required".to_string(),
            ));
        }

        info!(username, "logging in");
        self.inner.tokens.write().await.take();
        *self.inner.session.write().await = None;

        let body = serde_json::json!({ "username": username, "password": password });
        let response = self
            .inner
            .http
            .post(self.url(LOGIN_PATH))
            .json(&body)
            .send()
            .await
            .map_err(|e| LoginError::Network(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LoginError::Network(e.to_string()))?;

        if status == StatusCode::UNAUTHORIZED {
            debug!(username, "login rejected");
            let message = extract_error(&text)
                .unwrap_or_else(|| "Invalid username or password".to_string());
            return Err(LoginError::InvalidCredentials(message));
        }
        if !status.is_success() {
            let message = extract_error(&text).unwrap_or_else(|| format!("Status {status}"));
            return Err(LoginError::Server(message));
        }

        let envelope: Envelope<LoginData> = serde_json::from_str(&text)
            .map_err(|e| LoginError::Server(format!("Malformed login response: {e}")))?;
        let success = envelope.success;
        let data = match envelope.data.filter(|_| success) {
            Some(data) => data,
            None => {
                let message = envelope
                    .error
                    .unwrap_or_else(|| "Login refused".to_string());
                return Err(LoginError::Server(message));
            }
        };

        let pair = TokenPair::issued(data.access_token, data.refresh_token, data.expires_in);
        self.persist_tokens(pair)
            .await
            .map_err(|e| LoginError::Storage(e.to_string()))?;

        // Same identity bootstrap as initialize, so login and rehydration
        // produce the same session shape.
        let mut session = self.fetch_current_user().await.map_err(LoginError::from)?;

        // Older servers return the database list only on login.
        if session.databases.is_empty() && !data.databases.is_empty() {
            session.databases = data.databases;
            *self.inner.session.write().await = Some(session.clone());
        }

        // First accessible database becomes the selection when nothing
        // was chosen yet.
        if self.inner.current_db.read().await.is_none() {
            if let Some(first) = session.databases.first() {
                let name = first.name.clone();
                debug!(db = %name, "selecting first accessible database");
                self.set_current_db(Some(name.clone())).await;
                session.current_db = Some(name.clone());
                if let Some(snapshot) = self.inner.session.write().await.as_mut() {
                    snapshot.current_db = Some(name);
                }
            }
        }

        {
            let mut config = self.inner.config.lock().await;
            config.last_username = Some(username.to_string());
            if let Err(error) = config.save() {
                warn!(%error, "failed to persist config");
            }
        }

        info!(username, "login complete");
        Ok(session)
    }

    /// Revoke the refresh token remotely (best-effort) and clear all
    /// local session state. Always succeeds locally.
    pub async fn logout(&self) {
        let refresh_token = self
            .inner
            .tokens
            .read()
            .await
            .as_ref()
            .map(|pair| pair.refresh_token.clone());

        if let Some(refresh_token) = refresh_token {
            let body = serde_json::json!({ "refresh_token": refresh_token });
            match self
                .inner
                .http
                .post(self.url(LOGOUT_PATH))
                .json(&body)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    debug!("refresh token revoked")
                }
                Ok(response) => warn!(status = %response.status(), "remote logout refused"),
                Err(error) => warn!(%error, "remote logout unreachable"),
            }
        }

        self.inner.tokens.write().await.take();
        *self.inner.session.write().await = None;
        if let Err(error) = self.inner.store.clear_tokens() {
            warn!(%error, "failed to clear persisted tokens");
        }
        info!("signed out");
    }

    /// Exchange the refresh token for a new pair, deduplicated: at most
    /// one exchange is on the wire at a time, and concurrent callers
    /// share its outcome. Refresh tokens are single-use server-side, so a
    /// duplicate exchange would invalidate the session.
    pub async fn refresh_access_token(&self) -> RefreshOutcome {
        let (exchange, initiated) = {
            let mut cell = self.inner.refresh_cell.lock().await;
            match cell.as_ref() {
                Some(shared) => (shared.clone(), false),
                None => {
                    let manager = self.clone();
                    let shared = async move { manager.exchange_refresh_token().await }
                        .boxed()
                        .shared();
                    *cell = Some(shared.clone());
                    (shared, true)
                }
            }
        };

        let outcome = exchange.await;
        if initiated {
            self.inner.refresh_cell.lock().await.take();
        }
        outcome
    }

    async fn exchange_refresh_token(&self) -> RefreshOutcome {
        let refresh_token = match self.inner.tokens.read().await.as_ref() {
            Some(pair) => pair.refresh_token.clone(),
            None => {
                debug!("refresh requested without a refresh token");
                return RefreshOutcome::Rejected;
            }
        };

        debug!("exchanging refresh token");
        // Sent directly, not through the authed chokepoint: a 401 here
        // must not recurse into another refresh.
        let body = serde_json::json!({ "refresh_token": refresh_token });
        let response = match self
            .inner
            .http
            .post(self.url(REFRESH_PATH))
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                warn!(%error, "refresh exchange unreachable");
                return RefreshOutcome::TransportError;
            }
        };

        let status = response.status();
        if status.is_client_error() {
            warn!(%status, "refresh token rejected");
            self.terminate_session().await;
            return RefreshOutcome::Rejected;
        }
        if !status.is_success() {
            warn!(%status, "refresh exchange failed upstream");
            return RefreshOutcome::TransportError;
        }

        let envelope: Envelope<RefreshData> = match response.json().await {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(%error, "malformed refresh response");
                return RefreshOutcome::TransportError;
            }
        };
        let success = envelope.success;
        let data = match envelope.data.filter(|_| success) {
            Some(data) => data,
            None => {
                warn!("refresh response carried no tokens");
                return RefreshOutcome::TransportError;
            }
        };

        let pair = TokenPair::issued(data.access_token, data.refresh_token, data.expires_in);
        if let Err(error) = self.persist_tokens(pair).await {
            // Without the store write the new pair never becomes
            // authoritative.
            warn!(%error, "failed to persist refreshed tokens");
            return RefreshOutcome::TransportError;
        }
        info!("session refreshed");
        RefreshOutcome::Refreshed
    }

    /// Fetch and normalize the current user, updating the identity
    /// snapshot and reconciling the database selection.
    pub async fn fetch_current_user(&self) -> Result<SessionData, ApiError> {
        let value = self.request_value(Method::GET, ME_PATH, None).await?;
        let reply = CurrentUserReply::from_value(value);
        let Some((user, databases, server_selection)) = reply.normalize() else {
            return Err(ApiError::InvalidResponse(
                "identity response carried no user data".to_string(),
            ));
        };

        let client_selection = self.inner.current_db.read().await.clone();
        let selected = match client_selection.or(server_selection) {
            Some(name) if name == ALL_DATABASES || databases.iter().any(|db| db.name == name) => {
                Some(name)
            }
            Some(name) => {
                warn!(db = %name, "selected database no longer accessible, clearing selection");
                None
            }
            None => None,
        };

        let session = SessionData {
            user,
            databases,
            current_db: selected.clone(),
        };
        self.set_current_db(selected).await;
        *self.inner.session.write().await = Some(session.clone());
        Ok(session)
    }

    /// Register the callback fired when a request fails auth and refresh
    /// cannot recover it. Single slot: the latest registration wins.
    pub async fn set_auth_error_handler<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.inner.handler.lock().await = Some(Arc::new(handler));
    }

    /// Choose the database sent with protected requests. The name must
    /// be accessible to the current session (or the all-databases
    /// selector).
    pub async fn select_database(&self, name: &str) -> Result<(), ApiError> {
        let accessible = {
            let session = self.inner.session.read().await;
            match session.as_ref() {
                Some(session) => name == ALL_DATABASES || session.can_access(name),
                None => false,
            }
        };
        if !accessible {
            return Err(ApiError::AccessDenied(format!(
                "database '{name}' is not accessible"
            )));
        }

        self.set_current_db(Some(name.to_string())).await;
        if let Some(session) = self.inner.session.write().await.as_mut() {
            session.current_db = Some(name.to_string());
        }
        Ok(())
    }

    // ===== Accessors =====

    pub async fn is_authenticated(&self) -> bool {
        self.inner.session.read().await.is_some()
    }

    pub async fn session_data(&self) -> Option<SessionData> {
        self.inner.session.read().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.inner
            .tokens
            .read()
            .await
            .as_ref()
            .map(|pair| pair.access_token.clone())
    }

    pub async fn current_database(&self) -> Option<String> {
        self.inner.current_db.read().await.clone()
    }

    pub async fn configured_server_mode(&self) -> ServerMode {
        self.inner.config.lock().await.server_mode
    }

    pub async fn last_username(&self) -> Option<String> {
        self.inner.config.lock().await.last_username.clone()
    }

    // ===== Request Chokepoint =====

    /// Send a protected request and return the response body as JSON.
    ///
    /// Attaches the bearer token and the selected-database header. An
    /// unauthorized response triggers the deduplicated refresh and one
    /// replay with the new token; a request is never replayed twice.
    pub(crate) async fn request_value(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        // A pair known to be expired would only buy a guaranteed 401;
        // exchange it up front. The single-flight cell keeps this safe
        // under concurrency.
        let expired = self
            .inner
            .tokens
            .read()
            .await
            .as_ref()
            .map(|pair| pair.is_expired())
            .unwrap_or(false);
        if expired {
            debug!(path, "access token expired, refreshing before request");
            self.refresh_access_token().await;
        }

        let response = self.send(method.clone(), path, body, true).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::read_json(response).await;
        }

        debug!(path, "unauthorized response, attempting recovery");
        match self.refresh_access_token().await {
            RefreshOutcome::Refreshed => {
                let response = self.send(method, path, body, true).await?;
                // A second 401 propagates as-is; no further replays.
                Self::read_json(response).await
            }
            RefreshOutcome::Rejected | RefreshOutcome::TransportError => {
                Err(ApiError::Unauthorized)
            }
        }
    }

    /// Typed protected GET, unwrapping the v2 envelope.
    pub(crate) async fn get_authed<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let value = self.request_value(Method::GET, path, None).await?;
        Self::unwrap_envelope(value)
    }

    /// Typed unauthenticated GET, unwrapping the v2 envelope.
    pub(crate) async fn get_public<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(Method::GET, path, None, false).await?;
        let value = Self::read_json(response).await?;
        Self::unwrap_envelope(value)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        authed: bool,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = self.inner.http.request(method, self.url(path));

        if authed {
            let (token, database) = {
                let tokens = self.inner.tokens.read().await;
                let database = self.inner.current_db.read().await;
                (
                    tokens.as_ref().map(|pair| pair.access_token.clone()),
                    database.clone(),
                )
            };
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            if let Some(database) = database {
                request = request.header(DATABASE_HEADER, database);
            }
        }

        if let Some(body) = body {
            request = request.json(body);
        }

        Ok(request.send().await?)
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, ApiError> {
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &text));
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Invalid JSON: {e}")))
    }

    fn unwrap_envelope<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
        let envelope: Envelope<T> = serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("Unexpected response shape: {e}")))?;
        if !envelope.success {
            return Err(ApiError::InvalidResponse(
                envelope
                    .error
                    .unwrap_or_else(|| "server reported failure".to_string()),
            ));
        }
        envelope
            .data
            .ok_or_else(|| ApiError::InvalidResponse("response carried no data".to_string()))
    }

    // ===== Internal State =====

    /// Persist then adopt a new pair. The store write lands first; if it
    /// fails the in-memory pair is left untouched.
    async fn persist_tokens(&self, pair: TokenPair) -> Result<()> {
        self.inner.store.store_tokens(&pair)?;
        *self.inner.tokens.write().await = Some(pair);
        Ok(())
    }

    /// Clear everything and notify the handler - once per termination.
    async fn terminate_session(&self) {
        let had_session = self.inner.tokens.write().await.take().is_some();
        *self.inner.session.write().await = None;
        if let Err(error) = self.inner.store.clear_tokens() {
            warn!(%error, "failed to clear persisted tokens");
        }
        if !had_session {
            return;
        }

        info!("session terminated");
        let handler = self.inner.handler.lock().await.clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    async fn set_current_db(&self, name: Option<String>) {
        {
            let mut current = self.inner.current_db.write().await;
            if *current == name {
                return;
            }
            *current = name.clone();
        }

        let mut config = self.inner.config.lock().await;
        config.current_db = name;
        if let Err(error) = config.save() {
            warn!(%error, "failed to persist database selection");
        }
    }
}
