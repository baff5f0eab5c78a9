//! Render-ready auth state for UI consumers.
//!
//! The publisher translates session manager outcomes into one observable
//! snapshot. It carries no business logic: every operation delegates to
//! the manager, then publishes a complete new state in a single send, so
//! consumers never see a half-updated transition (`is_authenticated` is
//! true only when `user` is present).

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::api::{ApiClient, ApiError, LoginError};
use crate::auth::manager::{Bootstrap, SessionManager};
use crate::auth::session::SessionData;
use crate::models::{DatabaseSummary, ServerMode, User};

/// One observable snapshot of the authentication state.
#[derive(Debug, Clone)]
pub struct AuthState {
    pub is_loading: bool,
    pub is_authenticated: bool,
    pub user: Option<User>,
    pub databases: Vec<DatabaseSummary>,
    pub current_db: Option<String>,
    pub server_mode: ServerMode,
}

impl AuthState {
    fn loading(server_mode: ServerMode) -> Self {
        Self {
            is_loading: true,
            is_authenticated: false,
            user: None,
            databases: Vec::new(),
            current_db: None,
            server_mode,
        }
    }

    fn signed_out(server_mode: ServerMode) -> Self {
        Self {
            is_loading: false,
            is_authenticated: false,
            user: None,
            databases: Vec::new(),
            current_db: None,
            server_mode,
        }
    }

    fn authenticated(session: SessionData, server_mode: ServerMode) -> Self {
        Self {
            is_loading: false,
            is_authenticated: true,
            user: Some(session.user),
            databases: session.databases,
            current_db: session.current_db,
            server_mode,
        }
    }
}

/// Publishes [`AuthState`] snapshots over a watch channel.
///
/// On construction it resolves the server's deployment mode, registers
/// itself as the manager's auth-error handler (the handler slot is
/// single-occupancy, so this is the one subscriber), and runs the
/// one-time session rehydration.
pub struct AuthStatePublisher {
    manager: SessionManager,
    api: ApiClient,
    state: Arc<watch::Sender<AuthState>>,
    server_mode: ServerMode,
}

impl AuthStatePublisher {
    pub async fn new(manager: SessionManager) -> Self {
        let api = ApiClient::new(manager.clone());

        // Deployment mode comes from the public config endpoint; the
        // locally configured value is the fallback when the server is
        // unreachable.
        let server_mode = match api.fetch_server_config().await {
            Ok(config) => config.mode(),
            Err(error) => {
                debug!(%error, "server config unavailable, using configured mode");
                manager.configured_server_mode().await
            }
        };

        let (tx, _rx) = watch::channel(AuthState::loading(server_mode));
        let state = Arc::new(tx);

        // A session terminated behind our back (failed refresh) forces
        // the published state to signed-out.
        let handler_state = Arc::clone(&state);
        manager
            .set_auth_error_handler(move || {
                handler_state.send_replace(AuthState::signed_out(server_mode));
            })
            .await;

        let publisher = Self {
            manager,
            api,
            state,
            server_mode,
        };

        match publisher.manager.initialize().await {
            Bootstrap::Session(session) => publisher.publish_session(session),
            Bootstrap::NoSession => publisher.publish_signed_out(),
        }
        publisher
    }

    /// Receiver for state changes; the current value is readable
    /// immediately.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// The latest published snapshot.
    pub fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    // ===== Delegated Operations =====

    pub async fn login(&self, username: &str, password: &str) -> Result<(), LoginError> {
        self.state
            .send_replace(AuthState::loading(self.server_mode));
        match self.manager.login(username, password).await {
            Ok(session) => {
                self.publish_session(session);
                Ok(())
            }
            Err(error) => {
                self.publish_signed_out();
                Err(error)
            }
        }
    }

    pub async fn logout(&self) {
        self.manager.logout().await;
        self.publish_signed_out();
    }

    pub async fn select_database(&self, name: &str) -> Result<(), ApiError> {
        self.manager.select_database(name).await?;
        if let Some(session) = self.manager.session_data().await {
            self.publish_session(session);
        }
        Ok(())
    }

    /// Re-run the identity bootstrap and publish the fresh snapshot.
    pub async fn refresh_user_info(&self) -> Result<(), ApiError> {
        let session = self.manager.fetch_current_user().await?;
        self.publish_session(session);
        Ok(())
    }

    /// Re-fetch the accessible databases (part of the identity reply).
    pub async fn refresh_databases(&self) -> Result<Vec<DatabaseSummary>, ApiError> {
        let session = self.manager.fetch_current_user().await?;
        let databases = session.databases.clone();
        self.publish_session(session);
        Ok(databases)
    }

    fn publish_session(&self, session: SessionData) {
        self.state
            .send_replace(AuthState::authenticated(session, self.server_mode));
    }

    fn publish_signed_out(&self) {
        self.state
            .send_replace(AuthState::signed_out(self.server_mode));
    }
}
