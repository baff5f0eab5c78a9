//! Core library for BillManager clients.
//!
//! The mobile and web apps are thin clients over the BillManager REST
//! API; this crate is the layer they share. It owns the authenticated
//! session lifecycle - login, rehydration on start, transparent refresh
//! of expired sessions, logout - plus the typed API surface and the
//! local data shaping that the session protects.
//!
//! Typical wiring:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use billman_core::auth::{AuthStatePublisher, KeyringStore, SessionManager};
//! use billman_core::config::Config;
//!
//! # async fn wire() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let manager = SessionManager::new(config, Arc::new(KeyringStore::new()))?;
//! let publisher = AuthStatePublisher::new(manager).await;
//! let auth_state = publisher.subscribe();
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod stats;

pub use api::{ApiClient, ApiError, LoginError};
pub use auth::{
    AuthState, AuthStatePublisher, Bootstrap, CredentialStore, KeyringStore, MemoryStore,
    RefreshOutcome, SessionData, SessionManager, TokenPair,
};
pub use config::Config;
