//! Authentication module for managing the session lifecycle.
//!
//! This module provides:
//! - `SessionManager`: token ownership, login/logout/refresh, and the
//!   interception chokepoint that transparently recovers expired sessions
//! - `CredentialStore`: at-rest token storage (OS keychain or in-memory)
//! - `AuthStatePublisher`: render-ready auth state for UI consumers
//!
//! Tokens are persisted as a single keychain entry and rotate on every
//! refresh exchange.

pub mod credentials;
pub mod manager;
pub mod session;
pub mod state;

pub use credentials::{CredentialStore, KeyringStore, MemoryStore, TokenPair};
pub use manager::{Bootstrap, RefreshOutcome, SessionManager, ALL_DATABASES};
pub use session::SessionData;
pub use state::{AuthState, AuthStatePublisher};
