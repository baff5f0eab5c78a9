//! REST API client module for the BillManager server.
//!
//! This module provides the `ApiClient` for fetching bill and payment
//! data, and the error taxonomy shared by all remote calls.
//!
//! The API uses JWT bearer token authentication; token lifecycle is
//! handled by `auth::SessionManager`.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::{ApiError, LoginError};
