//! API client for communicating with the BillManager REST API.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! API requests to fetch bill and payment data. All protected calls flow
//! through the session manager's chokepoint, which handles bearer tokens,
//! the selected-database header, and transparent session refresh.

use crate::auth::SessionManager;
use crate::models::{Bill, Payment, ServerConfig};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

const BILLS_PATH: &str = "/api/v2/bills";
const PAYMENTS_PATH: &str = "/api/v2/payments";
const CONFIG_PATH: &str = "/api/v2/config";

/// Typed access to the protected data a session guards.
/// Clone is cheap - clones share the manager's session state.
#[derive(Clone)]
pub struct ApiClient {
    session: SessionManager,
}

impl ApiClient {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    // ===== Data Fetching Methods =====

    /// Fetch bills for the selected database, including bills shared
    /// with the current user.
    pub async fn fetch_bills(&self, include_archived: bool) -> Result<Vec<Bill>, ApiError> {
        let path = format!("{BILLS_PATH}?include_archived={include_archived}");
        self.session.get_authed(&path).await
    }

    /// Fetch payment history across all bills in the selected database.
    pub async fn fetch_payments(&self) -> Result<Vec<Payment>, ApiError> {
        self.session.get_authed(PAYMENTS_PATH).await
    }

    /// Fetch the public server configuration. No authentication; used to
    /// determine the deployment mode before anyone is signed in.
    pub async fn fetch_server_config(&self) -> Result<ServerConfig, ApiError> {
        self.session.get_public(CONFIG_PATH).await
    }
}
