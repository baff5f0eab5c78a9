//! Bill groups ("databases") and server deployment info.

use serde::{Deserialize, Serialize};

/// One bill group the user can access, as listed by login and
/// current-user responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSummary {
    pub id: i64,
    pub name: String,
    pub display_name: Option<String>,
}

impl DatabaseSummary {
    /// Name to render in pickers; falls back to the internal name.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().filter(|s| !s.is_empty()).unwrap_or(&self.name)
    }
}

/// Which kind of server this client is talking to.
///
/// The server reports `saas` or `self-hosted`; `local-dev` is a client-side
/// setting for development servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerMode {
    Cloud,
    #[default]
    SelfHosted,
    LocalDev,
}

impl ServerMode {
    /// Parse the server's `deployment_mode` string. Unknown values fall
    /// back to `SelfHosted`.
    pub fn parse(s: &str) -> Self {
        match s {
            "saas" | "cloud" => ServerMode::Cloud,
            "self-hosted" => ServerMode::SelfHosted,
            "local-dev" => ServerMode::LocalDev,
            _ => ServerMode::SelfHosted,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ServerMode::Cloud => "Cloud",
            ServerMode::SelfHosted => "Self-hosted",
            ServerMode::LocalDev => "Local development",
        }
    }

    /// Cloud servers identify users for sharing by email, everything else
    /// by username.
    pub fn shares_by_email(&self) -> bool {
        matches!(self, ServerMode::Cloud)
    }
}

/// Public server configuration from the unauthenticated config endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub deployment_mode: String,
    #[serde(default)]
    pub registration_enabled: bool,
    #[serde(default)]
    pub email_enabled: bool,
}

impl ServerConfig {
    pub fn mode(&self) -> ServerMode {
        ServerMode::parse(&self.deployment_mode)
    }
}
