//! The authenticated user record and its wire-shape normalization.
//!
//! The backend has two historical response formats for "current user":
//! newer servers wrap the user in a `{success, data: {user, databases,
//! current_db}}` envelope, legacy servers return the user fields flat at
//! the top level. Both shapes are accepted here and nowhere else; every
//! other module sees only the normalized `User`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::DatabaseSummary;

/// Canonical user record, independent of which wire shape produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Not present in the legacy flat shape.
    pub id: Option<i64>,
    pub username: String,
    /// Not present in the legacy flat shape.
    pub email: Option<String>,
    pub role: String,
    pub is_account_owner: bool,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    /// Identifier to show in sharing dialogs: email on cloud servers,
    /// username everywhere else.
    pub fn share_identifier(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.username)
    }
}

/// One reply from the current-user endpoint, tagged by which shape matched.
///
/// `Absent` catches anything that is neither shape; callers treat it as
/// "no user data", equivalent to a failed bootstrap.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CurrentUserReply {
    Nested(NestedReply),
    Flat(FlatUser),
    Absent(Value),
}

/// Envelope shape produced by current servers.
#[derive(Debug, Deserialize)]
pub struct NestedReply {
    #[serde(default)]
    pub success: bool,
    pub data: NestedBody,
}

#[derive(Debug, Deserialize)]
pub struct NestedBody {
    pub user: WireUser,
    #[serde(default)]
    pub databases: Vec<DatabaseSummary>,
    #[serde(default)]
    pub current_db: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireUser {
    #[serde(default)]
    pub id: Option<i64>,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: String,
    #[serde(default)]
    pub is_account_owner: bool,
}

/// Top-level shape produced by legacy servers.
#[derive(Debug, Deserialize)]
pub struct FlatUser {
    pub username: String,
    pub role: String,
    #[serde(default)]
    pub databases: Vec<DatabaseSummary>,
    #[serde(default)]
    pub current_db: Option<String>,
    #[serde(default)]
    pub is_account_owner: bool,
}

impl CurrentUserReply {
    pub fn from_value(value: Value) -> Self {
        // The untagged enum carries an `Absent(Value)` catch-all, so this
        // deserialization itself cannot fail.
        serde_json::from_value(value).unwrap_or_else(|_| CurrentUserReply::Absent(Value::Null))
    }

    /// Collapse either wire shape into the canonical record plus the
    /// accessible databases and the server-side database selection.
    pub fn normalize(self) -> Option<(User, Vec<DatabaseSummary>, Option<String>)> {
        match self {
            CurrentUserReply::Nested(reply) => {
                let body = reply.data;
                let user = User {
                    id: body.user.id,
                    username: body.user.username,
                    email: body.user.email,
                    role: body.user.role,
                    is_account_owner: body.user.is_account_owner,
                };
                Some((user, body.databases, body.current_db))
            }
            CurrentUserReply::Flat(flat) => {
                let user = User {
                    id: None,
                    username: flat.username,
                    email: None,
                    role: flat.role,
                    is_account_owner: flat.is_account_owner,
                };
                Some((user, flat.databases, flat.current_db))
            }
            CurrentUserReply::Absent(_) => None,
        }
    }
}
