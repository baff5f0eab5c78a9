use serde::{Deserialize, Serialize};

use crate::models::{DatabaseSummary, User};

/// The authenticated identity snapshot produced by the bootstrap call.
///
/// Token material lives in the credential store and the session manager,
/// never here; this is the part of a session that is safe to hand to
/// presentation code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub user: User,
    pub databases: Vec<DatabaseSummary>,
    pub current_db: Option<String>,
}

impl SessionData {
    /// Check that a database name is one this session can use.
    pub fn can_access(&self, name: &str) -> bool {
        self.databases.iter().any(|db| db.name == name)
    }

    pub fn current_database(&self) -> Option<&DatabaseSummary> {
        let name = self.current_db.as_deref()?;
        self.databases.iter().find(|db| db.name == name)
    }
}
