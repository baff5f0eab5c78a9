//! Bill models, including shared-bill metadata.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub id: i64,
    pub name: String,
    /// Absent for variable bills with no fixed amount.
    pub amount: Option<f64>,
    /// True when the amount varies between payments.
    #[serde(default)]
    pub varies: bool,
    pub frequency: Option<String>,
    pub frequency_type: Option<String>,
    /// JSON-encoded schedule details for custom frequencies.
    pub frequency_config: Option<String>,
    /// Next due date as `YYYY-MM-DD`.
    pub next_due: Option<String>,
    #[serde(default)]
    pub auto_payment: bool,
    pub icon: Option<String>,
    /// `"bill"`, `"expense"` or `"deposit"`.
    #[serde(rename = "type")]
    pub bill_type: Option<String>,
    pub account: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub archived: bool,
    /// True when this bill is shared *with* the current user by someone else.
    #[serde(default)]
    pub is_shared: bool,
    /// How many people the current user shares this bill with.
    #[serde(default)]
    pub share_count: i64,
    /// Average of recorded payments, sent for variable bills only.
    pub avg_amount: Option<f64>,
    /// Present only on bills shared with the current user.
    pub share_info: Option<ShareInfo>,
    pub database_id: Option<i64>,
    pub database_name: Option<String>,
}

/// The recipient's view of a share on a bill someone else owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareInfo {
    pub share_id: i64,
    pub owner_name: Option<String>,
    /// This user's portion of the bill under the share's split rules.
    pub my_portion: Option<f64>,
    #[serde(default)]
    pub my_portion_paid: bool,
    pub my_portion_paid_date: Option<String>,
}

impl Bill {
    pub fn is_deposit(&self) -> bool {
        self.bill_type.as_deref() == Some("deposit")
    }

    /// The amount a list row should show: the share portion for shared
    /// bills, the running average for variable bills, the fixed amount
    /// otherwise.
    pub fn effective_amount(&self) -> Option<f64> {
        if let Some(share) = &self.share_info {
            if share.my_portion.is_some() {
                return share.my_portion;
            }
        }
        if self.varies {
            return self.avg_amount.or(self.amount);
        }
        self.amount
    }

    pub fn display_amount(&self) -> String {
        match self.effective_amount() {
            Some(amount) if self.varies => format!("~${:.2}", amount),
            Some(amount) => format!("${:.2}", amount),
            None => "varies".to_string(),
        }
    }
}
