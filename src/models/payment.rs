//! Payment history entries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub amount: f64,
    /// Payment date as `YYYY-MM-DD`.
    pub payment_date: String,
    pub notes: Option<String>,
    pub bill_id: Option<i64>,
    pub bill_name: Option<String>,
    pub bill_icon: Option<String>,
    /// Effective direction after share accounting: `"expense"` or `"deposit"`.
    pub bill_type: Option<String>,
    /// True when this payment belongs to a bill share rather than an
    /// owned bill.
    #[serde(default)]
    pub is_share_payment: bool,
    /// True when the money was received from a sharee (owner's view).
    #[serde(default)]
    pub is_received_payment: bool,
    pub database_id: Option<i64>,
    pub database_name: Option<String>,
}

impl Payment {
    pub fn is_deposit(&self) -> bool {
        self.bill_type.as_deref() == Some("deposit")
    }

    /// `YYYY-MM` bucket for monthly charts; `None` when the date is not a
    /// valid calendar date.
    pub fn month_key(&self) -> Option<String> {
        NaiveDate::parse_from_str(&self.payment_date, "%Y-%m-%d")
            .ok()
            .map(|date| date.format("%Y-%m").to_string())
    }
}
