//! Chart-ready aggregation of payment history.
//!
//! Statistics screens reduce the already-fetched payment list locally;
//! nothing here touches the network. Buckets are calendar months keyed
//! `YYYY-MM`, split into expenses and deposits the way the history chart
//! renders them.

use std::collections::BTreeMap;

use crate::models::Payment;

/// One month of payment activity.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyTotal {
    /// Month key in `YYYY-MM` form.
    pub month: String,
    pub expenses: f64,
    pub deposits: f64,
    /// Number of payments in the bucket, both directions.
    pub count: usize,
}

impl MonthlyTotal {
    /// Deposits minus expenses for the month.
    pub fn net(&self) -> f64 {
        self.deposits - self.expenses
    }
}

/// Reduce payments into per-month totals, ordered by month ascending.
///
/// Payments without a parseable date are skipped; a chart cannot place
/// them anyway.
pub fn monthly_totals(payments: &[Payment]) -> Vec<MonthlyTotal> {
    let mut buckets: BTreeMap<String, MonthlyTotal> = BTreeMap::new();

    for payment in payments {
        let Some(month) = payment.month_key() else {
            continue;
        };
        let entry = buckets.entry(month.clone()).or_insert_with(|| MonthlyTotal {
            month,
            expenses: 0.0,
            deposits: 0.0,
            count: 0,
        });
        if payment.is_deposit() {
            entry.deposits += payment.amount;
        } else {
            entry.expenses += payment.amount;
        }
        entry.count += 1;
    }

    buckets.into_values().collect()
}

/// Per-month totals for a single bill's payment history.
pub fn monthly_totals_for_bill(payments: &[Payment], bill_id: i64) -> Vec<MonthlyTotal> {
    let filtered: Vec<Payment> = payments
        .iter()
        .filter(|payment| payment.bill_id == Some(bill_id))
        .cloned()
        .collect();
    monthly_totals(&filtered)
}
