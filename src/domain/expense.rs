use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseSource {
    /// Synced from the accounting/bookkeeping provider.
    Synced,
    /// Uploaded by an operator.
    Manual,
}

/// One property expense in the statement currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub property_id: Uuid,
    pub date: NaiveDate,
    pub description: String,
    pub category: String,
    pub amount: f64,
    /// Hidden rows stay out of totals but remain visible for UI toggling.
    #[serde(default)]
    pub hidden: bool,
    /// Company-absorbed cost; excluded from owner-billable totals.
    #[serde(default)]
    pub is_ll_cover: bool,
    pub source: ExpenseSource,
}

impl Expense {
    pub fn is_owner_billable(&self) -> bool {
        !self.hidden && !self.is_ll_cover
    }

    pub fn is_cleaning(&self) -> bool {
        self.category.trim().eq_ignore_ascii_case("cleaning")
    }
}
