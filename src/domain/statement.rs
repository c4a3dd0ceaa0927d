use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::expense::ExpenseSource;
use super::listing::EffectivePolicy;
use super::reservation::{Platform, ReservationFinancials};
use super::round2;
use crate::error::AppError;

/// How reservation revenue is attributed to a statement period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationType {
    /// Full revenue lands in the period containing the check-out date.
    Checkout,
    /// Revenue is prorated by the fraction of nights inside the period.
    Calendar,
}

impl CalculationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checkout => "checkout",
            Self::Calendar => "calendar",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "checkout" => Ok(Self::Checkout),
            "calendar" => Ok(Self::Calendar),
            other => Err(AppError::BadRequest(format!(
                "Unknown calculation type '{other}'. Expected 'checkout' or 'calendar'."
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementStatus {
    Draft,
    Final,
    Sent,
    Paid,
}

impl StatementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Final => "final",
            Self::Sent => "sent",
            Self::Paid => "paid",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "final" => Ok(Self::Final),
            "sent" => Ok(Self::Sent),
            "paid" => Ok(Self::Paid),
            other => Err(AppError::Internal(format!(
                "Unknown statement status '{other}' in storage."
            ))),
        }
    }
}

/// One attributed reservation contribution. `attributed` carries the share
/// of every financial component inside the period; `original` keeps the
/// full amounts for display and audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationLine {
    pub reservation_id: String,
    pub guest_name: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub nights: i64,
    pub overlap_nights: i64,
    /// Fraction of the stay attributed to this period, in [0, 1].
    pub share: f64,
    pub platform: Platform,
    pub attributed: ReservationFinancials,
    pub original: ReservationFinancials,
    #[serde(default)]
    pub zero_night_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseLine {
    pub expense_id: String,
    pub date: NaiveDate,
    pub description: String,
    pub category: String,
    pub amount: f64,
    pub hidden: bool,
    pub is_ll_cover: bool,
    pub source: ExpenseSource,
}

/// Closed record of what a statement included at build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LineItem {
    Reservation(ReservationLine),
    CustomReservation(ReservationLine),
    Expense(ExpenseLine),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateWarning {
    pub guest_name: String,
    pub reservation_ids: Vec<String>,
    pub gross_payouts: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningMismatchWarning {
    pub expected_default_total: f64,
    pub actual_expense_total: f64,
}

/// The persisted statement aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub id: Uuid,
    pub owner_id: String,
    pub property_id: Option<Uuid>,
    #[serde(default)]
    pub property_ids: Vec<Uuid>,
    #[serde(default)]
    pub is_combined: bool,
    pub week_start_date: NaiveDate,
    pub week_end_date: NaiveDate,
    pub calculation_type: CalculationType,

    pub total_revenue: f64,
    pub total_expenses: f64,
    pub pm_commission: f64,
    /// Commission is displayed but not deducted when the waiver is effective.
    pub commission_waived: bool,
    /// The commission actually subtracted from the payout. On a combined
    /// statement mixing waived and non-waived listings this is the sum over
    /// the non-waived ones only, so it can differ from both `pm_commission`
    /// and zero.
    #[serde(default)]
    pub deducted_commission: f64,
    pub tech_fees: f64,
    pub insurance_fees: f64,
    pub adjustments: f64,
    pub tax_adjustment: f64,
    pub commissionable_base: f64,
    pub owner_payout: f64,

    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub duplicate_warnings: Vec<DuplicateWarning>,
    #[serde(default)]
    pub cancelled_reservation_count: i64,
    pub cleaning_mismatch_warning: Option<CleaningMismatchWarning>,
    #[serde(default)]
    pub should_convert_to_calendar: bool,
    /// Expense sources that were unreachable at build time.
    #[serde(default)]
    pub partial_data_sources: Vec<String>,
    pub internal_notes: Option<String>,

    pub listing_settings_snapshot: EffectivePolicy,
    pub status: StatementStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub payout_status: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub transfer_id: Option<String>,
    pub payout_fee: Option<f64>,
    pub payout_error: Option<String>,

    pub group_id: Option<Uuid>,
    pub group_name: Option<String>,
    #[serde(default)]
    pub group_tags: BTreeSet<String>,

    /// Optimistic concurrency column; bumped on every write.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Statement {
    /// The payout identity every statement must satisfy. Waived commission
    /// is displayed but never deducted, so only `deducted_commission`
    /// enters the formula.
    pub fn recompute_owner_payout(&self) -> f64 {
        round2(
            self.total_revenue - self.total_expenses - self.deducted_commission - self.tech_fees
                - self.insurance_fees
                + self.adjustments
                + self.tax_adjustment,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{CalculationType, StatementStatus};

    #[test]
    fn calculation_type_parses_both_modes() {
        assert_eq!(
            CalculationType::parse("checkout").unwrap(),
            CalculationType::Checkout
        );
        assert_eq!(
            CalculationType::parse(" Calendar ").unwrap(),
            CalculationType::Calendar
        );
        assert!(CalculationType::parse("weekly").is_err());
    }

    #[test]
    fn status_round_trips_through_storage_strings() {
        for status in [
            StatementStatus::Draft,
            StatementStatus::Final,
            StatementStatus::Sent,
            StatementStatus::Paid,
        ] {
            assert_eq!(StatementStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(StatementStatus::parse("archived").is_err());
    }
}
