use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::domain::{Platform, Reservation, ReservationFinancials};
use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

pub fn clamp_limit_in_range(limit: Option<i64>, min: i64, max: i64) -> i64 {
    limit.unwrap_or(max).clamp(min, max)
}

fn default_false() -> bool {
    false
}
fn default_other_category() -> String {
    "other".to_string()
}
fn default_direct_platform() -> String {
    "direct".to_string()
}

/// A reservation the operator types in by hand, carried through the build
/// and marked `manual` on its line item.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CustomReservationInput {
    pub property_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub guest_name: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(default)]
    pub base_rate: f64,
    #[serde(default)]
    pub guest_fees: f64,
    #[serde(default)]
    pub platform_fees: f64,
    #[serde(default)]
    pub tax_amount: f64,
    #[serde(default)]
    pub pm_commission: f64,
    pub gross_payout: f64,
    #[serde(default)]
    pub damage_coverage: f64,
    #[serde(default = "default_direct_platform")]
    pub platform: String,
}

impl CustomReservationInput {
    pub fn into_reservation(self) -> Reservation {
        let nights = (self.check_out - self.check_in).num_days();
        Reservation {
            id: format!("manual-{}", Uuid::new_v4()),
            property_id: self.property_id,
            guest_name: self.guest_name,
            check_in: self.check_in,
            check_out: self.check_out,
            nights,
            financials: ReservationFinancials {
                base_rate: self.base_rate,
                guest_fees: self.guest_fees,
                platform_fees: self.platform_fees,
                tax_amount: self.tax_amount,
                pm_commission: self.pm_commission,
                gross_payout: self.gross_payout,
                damage_coverage: self.damage_coverage,
            },
            platform: Platform::from(self.platform),
            cancelled: false,
            manual: true,
        }
    }
}

/// Single or batch generation; exactly one selector shape applies.
/// `owner_id = "all"` fans out across every owner.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GenerateStatementInput {
    #[validate(length(min = 1, max = 255))]
    pub owner_id: String,
    pub property_id: Option<Uuid>,
    pub property_ids: Option<Vec<Uuid>>,
    /// Resolved against listing names when no id is given.
    pub property_name: Option<String>,
    pub tag: Option<String>,
    pub group_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub calculation_type: Option<String>,
    #[serde(default = "default_false")]
    pub include_inactive: bool,
    #[serde(default)]
    pub custom_reservations: Vec<CustomReservationInput>,
    pub internal_notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatementsQuery {
    pub owner_id: Option<String>,
    pub property_id: Option<Uuid>,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatementPath {
    pub statement_id: Uuid,
}

/// Draft-only edits; everything else is computed by the builder.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateDraftStatementInput {
    pub tech_fees: Option<f64>,
    pub insurance_fees: Option<f64>,
    pub adjustments: Option<f64>,
    pub internal_notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconfigureStatementInput {
    pub calculation_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendStatementInput {
    #[validate(email)]
    pub recipient: String,
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateManualExpenseInput {
    pub property_id: Uuid,
    pub date: NaiveDate,
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    #[serde(default = "default_other_category")]
    pub category: String,
    pub amount: f64,
    #[serde(default = "default_false")]
    pub is_ll_cover: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManualExpensesQuery {
    pub property_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpensePath {
    pub expense_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HideExpenseInput {
    pub hidden: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingsQuery {
    pub owner_id: Option<String>,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingPath {
    pub listing_id: Uuid,
}

/// Policy-flag patch. `clear_*` flags reset the nullable columns, since an
/// absent field means "leave unchanged" rather than "set to null".
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateListingPolicyInput {
    #[validate(range(min = 0.0, max = 100.0))]
    pub pm_percentage: Option<f64>,
    pub waive_commission: Option<bool>,
    pub waive_commission_until: Option<NaiveDate>,
    #[serde(default = "default_false")]
    pub clear_waive_commission_until: bool,
    pub disregard_tax: Option<bool>,
    pub airbnb_pass_through_tax: Option<bool>,
    pub cleaning_fee_pass_through: Option<bool>,
    pub is_cohost_on_airbnb: Option<bool>,
    pub guest_paid_damage_coverage: Option<bool>,
    pub include_child_listings: Option<bool>,
    #[validate(range(min = 0.0))]
    pub default_cleaning_fee: Option<f64>,
    #[validate(range(min = 0.0))]
    pub default_pet_fee: Option<f64>,
    pub tags: Option<Vec<String>>,
    pub calculation_type: Option<String>,
    #[serde(default = "default_false")]
    pub clear_calculation_type: bool,
}

#[cfg(test)]
mod tests {
    use super::clamp_limit_in_range;

    #[test]
    fn clamps_limits_into_range() {
        assert_eq!(clamp_limit_in_range(None, 1, 500), 500);
        assert_eq!(clamp_limit_in_range(Some(0), 1, 500), 1);
        assert_eq!(clamp_limit_in_range(Some(10_000), 1, 500), 500);
        assert_eq!(clamp_limit_in_range(Some(42), 1, 500), 42);
    }
}
