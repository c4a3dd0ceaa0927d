use chrono::NaiveDate;

use crate::domain::{CalculationType, EffectivePolicy, Listing, ListingGroup};
use crate::error::{AppError, AppResult};

/// Resolve the immutable policy for one listing at generation time.
///
/// The waiver is time-bounded: `waive_commission` only takes effect while
/// `waive_commission_until` is unset or on/after the as-of date.
pub fn resolve_policy(listing: &Listing, as_of: NaiveDate) -> EffectivePolicy {
    let waive_commission = listing.waive_commission
        && listing
            .waive_commission_until
            .map(|until| until >= as_of)
            .unwrap_or(true);

    EffectivePolicy {
        pm_percentage: listing.pm_percentage,
        waive_commission,
        disregard_tax: listing.disregard_tax,
        airbnb_pass_through_tax: listing.airbnb_pass_through_tax,
        cleaning_fee_pass_through: listing.cleaning_fee_pass_through,
        is_cohost_on_airbnb: listing.is_cohost_on_airbnb,
        guest_paid_damage_coverage: listing.guest_paid_damage_coverage,
        default_cleaning_fee: listing.default_cleaning_fee,
        default_pet_fee: listing.default_pet_fee,
    }
}

/// Pick the calculation type for a build: explicit request, then the
/// listing override, then the group default, then checkout.
pub fn effective_calculation_type(
    requested: Option<CalculationType>,
    listing: &Listing,
    group: Option<&ListingGroup>,
) -> CalculationType {
    requested
        .or(listing.calculation_type)
        .or(group.map(|g| g.default_calculation_type))
        .unwrap_or(CalculationType::Checkout)
}

/// Guard applied when loading a listing for generation; hands back the
/// listing so callers never re-unwrap the option.
pub fn ensure_generatable<'a>(
    listing: Option<&'a Listing>,
    listing_id: &str,
    include_inactive: bool,
) -> AppResult<&'a Listing> {
    let Some(listing) = listing else {
        return Err(AppError::PolicyNotFound(format!(
            "listing {listing_id} does not exist"
        )));
    };
    if !listing.active && !include_inactive {
        return Err(AppError::PolicyNotFound(format!(
            "listing {listing_id} is inactive"
        )));
    }
    Ok(listing)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::{effective_calculation_type, ensure_generatable, resolve_policy};
    use crate::domain::{CalculationType, Listing, ListingGroup};

    fn listing() -> Listing {
        Listing {
            id: Uuid::nil(),
            owner_id: "owner-1".to_string(),
            name: "Seaside Cottage".to_string(),
            active: true,
            pm_percentage: 15.0,
            waive_commission: false,
            waive_commission_until: None,
            disregard_tax: false,
            airbnb_pass_through_tax: false,
            cleaning_fee_pass_through: false,
            is_cohost_on_airbnb: false,
            guest_paid_damage_coverage: false,
            include_child_listings: false,
            default_cleaning_fee: 150.0,
            default_pet_fee: 0.0,
            tags: BTreeSet::new(),
            group_id: None,
            calculation_type: None,
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn waiver_without_expiry_is_effective() {
        let mut l = listing();
        l.waive_commission = true;
        assert!(resolve_policy(&l, date("2025-01-01")).waive_commission);
    }

    #[test]
    fn waiver_expires_strictly_before_as_of_date() {
        let mut l = listing();
        l.waive_commission = true;
        l.waive_commission_until = Some(date("2025-03-31"));
        assert!(resolve_policy(&l, date("2025-03-31")).waive_commission);
        assert!(!resolve_policy(&l, date("2025-04-01")).waive_commission);
    }

    #[test]
    fn expiry_alone_never_enables_the_waiver() {
        let mut l = listing();
        l.waive_commission_until = Some(date("2099-01-01"));
        assert!(!resolve_policy(&l, date("2025-01-01")).waive_commission);
    }

    #[test]
    fn calculation_type_falls_back_through_listing_then_group() {
        let mut l = listing();
        let group = ListingGroup {
            id: Uuid::nil(),
            name: "Coastal".to_string(),
            tags: BTreeSet::new(),
            default_calculation_type: CalculationType::Calendar,
        };

        assert_eq!(
            effective_calculation_type(Some(CalculationType::Checkout), &l, Some(&group)),
            CalculationType::Checkout
        );
        assert_eq!(
            effective_calculation_type(None, &l, Some(&group)),
            CalculationType::Calendar
        );
        l.calculation_type = Some(CalculationType::Checkout);
        assert_eq!(
            effective_calculation_type(None, &l, Some(&group)),
            CalculationType::Checkout
        );
        l.calculation_type = None;
        assert_eq!(
            effective_calculation_type(None, &l, None),
            CalculationType::Checkout
        );
    }

    #[test]
    fn inactive_listing_needs_explicit_opt_in() {
        let mut l = listing();
        l.active = false;
        assert!(ensure_generatable(Some(&l), "x", false).is_err());
        assert!(ensure_generatable(Some(&l), "x", true).is_ok());
        assert!(ensure_generatable(None, "x", true).is_err());
    }
}
