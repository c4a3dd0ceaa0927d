use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::statement::CalculationType;

/// A managed short-term-rental property and its financial policy flags.
///
/// Read-only during statement generation; administrative edits happen
/// through the listings route and a directory `reload()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub active: bool,
    pub pm_percentage: f64,
    pub waive_commission: bool,
    pub waive_commission_until: Option<NaiveDate>,
    pub disregard_tax: bool,
    pub airbnb_pass_through_tax: bool,
    pub cleaning_fee_pass_through: bool,
    pub is_cohost_on_airbnb: bool,
    pub guest_paid_damage_coverage: bool,
    pub include_child_listings: bool,
    pub default_cleaning_fee: f64,
    pub default_pet_fee: f64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub group_id: Option<Uuid>,
    /// Per-listing override; the group default applies when absent.
    pub calculation_type: Option<CalculationType>,
}

/// A named collection of listings sharing schedule tags and a default
/// calculation type, used for combined/batch generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingGroup {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub default_calculation_type: CalculationType,
}

/// The immutable policy resolved for one listing at generation time.
///
/// Also the shape of the statement's `listing_settings_snapshot`: once a
/// statement is finalized, recomputation reads this copy, never the live
/// listing row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectivePolicy {
    pub pm_percentage: f64,
    pub waive_commission: bool,
    pub disregard_tax: bool,
    pub airbnb_pass_through_tax: bool,
    pub cleaning_fee_pass_through: bool,
    pub is_cohost_on_airbnb: bool,
    pub guest_paid_damage_coverage: bool,
    pub default_cleaning_fee: f64,
    pub default_pet_fee: f64,
}

/// Tags persist as one comma-separated column; the domain only ever sees
/// the parsed set.
pub fn parse_tags(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

pub fn serialize_tags(tags: &BTreeSet<String>) -> String {
    tags.iter().cloned().collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::{parse_tags, serialize_tags};

    #[test]
    fn parses_tags_trimming_and_deduplicating() {
        let tags = parse_tags(" beach, downtown,beach , ,pet-friendly");
        assert_eq!(tags.len(), 3);
        assert!(tags.contains("beach"));
        assert!(tags.contains("downtown"));
        assert!(tags.contains("pet-friendly"));
    }

    #[test]
    fn tag_round_trip_is_stable() {
        let tags = parse_tags("b,a,c");
        assert_eq!(serialize_tags(&tags), "a,b,c");
        assert_eq!(parse_tags(&serialize_tags(&tags)), tags);
    }

    #[test]
    fn empty_raw_yields_empty_set() {
        assert!(parse_tags("").is_empty());
        assert!(parse_tags(" , ,").is_empty());
    }
}
