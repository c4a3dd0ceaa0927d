use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::round2;

/// Booking channel a reservation came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Platform {
    Airbnb,
    Vrbo,
    Direct,
    Other(String),
}

impl From<String> for Platform {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "airbnb" => Self::Airbnb,
            "vrbo" => Self::Vrbo,
            "direct" => Self::Direct,
            _ => Self::Other(raw.trim().to_string()),
        }
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        match platform {
            Platform::Airbnb => "airbnb".to_string(),
            Platform::Vrbo => "vrbo".to_string(),
            Platform::Direct => "direct".to_string(),
            Platform::Other(name) => name,
        }
    }
}

/// Per-component financials of one reservation, all in the owner's
/// statement currency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReservationFinancials {
    pub base_rate: f64,
    pub guest_fees: f64,
    pub platform_fees: f64,
    pub tax_amount: f64,
    pub pm_commission: f64,
    pub gross_payout: f64,
    #[serde(default)]
    pub damage_coverage: f64,
}

impl ReservationFinancials {
    /// Linear proration: every component scales by the same factor.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            base_rate: round2(self.base_rate * factor),
            guest_fees: round2(self.guest_fees * factor),
            platform_fees: round2(self.platform_fees * factor),
            tax_amount: round2(self.tax_amount * factor),
            pm_commission: round2(self.pm_commission * factor),
            gross_payout: round2(self.gross_payout * factor),
            damage_coverage: round2(self.damage_coverage * factor),
        }
    }
}

/// One booking, sourced from the booking provider or entered manually
/// (`manual = true` marks a custom reservation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub property_id: Uuid,
    pub guest_name: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub nights: i64,
    pub financials: ReservationFinancials,
    pub platform: Platform,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub manual: bool,
}

impl Reservation {
    /// Nights implied by the dates, regardless of the stored count.
    pub fn date_nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::{Platform, ReservationFinancials};

    #[test]
    fn platform_parses_known_and_unknown_channels() {
        assert_eq!(Platform::from("Airbnb".to_string()), Platform::Airbnb);
        assert_eq!(Platform::from("vrbo".to_string()), Platform::Vrbo);
        assert_eq!(
            Platform::from("booking.com".to_string()),
            Platform::Other("booking.com".to_string())
        );
        assert_eq!(String::from(Platform::Airbnb), "airbnb");
    }

    #[test]
    fn scaling_applies_to_every_component() {
        let financials = ReservationFinancials {
            base_rate: 300.0,
            guest_fees: 60.0,
            platform_fees: 30.0,
            tax_amount: 24.0,
            pm_commission: 45.0,
            gross_payout: 354.0,
            damage_coverage: 12.0,
        };
        let half = financials.scaled(0.5);
        assert_eq!(half.base_rate, 150.0);
        assert_eq!(half.guest_fees, 30.0);
        assert_eq!(half.platform_fees, 15.0);
        assert_eq!(half.tax_amount, 12.0);
        assert_eq!(half.pm_commission, 22.5);
        assert_eq!(half.gross_payout, 177.0);
        assert_eq!(half.damage_coverage, 6.0);
    }
}
