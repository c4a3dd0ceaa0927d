use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::domain::{Platform, Reservation, ReservationFinancials};
use crate::error::{AppError, AppResult};

/// Reservation row as the booking provider ships it.
#[derive(Debug, Deserialize)]
struct BookingReservationRow {
    id: String,
    guest_name: String,
    check_in: NaiveDate,
    check_out: NaiveDate,
    nights: i64,
    base_rate: f64,
    #[serde(default)]
    guest_fees: f64,
    #[serde(default)]
    platform_fees: f64,
    #[serde(default)]
    tax_amount: f64,
    #[serde(default)]
    pm_commission: f64,
    gross_payout: f64,
    #[serde(default)]
    damage_coverage: f64,
    #[serde(default)]
    platform: String,
    #[serde(default)]
    cancelled: bool,
}

#[derive(Debug, Deserialize)]
struct BookingReservationsResponse {
    data: Vec<BookingReservationRow>,
}

/// Fetch all reservations touching `[start, end]` for one property.
/// Read-only and idempotent, so callers may retry freely.
pub async fn fetch_reservations(
    http: &Client,
    config: &AppConfig,
    property_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> AppResult<Vec<Reservation>> {
    let base = config.booking_provider_base_url.as_deref().ok_or_else(|| {
        AppError::Dependency("BOOKING_PROVIDER_BASE_URL is not configured.".to_string())
    })?;
    let url = format!("{base}/properties/{property_id}/reservations");

    let mut request = http
        .get(&url)
        .query(&[("start", start.to_string()), ("end", end.to_string())]);
    if let Some(key) = config.booking_provider_api_key.as_deref() {
        request = request.bearer_auth(key);
    }

    let response = request.send().await.map_err(|e| {
        AppError::ProviderUnavailable(format!("booking provider unreachable: {e}"))
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::ProviderUnavailable(format!(
            "booking provider returned {status} for property {property_id}"
        )));
    }

    let body: BookingReservationsResponse = response.json().await.map_err(|e| {
        AppError::ProviderUnavailable(format!("booking provider payload unreadable: {e}"))
    })?;

    Ok(body
        .data
        .into_iter()
        .map(|row| Reservation {
            id: row.id,
            property_id,
            guest_name: row.guest_name,
            check_in: row.check_in,
            check_out: row.check_out,
            nights: row.nights,
            financials: ReservationFinancials {
                base_rate: row.base_rate,
                guest_fees: row.guest_fees,
                platform_fees: row.platform_fees,
                tax_amount: row.tax_amount,
                pm_commission: row.pm_commission,
                gross_payout: row.gross_payout,
                damage_coverage: row.damage_coverage,
            },
            platform: Platform::from(row.platform),
            cancelled: row.cancelled,
            manual: false,
        })
        .collect())
}
