use reqwest::Client;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

const TRANSFER_URL: &str = "https://api.payouts.example.com/v1/transfers";

/// Outcome of a payout transfer creation.
#[derive(Debug, Clone)]
pub struct PayoutTransfer {
    pub transfer_id: String,
    pub fee: f64,
}

/// Create an owner payout transfer for a paid statement.
///
/// Only the mark-paid transition calls this; a failure here leaves the
/// statement `sent` with the error recorded.
pub async fn create_owner_transfer(
    http: &Client,
    config: &AppConfig,
    statement_id: Uuid,
    owner_id: &str,
    amount: f64,
) -> AppResult<PayoutTransfer> {
    let secret_key = config
        .payment_provider_secret_key
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AppError::Dependency("PAYMENT_PROVIDER_SECRET_KEY is not configured.".to_string())
        })?;

    let amount_cents = (amount * 100.0).round() as i64;
    let response = http
        .post(TRANSFER_URL)
        .basic_auth(secret_key, None::<&str>)
        .json(&json!({
            "amount": amount_cents,
            "currency": "usd",
            "destination": owner_id,
            "metadata": { "statement_id": statement_id.to_string() },
            "idempotency_key": format!("statement-{statement_id}"),
        }))
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, %statement_id, "payout transfer request failed");
            AppError::ProviderUnavailable("payment provider unreachable".to_string())
        })?;

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .unwrap_or_else(|_| json!({"error": "failed to parse response"}));

    if !status.is_success() {
        let message = body
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("unknown payment provider error");
        return Err(AppError::ProviderUnavailable(format!(
            "payment provider error ({status}): {message}"
        )));
    }

    let transfer_id = body
        .get("id")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            AppError::ProviderUnavailable("payment provider response missing transfer id".to_string())
        })?;
    let fee = body
        .get("fee")
        .and_then(Value::as_f64)
        .map(|cents| cents / 100.0)
        .unwrap_or(0.0);

    Ok(PayoutTransfer { transfer_id, fee })
}
