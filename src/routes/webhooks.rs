use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::providers::{email, verify_webhook_signature};
use crate::repository::statements as statement_repo;
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/webhooks/payments", axum::routing::post(payment_webhook))
        .route("/webhooks/email", axum::routing::post(email_webhook))
}

fn verify(headers: &HeaderMap, body: &str, secret: Option<&str>) -> AppResult<()> {
    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Dependency("Webhook secret is not configured.".to_string()))?;
    let signature = headers
        .get("webhook-signature")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !verify_webhook_signature(body, signature, secret) {
        return Err(AppError::Unauthorized("Invalid webhook signature.".to_string()));
    }
    Ok(())
}

/// Payout confirmations from the payment provider. Records the outcome on
/// the statement without moving its lifecycle status.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<Json<Value>> {
    verify(
        &headers,
        &body,
        state.config.payment_webhook_secret.as_deref(),
    )?;
    let pool = state.db()?;

    let event: Value = serde_json::from_str(&body)
        .map_err(|e| AppError::BadRequest(format!("Unreadable webhook payload: {e}")))?;
    let event_type = event.get("type").and_then(Value::as_str).unwrap_or_default();
    let data = event.get("data").cloned().unwrap_or_default();

    let statement_id = data
        .get("metadata")
        .and_then(|m| m.get("statement_id"))
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| {
            AppError::BadRequest("Webhook payload missing statement id.".to_string())
        })?;

    let mut statement = statement_repo::get(pool, statement_id).await?;
    let current = statement.status;
    match event_type {
        "transfer.paid" => {
            statement.payout_status = Some("paid".to_string());
            statement.payout_error = None;
        }
        "transfer.failed" => {
            let message = data
                .get("failure_message")
                .and_then(Value::as_str)
                .unwrap_or("transfer failed");
            statement.payout_status = Some("failed".to_string());
            statement.payout_error = Some(message.to_string());
        }
        other => {
            tracing::debug!(event_type = other, "ignoring payment webhook event");
            return Ok(Json(json!({ "received": true })));
        }
    }
    statement_repo::transition(pool, &mut statement, current).await?;
    tracing::info!(%statement_id, event_type, "payout status updated from webhook");
    Ok(Json(json!({ "received": true })))
}

/// Delivery callbacks from the email provider (pending -> sent / failed /
/// bounced on the email log).
async fn email_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<Json<Value>> {
    verify(&headers, &body, state.config.email_webhook_secret.as_deref())?;
    let pool = state.db()?;

    let event: Value = serde_json::from_str(&body)
        .map_err(|e| AppError::BadRequest(format!("Unreadable webhook payload: {e}")))?;
    let event_type = event.get("type").and_then(Value::as_str).unwrap_or_default();
    let message_id = event
        .get("data")
        .and_then(|d| d.get("email_id"))
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::BadRequest("Webhook payload missing email id.".to_string()))?;

    let status = match event_type {
        "email.sent" | "email.delivered" => "sent",
        "email.delivery_failed" | "email.failed" => "failed",
        "email.bounced" => "bounced",
        other => {
            tracing::debug!(event_type = other, "ignoring email webhook event");
            return Ok(Json(json!({ "received": true })));
        }
    };
    email::update_email_status(pool, message_id, status).await?;
    Ok(Json(json!({ "received": true })))
}
