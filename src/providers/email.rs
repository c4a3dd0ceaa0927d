use reqwest::Client;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

const SEND_URL: &str = "https://api.resend.com/emails";

/// Send the statement email to the owner; returns the provider message id.
/// Delivery outcome arrives later through the email webhook, not here.
pub async fn send_statement_email(
    http: &Client,
    config: &AppConfig,
    to: &str,
    subject: &str,
    html: &str,
) -> AppResult<String> {
    let api_key = config
        .email_api_key
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Dependency("EMAIL_API_KEY is not configured.".to_string()))?;

    let response = http
        .post(SEND_URL)
        .bearer_auth(api_key)
        .json(&json!({
            "from": config.email_from_address,
            "to": [to],
            "subject": subject,
            "html": html,
        }))
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "statement email request failed");
            AppError::ProviderUnavailable("email provider unreachable".to_string())
        })?;

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .unwrap_or_else(|_| json!({"error": "failed to parse response"}));

    if !status.is_success() {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown email provider error");
        return Err(AppError::ProviderUnavailable(format!(
            "email provider error ({status}): {message}"
        )));
    }

    body.get("id")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            AppError::ProviderUnavailable("email provider response missing message id".to_string())
        })
}

/// Record an outbound email as pending until the delivery webhook lands.
pub async fn record_email_log(
    pool: &PgPool,
    statement_id: Uuid,
    recipient: &str,
    provider_message_id: &str,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO email_logs
            (id, statement_id, recipient, provider_message_id, status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, 'pending', now(), now())",
    )
    .bind(Uuid::new_v4())
    .bind(statement_id)
    .bind(recipient)
    .bind(provider_message_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Apply a delivery status callback (sent / failed / bounced).
pub async fn update_email_status(
    pool: &PgPool,
    provider_message_id: &str,
    status: &str,
) -> AppResult<()> {
    if !matches!(status, "sent" | "failed" | "bounced") {
        return Err(AppError::BadRequest(format!(
            "Unknown email delivery status '{status}'."
        )));
    }
    let result = sqlx::query(
        "UPDATE email_logs SET status = $2, updated_at = now()
         WHERE provider_message_id = $1",
    )
    .bind(provider_message_id)
    .bind(status)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        tracing::warn!(provider_message_id, "delivery callback for unknown email");
    }
    Ok(())
}
