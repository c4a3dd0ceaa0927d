use axum::http::HeaderMap;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Gate every mutating route behind the internal API key.
///
/// Full user authentication lives in front of this service; the engine only
/// verifies that the caller is the trusted dashboard/backend tier.
pub fn require_api_key(state: &AppState, headers: &HeaderMap) -> AppResult<()> {
    let Some(expected) = state.config.internal_api_key.as_deref() else {
        if state.config.is_production() {
            return Err(AppError::Unauthorized(
                "INTERNAL_API_KEY is not configured.".to_string(),
            ));
        }
        return Ok(());
    };

    let presented = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();

    if presented.is_empty() || presented != expected {
        return Err(AppError::Unauthorized("Invalid or missing API key.".to_string()));
    }
    Ok(())
}
