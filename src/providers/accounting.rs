use std::collections::HashMap;

use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::domain::{Expense, ExpenseSource};
use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize)]
struct AccountingExpenseRow {
    id: String,
    date: NaiveDate,
    description: String,
    #[serde(default)]
    category_code: String,
    amount: f64,
    #[serde(default)]
    hidden: bool,
    #[serde(default)]
    is_ll_cover: bool,
}

#[derive(Debug, Deserialize)]
struct AccountingExpensesResponse {
    data: Vec<AccountingExpenseRow>,
    /// Provider category code -> display category.
    #[serde(default)]
    category_map: HashMap<String, String>,
}

/// Fetch synced expenses for one property and period, resolving provider
/// category codes through the mapping shipped alongside the rows.
pub async fn fetch_synced_expenses(
    http: &Client,
    config: &AppConfig,
    property_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> AppResult<Vec<Expense>> {
    let base = config.accounting_provider_base_url.as_deref().ok_or_else(|| {
        AppError::Dependency("ACCOUNTING_PROVIDER_BASE_URL is not configured.".to_string())
    })?;
    let url = format!("{base}/properties/{property_id}/expenses");

    let mut request = http
        .get(&url)
        .query(&[("start", start.to_string()), ("end", end.to_string())]);
    if let Some(key) = config.accounting_provider_api_key.as_deref() {
        request = request.bearer_auth(key);
    }

    let response = request.send().await.map_err(|e| {
        AppError::ProviderUnavailable(format!("accounting provider unreachable: {e}"))
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::ProviderUnavailable(format!(
            "accounting provider returned {status} for property {property_id}"
        )));
    }

    let body: AccountingExpensesResponse = response.json().await.map_err(|e| {
        AppError::ProviderUnavailable(format!("accounting provider payload unreadable: {e}"))
    })?;

    Ok(body
        .data
        .into_iter()
        .map(|row| {
            let category = body
                .category_map
                .get(&row.category_code)
                .cloned()
                .unwrap_or_else(|| {
                    if row.category_code.trim().is_empty() {
                        "other".to_string()
                    } else {
                        row.category_code.clone()
                    }
                });
            Expense {
                id: row.id,
                property_id,
                date: row.date,
                description: row.description,
                category,
                amount: row.amount,
                hidden: row.hidden,
                is_ll_cover: row.is_ll_cover,
                source: ExpenseSource::Synced,
            }
        })
        .collect())
}
