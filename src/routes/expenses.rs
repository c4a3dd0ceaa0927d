use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::require_api_key;
use crate::domain::{Expense, ExpenseSource};
use crate::error::AppResult;
use crate::repository::expenses as expense_repo;
use crate::schemas::{
    validate_input, CreateManualExpenseInput, ExpensePath, HideExpenseInput, ManualExpensesQuery,
};
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/expenses/manual",
            axum::routing::get(list_manual_expenses).post(create_manual_expense),
        )
        .route(
            "/expenses/manual/{expense_id}/hide",
            axum::routing::post(set_expense_hidden),
        )
}

async fn create_manual_expense(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateManualExpenseInput>,
) -> AppResult<impl IntoResponse> {
    require_api_key(&state, &headers)?;
    validate_input(&payload)?;
    let pool = state.db()?;

    let expense = Expense {
        id: format!("manual-{}", Uuid::new_v4()),
        property_id: payload.property_id,
        date: payload.date,
        description: payload.description.trim().to_string(),
        category: payload.category.trim().to_lowercase(),
        amount: payload.amount,
        hidden: false,
        is_ll_cover: payload.is_ll_cover,
        source: ExpenseSource::Manual,
    };
    expense_repo::insert_manual(pool, &expense).await?;
    tracing::info!(
        expense_id = %expense.id,
        property_id = %expense.property_id,
        "manual expense recorded"
    );
    Ok((axum::http::StatusCode::CREATED, Json(json!({ "data": expense }))))
}

async fn list_manual_expenses(
    State(state): State<AppState>,
    Query(query): Query<ManualExpensesQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_api_key(&state, &headers)?;
    let pool = state.db()?;
    let rows = expense_repo::list_manual(pool, query.property_id, query.start_date, query.end_date)
        .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn set_expense_hidden(
    State(state): State<AppState>,
    Path(path): Path<ExpensePath>,
    headers: HeaderMap,
    Json(payload): Json<HideExpenseInput>,
) -> AppResult<Json<Value>> {
    require_api_key(&state, &headers)?;
    let pool = state.db()?;
    expense_repo::set_hidden(pool, &path.expense_id, payload.hidden).await?;
    Ok(Json(json!({ "id": path.expense_id, "hidden": payload.hidden })))
}
