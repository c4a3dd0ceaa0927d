use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::auth::require_api_key;
use crate::domain::{round2, CalculationType, LineItem, Statement, StatementStatus};
use crate::error::{AppError, AppResult};
use crate::repository::statements as statement_repo;
use crate::schemas::{
    clamp_limit_in_range, validate_input, GenerateStatementInput, ReconfigureStatementInput,
    SendStatementInput, StatementPath, StatementsQuery, UpdateDraftStatementInput,
};
use crate::services::batch::{self, BatchRequest, BatchSelection};
use crate::services::lifecycle;
use crate::services::similarity;
use crate::services::statement_builder::{self, BuildOutcome, BuildRequest};
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/statements",
            axum::routing::get(list_statements),
        )
        .route(
            "/statements/generate",
            axum::routing::post(generate_statements),
        )
        .route(
            "/statements/generate/progress",
            axum::routing::get(generation_progress),
        )
        .route(
            "/statements/generate/cancel",
            axum::routing::post(cancel_generation),
        )
        .route(
            "/statements/{statement_id}",
            axum::routing::get(get_statement)
                .patch(update_draft_statement)
                .delete(delete_statement),
        )
        .route(
            "/statements/{statement_id}/finalize",
            axum::routing::post(finalize_statement),
        )
        .route(
            "/statements/{statement_id}/send",
            axum::routing::post(send_statement),
        )
        .route(
            "/statements/{statement_id}/mark-paid",
            axum::routing::post(mark_statement_paid),
        )
        .route(
            "/statements/{statement_id}/revert",
            axum::routing::post(revert_statement),
        )
        .route(
            "/statements/{statement_id}/reconfigure",
            axum::routing::post(reconfigure_statement),
        )
}

const NAME_MATCH_THRESHOLD: f64 = 0.8;

/// Single statement (property selector present) or a batch (tag, group, or
/// owner "all"). Batches run sequentially and return a per-item report.
async fn generate_statements(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<GenerateStatementInput>,
) -> AppResult<impl IntoResponse> {
    require_api_key(&state, &headers)?;
    validate_input(&payload)?;

    let calculation_type = payload
        .calculation_type
        .as_deref()
        .map(CalculationType::parse)
        .transpose()?;

    let is_all = payload.owner_id.trim().eq_ignore_ascii_case("all");
    let single_listings = resolve_single_selector(&state, &payload, is_all).await?;

    if let Some(listing_ids) = single_listings {
        let request = BuildRequest {
            owner_id: payload.owner_id.clone(),
            listing_ids,
            week_start: payload.start_date,
            week_end: payload.end_date,
            calculation_type,
            include_inactive: payload.include_inactive,
            custom_reservations: payload
                .custom_reservations
                .into_iter()
                .map(|input| input.into_reservation())
                .collect(),
            internal_notes: payload.internal_notes,
        };
        let outcome = statement_builder::build_statement(&state, request).await?;
        let (status, label) = match &outcome {
            BuildOutcome::Created(_) => (StatusCode::CREATED, "created"),
            BuildOutcome::Rebuilt(_) => (StatusCode::OK, "rebuilt"),
            BuildOutcome::AlreadyExists(_) => (StatusCode::OK, "already_exists"),
        };
        return Ok((
            status,
            Json(json!({ "outcome": label, "data": outcome.statement() })),
        ));
    }

    let selection = if is_all {
        BatchSelection::All
    } else if let Some(group_id) = payload.group_id {
        BatchSelection::Group { group_id }
    } else if let Some(tag) = payload.tag.clone() {
        BatchSelection::OwnerTag {
            owner_id: payload.owner_id.clone(),
            tag,
        }
    } else {
        return Err(AppError::BadRequest(
            "Provide property_id, property_ids, property_name, tag, group_id, or owner_id \"all\"."
                .to_string(),
        ));
    };

    let report = batch::run_batch(
        &state,
        BatchRequest {
            selection,
            week_start: payload.start_date,
            week_end: payload.end_date,
            calculation_type,
            include_inactive: payload.include_inactive,
            internal_notes: payload.internal_notes,
        },
    )
    .await?;
    Ok((StatusCode::OK, Json(json!({ "outcome": "batch", "data": report }))))
}

/// When the request names properties directly, return the listing ids for
/// a single build; otherwise None and the batch selector applies.
async fn resolve_single_selector(
    state: &AppState,
    payload: &GenerateStatementInput,
    is_all: bool,
) -> AppResult<Option<Vec<Uuid>>> {
    if is_all {
        return Ok(None);
    }
    if let Some(ids) = &payload.property_ids {
        if ids.is_empty() {
            return Err(AppError::BadRequest(
                "property_ids must not be empty.".to_string(),
            ));
        }
        return Ok(Some(ids.clone()));
    }
    if let Some(id) = payload.property_id {
        return Ok(Some(vec![id]));
    }
    if let Some(name) = payload.property_name.as_deref() {
        let pool = state.db()?;
        state.listing_directory.ensure_loaded(pool).await?;
        let listings = state
            .listing_directory
            .listings_for_owner(&payload.owner_id)
            .await;
        let names: Vec<&str> = listings.iter().map(|l| l.name.as_str()).collect();
        let index = similarity::best_match(name, &names, NAME_MATCH_THRESHOLD).ok_or_else(|| {
            AppError::NotFound(format!("No listing matches the name '{name}'."))
        })?;
        return Ok(Some(vec![listings[index].id]));
    }
    Ok(None)
}

async fn generation_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    require_api_key(&state, &headers)?;
    let stream = WatchStream::new(state.batch.subscribe())
        .map(|progress| Event::default().json_data(&progress));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn cancel_generation(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_api_key(&state, &headers)?;
    state.batch.request_cancel();
    tracing::info!("batch cancellation requested");
    Ok(Json(json!({ "cancelled": true })))
}

async fn list_statements(
    State(state): State<AppState>,
    Query(query): Query<StatementsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_api_key(&state, &headers)?;
    let pool = state.db()?;
    let status = query
        .status
        .as_deref()
        .map(StatementStatus::parse)
        .transpose()
        .map_err(|_| AppError::BadRequest("Unknown statement status filter.".to_string()))?;
    let rows = statement_repo::list(
        pool,
        query.owner_id.as_deref(),
        query.property_id,
        status,
        clamp_limit_in_range(query.limit, 1, 500),
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn get_statement(
    State(state): State<AppState>,
    Path(path): Path<StatementPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_api_key(&state, &headers)?;
    let pool = state.db()?;
    let statement = statement_repo::get(pool, path.statement_id).await?;
    Ok(Json(json!({ "data": statement })))
}

/// Operator edits to a draft: flat fee fields and notes. The payout is
/// recomputed from the stored totals, never refetched from providers.
async fn update_draft_statement(
    State(state): State<AppState>,
    Path(path): Path<StatementPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateDraftStatementInput>,
) -> AppResult<Json<Value>> {
    require_api_key(&state, &headers)?;
    let pool = state.db()?;

    let mut statement = statement_repo::get(pool, path.statement_id).await?;
    if statement.status != StatementStatus::Draft {
        return Err(AppError::InvalidTransition(format!(
            "only drafts can be edited, statement is '{}'",
            statement.status.as_str()
        )));
    }

    if let Some(tech_fees) = payload.tech_fees {
        statement.tech_fees = round2(tech_fees);
    }
    if let Some(insurance_fees) = payload.insurance_fees {
        statement.insurance_fees = round2(insurance_fees);
    }
    if let Some(adjustments) = payload.adjustments {
        statement.adjustments = round2(adjustments);
    }
    if let Some(notes) = payload.internal_notes {
        statement.internal_notes = Some(notes);
    }
    statement.owner_payout = statement.recompute_owner_payout();
    statement.version += 1;
    statement.updated_at = chrono::Utc::now();

    statement_repo::replace_draft(pool, &statement).await?;
    Ok(Json(json!({ "data": statement })))
}

async fn finalize_statement(
    State(state): State<AppState>,
    Path(path): Path<StatementPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_api_key(&state, &headers)?;
    let pool = state.db()?;
    let mut statement = statement_repo::get(pool, path.statement_id).await?;
    lifecycle::finalize(pool, &mut statement).await?;
    Ok(Json(json!({ "data": statement })))
}

async fn send_statement(
    State(state): State<AppState>,
    Path(path): Path<StatementPath>,
    headers: HeaderMap,
    Json(payload): Json<SendStatementInput>,
) -> AppResult<Json<Value>> {
    require_api_key(&state, &headers)?;
    validate_input(&payload)?;
    let pool = state.db()?;

    let mut statement = statement_repo::get(pool, path.statement_id).await?;
    let subject = payload.subject.clone().unwrap_or_else(|| {
        format!(
            "Owner statement {} to {}",
            statement.week_start_date, statement.week_end_date
        )
    });
    let html = render_statement_html(&statement);
    lifecycle::send(
        pool,
        &state.http_client,
        &state.config,
        &mut statement,
        &payload.recipient,
        &subject,
        &html,
    )
    .await?;
    Ok(Json(json!({ "data": statement })))
}

async fn mark_statement_paid(
    State(state): State<AppState>,
    Path(path): Path<StatementPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_api_key(&state, &headers)?;
    let pool = state.db()?;
    let mut statement = statement_repo::get(pool, path.statement_id).await?;
    lifecycle::mark_paid(pool, &state.http_client, &state.config, &mut statement).await?;
    Ok(Json(json!({ "data": statement })))
}

async fn revert_statement(
    State(state): State<AppState>,
    Path(path): Path<StatementPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_api_key(&state, &headers)?;
    let pool = state.db()?;
    let mut statement = statement_repo::get(pool, path.statement_id).await?;
    lifecycle::revert_to_draft(pool, &mut statement).await?;
    Ok(Json(json!({ "data": statement })))
}

async fn delete_statement(
    State(state): State<AppState>,
    Path(path): Path<StatementPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_api_key(&state, &headers)?;
    let pool = state.db()?;
    let statement = statement_repo::get(pool, path.statement_id).await?;
    lifecycle::delete(pool, &statement).await?;
    Ok(Json(json!({ "deleted": path.statement_id })))
}

/// Rebuild an existing draft with fresh provider data, optionally under a
/// different attribution mode.
async fn reconfigure_statement(
    State(state): State<AppState>,
    Path(path): Path<StatementPath>,
    headers: HeaderMap,
    Json(payload): Json<ReconfigureStatementInput>,
) -> AppResult<Json<Value>> {
    require_api_key(&state, &headers)?;
    let pool = state.db()?;

    let statement = statement_repo::get(pool, path.statement_id).await?;
    if statement.status != StatementStatus::Draft {
        return Err(AppError::InvalidTransition(format!(
            "only drafts can be reconfigured, statement is '{}'",
            statement.status.as_str()
        )));
    }

    let calculation_type = match payload.calculation_type.as_deref() {
        Some(raw) => Some(CalculationType::parse(raw)?),
        None => Some(statement.calculation_type),
    };
    let listing_ids = if statement.is_combined {
        statement.property_ids.clone()
    } else {
        statement.property_id.into_iter().collect()
    };

    let request = BuildRequest {
        owner_id: statement.owner_id.clone(),
        listing_ids,
        week_start: statement.week_start_date,
        week_end: statement.week_end_date,
        calculation_type,
        include_inactive: true,
        custom_reservations: Vec::new(),
        internal_notes: statement.internal_notes.clone(),
    };
    let outcome = statement_builder::build_statement(&state, request).await?;
    Ok(Json(json!({ "outcome": "rebuilt", "data": outcome.statement() })))
}

fn render_statement_html(statement: &Statement) -> String {
    let reservation_count = statement
        .line_items
        .iter()
        .filter(|item| {
            matches!(
                item,
                LineItem::Reservation(_) | LineItem::CustomReservation(_)
            )
        })
        .count();
    let commission_note = if statement.commission_waived {
        " (waived)"
    } else {
        ""
    };
    format!(
        "<h1>Owner statement</h1>\
         <p>Period: {start} to {end}</p>\
         <p>Reservations: {reservation_count}</p>\
         <table>\
         <tr><td>Total revenue</td><td>${revenue:.2}</td></tr>\
         <tr><td>Expenses</td><td>${expenses:.2}</td></tr>\
         <tr><td>Management commission{commission_note}</td><td>${commission:.2}</td></tr>\
         <tr><td><strong>Owner payout</strong></td><td><strong>${payout:.2}</strong></td></tr>\
         </table>",
        start = statement.week_start_date,
        end = statement.week_end_date,
        revenue = statement.total_revenue,
        expenses = statement.total_expenses,
        commission = statement.pm_commission,
        payout = statement.owner_payout,
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    use super::render_statement_html;
    use crate::domain::{CalculationType, EffectivePolicy, Statement, StatementStatus};

    fn statement() -> Statement {
        Statement {
            id: Uuid::new_v4(),
            owner_id: "owner-1".to_string(),
            property_id: Some(Uuid::new_v4()),
            property_ids: Vec::new(),
            is_combined: false,
            week_start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            week_end_date: NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
            calculation_type: CalculationType::Checkout,
            total_revenue: 300.0,
            total_expenses: 50.0,
            pm_commission: 45.0,
            commission_waived: true,
            deducted_commission: 0.0,
            tech_fees: 0.0,
            insurance_fees: 0.0,
            adjustments: 0.0,
            tax_adjustment: 0.0,
            commissionable_base: 300.0,
            owner_payout: 250.0,
            line_items: Vec::new(),
            duplicate_warnings: Vec::new(),
            cancelled_reservation_count: 0,
            cleaning_mismatch_warning: None,
            should_convert_to_calendar: false,
            partial_data_sources: Vec::new(),
            internal_notes: None,
            listing_settings_snapshot: EffectivePolicy {
                pm_percentage: 15.0,
                waive_commission: true,
                disregard_tax: false,
                airbnb_pass_through_tax: false,
                cleaning_fee_pass_through: false,
                is_cohost_on_airbnb: false,
                guest_paid_damage_coverage: false,
                default_cleaning_fee: 150.0,
                default_pet_fee: 0.0,
            },
            status: StatementStatus::Draft,
            sent_at: None,
            payout_status: None,
            paid_at: None,
            transfer_id: None,
            payout_fee: None,
            payout_error: None,
            group_id: None,
            group_name: None,
            group_tags: BTreeSet::new(),
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn email_body_shows_waiver_and_payout() {
        let html = render_statement_html(&statement());
        assert!(html.contains("2025-01-01 to 2025-01-07"));
        assert!(html.contains("(waived)"));
        assert!(html.contains("$250.00"));
    }
}
