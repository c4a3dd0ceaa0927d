use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::auth::require_api_key;
use crate::domain::CalculationType;
use crate::error::{AppError, AppResult};
use crate::repository::listings::{update_listing_policy, ListingPolicyPatch};
use crate::schemas::{validate_input, ListingPath, ListingsQuery, UpdateListingPolicyInput};
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/listings",
            axum::routing::get(list_listings),
        )
        .route(
            "/listings/{listing_id}",
            axum::routing::get(get_listing).patch(patch_listing_policy),
        )
}

async fn list_listings(
    State(state): State<AppState>,
    Query(query): Query<ListingsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_api_key(&state, &headers)?;
    let pool = state.db()?;
    state.listing_directory.ensure_loaded(pool).await?;

    let listings = match (&query.owner_id, &query.tag) {
        (Some(owner_id), Some(tag)) => state.listing_directory.listings_with_tag(owner_id, tag).await,
        (Some(owner_id), None) => state.listing_directory.listings_for_owner(owner_id).await,
        (None, _) => state.listing_directory.all_listings().await,
    };
    Ok(Json(json!({ "data": listings })))
}

async fn get_listing(
    State(state): State<AppState>,
    Path(path): Path<ListingPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_api_key(&state, &headers)?;
    let pool = state.db()?;
    state.listing_directory.ensure_loaded(pool).await?;

    let listing = state
        .listing_directory
        .get(path.listing_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Listing {} not found.", path.listing_id)))?;
    Ok(Json(json!({ "data": listing })))
}

/// Edit the financial policy flags for one listing, then reload the
/// directory so the next build sees the change.
async fn patch_listing_policy(
    State(state): State<AppState>,
    Path(path): Path<ListingPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateListingPolicyInput>,
) -> AppResult<Json<Value>> {
    require_api_key(&state, &headers)?;
    validate_input(&payload)?;
    let pool = state.db()?;

    let calculation_type = match (&payload.calculation_type, payload.clear_calculation_type) {
        (_, true) => Some(None),
        (Some(raw), false) => Some(Some(CalculationType::parse(raw)?)),
        (None, false) => None,
    };
    let waive_commission_until = if payload.clear_waive_commission_until {
        Some(None)
    } else {
        payload.waive_commission_until.map(Some)
    };

    let patch = ListingPolicyPatch {
        pm_percentage: payload.pm_percentage,
        waive_commission: payload.waive_commission,
        waive_commission_until,
        disregard_tax: payload.disregard_tax,
        airbnb_pass_through_tax: payload.airbnb_pass_through_tax,
        cleaning_fee_pass_through: payload.cleaning_fee_pass_through,
        is_cohost_on_airbnb: payload.is_cohost_on_airbnb,
        guest_paid_damage_coverage: payload.guest_paid_damage_coverage,
        include_child_listings: payload.include_child_listings,
        default_cleaning_fee: payload.default_cleaning_fee,
        default_pet_fee: payload.default_pet_fee,
        tags: payload
            .tags
            .map(|tags| tags.into_iter().map(|t| t.trim().to_string()).collect()),
        calculation_type,
    };

    update_listing_policy(pool, path.listing_id, &patch).await?;
    state.listing_directory.reload(pool).await?;

    let listing = state
        .listing_directory
        .get(path.listing_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Listing {} not found.", path.listing_id)))?;
    tracing::info!(listing_id = %path.listing_id, "listing policy updated");
    Ok(Json(json!({ "data": listing })))
}
