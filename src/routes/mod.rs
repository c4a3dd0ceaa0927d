use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub mod expenses;
pub mod health;
pub mod listings;
pub mod statements;
pub mod webhooks;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(statements::router())
        .merge(listings::router())
        .merge(expenses::router())
        .merge(webhooks::router())
}
