use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::domain::{CalculationType, Listing};
use crate::error::{AppError, AppResult};
use crate::services::statement_builder::{self, BuildOutcome, BuildRequest};
use crate::state::AppState;

/// Which statements a generation request covers.
#[derive(Debug, Clone)]
pub enum BatchSelection {
    /// One statement for one property.
    OwnerProperty { owner_id: String, property_id: Uuid },
    /// One combined statement across several properties.
    OwnerProperties {
        owner_id: String,
        property_ids: Vec<Uuid>,
    },
    /// One statement per listing carrying the tag for this owner.
    OwnerTag { owner_id: String, tag: String },
    /// One statement per member listing of the group.
    Group { group_id: Uuid },
    /// One statement per active listing across every owner.
    All,
}

/// One unit of work: a single statement build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTarget {
    pub owner_id: String,
    pub listing_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BatchProgress {
    pub current: usize,
    pub total: usize,
    pub running: bool,
}

#[derive(Debug, Serialize)]
pub struct BatchItemReport {
    pub owner_id: String,
    pub listing_ids: Vec<Uuid>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub items: Vec<BatchItemReport>,
}

/// Shared cancellation token and progress feed for the running batch.
///
/// One batch runs at a time; the SSE progress route subscribes to the
/// watch channel and sees `{ current, total }` as items complete.
pub struct BatchTracker {
    cancel: AtomicBool,
    progress: watch::Sender<BatchProgress>,
}

impl Default for BatchTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchTracker {
    pub fn new() -> Self {
        let (progress, _) = watch::channel(BatchProgress::default());
        Self {
            cancel: AtomicBool::new(false),
            progress,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<BatchProgress> {
        self.progress.subscribe()
    }

    /// Ask the running batch to stop after the current item.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn begin(&self, total: usize) {
        self.cancel.store(false, Ordering::SeqCst);
        self.progress.send_replace(BatchProgress {
            current: 0,
            total,
            running: true,
        });
    }

    fn step(&self, current: usize, total: usize) {
        self.progress.send_replace(BatchProgress {
            current,
            total,
            running: true,
        });
    }

    fn finish(&self, current: usize, total: usize) {
        self.progress.send_replace(BatchProgress {
            current,
            total,
            running: false,
        });
    }
}

/// Expand a selection into concrete build targets. Pure over the directory
/// snapshot so ordering is stable: listings arrive name-sorted.
pub fn resolve_targets(
    listings: &[Listing],
    selection: &BatchSelection,
    include_inactive: bool,
) -> AppResult<Vec<BatchTarget>> {
    let eligible = |l: &&Listing| include_inactive || l.active;

    let targets: Vec<BatchTarget> = match selection {
        BatchSelection::OwnerProperty {
            owner_id,
            property_id,
        } => vec![BatchTarget {
            owner_id: owner_id.clone(),
            listing_ids: vec![*property_id],
        }],
        BatchSelection::OwnerProperties {
            owner_id,
            property_ids,
        } => {
            if property_ids.is_empty() {
                return Err(AppError::BadRequest(
                    "property_ids must not be empty.".to_string(),
                ));
            }
            vec![BatchTarget {
                owner_id: owner_id.clone(),
                listing_ids: property_ids.clone(),
            }]
        }
        BatchSelection::OwnerTag { owner_id, tag } => listings
            .iter()
            .filter(|l| l.owner_id == *owner_id && l.tags.contains(tag.trim()))
            .filter(eligible)
            .map(|l| BatchTarget {
                owner_id: l.owner_id.clone(),
                listing_ids: vec![l.id],
            })
            .collect(),
        BatchSelection::Group { group_id } => listings
            .iter()
            .filter(|l| l.group_id == Some(*group_id))
            .filter(eligible)
            .map(|l| BatchTarget {
                owner_id: l.owner_id.clone(),
                listing_ids: vec![l.id],
            })
            .collect(),
        BatchSelection::All => listings
            .iter()
            .filter(eligible)
            .map(|l| BatchTarget {
                owner_id: l.owner_id.clone(),
                listing_ids: vec![l.id],
            })
            .collect(),
    };

    if targets.is_empty() {
        return Err(AppError::NotFound(
            "No listings matched the generation request.".to_string(),
        ));
    }
    Ok(targets)
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub selection: BatchSelection,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub calculation_type: Option<CalculationType>,
    pub include_inactive: bool,
    pub internal_notes: Option<String>,
}

/// Run a generation batch sequentially. Provider rate limits make one
/// in-flight build at a time the right shape; a failed item is recorded
/// and the batch moves on. The cancel token is checked between items, so
/// cancellation never abandons a half-written statement.
pub async fn run_batch(state: &AppState, request: BatchRequest) -> AppResult<BatchReport> {
    let pool = state.db()?;
    state.listing_directory.ensure_loaded(pool).await?;
    let listings = state.listing_directory.all_listings().await;
    let targets = resolve_targets(&listings, &request.selection, request.include_inactive)?;

    let total = targets.len();
    let tracker = &state.batch;
    tracker.begin(total);
    tracing::info!(total, "statement batch started");

    let mut items = Vec::with_capacity(total);
    let mut succeeded = 0;
    let mut failed = 0;
    let mut cancelled = false;
    let mut current = 0;

    for target in targets {
        if tracker.cancelled() {
            cancelled = true;
            tracing::warn!(current, total, "statement batch cancelled");
            break;
        }

        let build = BuildRequest {
            owner_id: target.owner_id.clone(),
            listing_ids: target.listing_ids.clone(),
            week_start: request.week_start,
            week_end: request.week_end,
            calculation_type: request.calculation_type,
            include_inactive: request.include_inactive,
            custom_reservations: Vec::new(),
            internal_notes: request.internal_notes.clone(),
        };

        let item = match statement_builder::build_statement(state, build).await {
            Ok(outcome) => {
                succeeded += 1;
                let status = match &outcome {
                    BuildOutcome::Created(_) => "created",
                    BuildOutcome::Rebuilt(_) => "rebuilt",
                    BuildOutcome::AlreadyExists(_) => "already_exists",
                };
                BatchItemReport {
                    owner_id: target.owner_id,
                    listing_ids: target.listing_ids,
                    status: status.to_string(),
                    statement_id: Some(outcome.statement().id),
                    error_kind: None,
                    error_message: None,
                }
            }
            Err(error) => {
                failed += 1;
                tracing::error!(
                    owner_id = %target.owner_id,
                    error = %error,
                    "statement batch item failed"
                );
                BatchItemReport {
                    owner_id: target.owner_id,
                    listing_ids: target.listing_ids,
                    status: "failed".to_string(),
                    statement_id: None,
                    error_kind: Some(error.kind().to_string()),
                    error_message: Some(error.to_string()),
                }
            }
        };
        items.push(item);
        current += 1;
        tracker.step(current, total);
    }

    tracker.finish(current, total);
    tracing::info!(total, succeeded, failed, cancelled, "statement batch finished");

    Ok(BatchReport {
        total,
        succeeded,
        failed,
        cancelled,
        items,
    })
}
